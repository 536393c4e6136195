//! Path mapping between relative file paths and graph subtrees.
//!
//! A [`PathMapper`] maps `a/b/c.md` under a family root onto
//! `root -> dir(a) -> dir(b) -> file(c.md)`. Directory nodes are created on
//! demand and never removed by [`PathMapper::delete_file`]; lookups are by exact
//! path so stale empty directories are harmless.

use crate::core::IntentError;
use crate::graph::{GraphStore, NewNode, Node, NodeType};
use crate::utils::{hash_text, normalize_path_for_storage};
use anyhow::Result;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Families of artifacts stored as path-shaped subtrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFamily {
    Specs,
    Intent,
    Source,
    Extensions,
    LocalConfig,
}

impl ArtifactFamily {
    #[must_use]
    pub const fn root_type(self) -> NodeType {
        match self {
            Self::Specs => NodeType::SpecsRoot,
            Self::Intent => NodeType::IntentRoot,
            Self::Source => NodeType::SourceRoot,
            Self::Extensions => NodeType::ExtensionsRoot,
            Self::LocalConfig => NodeType::LocalConfigRoot,
        }
    }

    /// Directory node type; `None` for flat families.
    #[must_use]
    pub const fn dir_type(self) -> Option<NodeType> {
        match self {
            Self::Specs => Some(NodeType::SpecsDir),
            Self::Intent => Some(NodeType::IntentDir),
            Self::Source => Some(NodeType::SourceDir),
            Self::Extensions | Self::LocalConfig => None,
        }
    }

    #[must_use]
    pub const fn file_type(self) -> NodeType {
        match self {
            Self::Specs => NodeType::SpecsFile,
            Self::Intent => NodeType::IntentFile,
            Self::Source => NodeType::SourceFile,
            Self::Extensions => NodeType::Extension,
            Self::LocalConfig => NodeType::ConfigFile,
        }
    }
}

/// Payload written to a leaf node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileContent {
    pub text: Option<String>,
    pub structured: Option<Value>,
}

impl FileContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            structured: None,
        }
    }

    #[must_use]
    pub fn with_structured(mut self, value: Value) -> Self {
        self.structured = Some(value);
        self
    }
}

/// Store an absolute directory on a family root node.
#[must_use]
pub fn root_payload(dir: &Path) -> Value {
    json!({ "path": normalize_path_for_storage(dir) })
}

/// Maps relative paths of one artifact family onto graph nodes.
pub struct PathMapper<'a> {
    store: &'a GraphStore,
    family: ArtifactFamily,
}

impl<'a> PathMapper<'a> {
    #[must_use]
    pub const fn new(store: &'a GraphStore, family: ArtifactFamily) -> Self {
        Self {
            store,
            family,
        }
    }

    #[must_use]
    pub const fn family(&self) -> ArtifactFamily {
        self.family
    }

    /// Split a relative path into directory segments and file name.
    pub fn split(&self, relative_path: &str) -> Result<(Vec<String>, String)> {
        let normalized = relative_path.replace('\\', "/");
        let invalid = |reason: &str| IntentError::InvalidPath {
            path: relative_path.to_string(),
            reason: reason.to_string(),
        };

        if normalized.trim().is_empty() {
            return Err(invalid("path is empty").into());
        }
        if normalized.starts_with('/') || Path::new(&normalized).is_absolute() {
            return Err(invalid("path must be relative").into());
        }

        let mut segments: Vec<String> = Vec::new();
        for segment in normalized.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Err(invalid("parent directory segments are not allowed").into()),
                other => segments.push(other.to_string()),
            }
        }

        let file = segments.pop().ok_or_else(|| invalid("path has no file name"))?;
        if !segments.is_empty() && self.family.dir_type().is_none() {
            return Err(invalid("this artifact family has no directories").into());
        }
        Ok((segments, file))
    }

    /// Path of `absolute` relative to the directory stored on `root`.
    pub fn relative_to_root(&self, root: &Node, absolute: &Path) -> Result<String> {
        let root_dir = root.structured_str("path").ok_or_else(|| IntentError::MissingField {
            node_type: root.node_type.as_str().to_string(),
            field: "path".to_string(),
        })?;

        let path = normalize_path_for_storage(absolute);
        let outside = || IntentError::PathOutsideRoot {
            path: path.clone(),
            root: root_dir.to_string(),
        };

        let rest = path.strip_prefix(root_dir).ok_or_else(outside)?;
        let rest = rest.strip_prefix('/').ok_or_else(outside)?;
        if rest.is_empty() {
            return Err(outside().into());
        }
        Ok(rest.to_string())
    }

    /// Get-or-create each directory node, then upsert the leaf.
    pub fn upsert_file(&self, root: &Node, relative_path: &str, content: FileContent) -> Result<Node> {
        self.check_root(root)?;
        let (dirs, file) = self.split(relative_path)?;

        let mut parent = root.clone();
        if let Some(dir_type) = self.family.dir_type() {
            for segment in dirs {
                parent = self.store.get_or_create(NewNode::child_of(&parent, dir_type, segment))?;
            }
        }

        let mut leaf = NewNode::child_of(&parent, self.family.file_type(), file);
        leaf.text_content = content.text;
        leaf.structured_content = content.structured;
        self.store.upsert(None, leaf)
    }

    /// Same walk as [`Self::upsert_file`] without creating anything.
    pub fn get_file(&self, root: &Node, relative_path: &str) -> Result<Option<Node>> {
        self.check_root(root)?;
        let (dirs, file) = self.split(relative_path)?;

        let mut parent_id = root.id.clone();
        if let Some(dir_type) = self.family.dir_type() {
            for segment in &dirs {
                match self.store.get_by_unique_key(Some(&parent_id), &root.scope_id, dir_type, segment)? {
                    Some(dir) => parent_id = dir.id,
                    None => return Ok(None),
                }
            }
        }

        self.store.get_by_unique_key(Some(&parent_id), &root.scope_id, self.family.file_type(), &file)
    }

    /// Delete the leaf at `relative_path` and its own children. Returns whether it existed.
    pub fn delete_file(&self, root: &Node, relative_path: &str) -> Result<bool> {
        match self.get_file(root, relative_path)? {
            Some(leaf) => {
                self.store.delete_cascade(&leaf.id)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Every leaf under `root` with its relative path, sorted by path.
    pub fn list_files(&self, root: &Node) -> Result<Vec<(String, Node)>> {
        self.check_root(root)?;
        let mut files = Vec::new();
        self.collect_files(&root.id, "", &mut files)?;
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    fn collect_files(&self, parent_id: &str, prefix: &str, out: &mut Vec<(String, Node)>) -> Result<()> {
        for file in self.store.children(parent_id, self.family.file_type())? {
            out.push((format!("{prefix}{}", file.name), file));
        }
        if let Some(dir_type) = self.family.dir_type() {
            for dir in self.store.children(parent_id, dir_type)? {
                let nested = format!("{prefix}{}/", dir.name);
                self.collect_files(&dir.id, &nested, out)?;
            }
        }
        Ok(())
    }

    /// Mirror files under `dir` with the given extension into the subtree.
    ///
    /// Each file becomes a leaf carrying its text; leaves whose text is
    /// unchanged keep their structured content. Leaves whose files are gone
    /// are deleted. Symlinks are skipped. Returns the synced relative paths.
    ///
    /// Paths are taken relative to the directory stored on `root`, so a `dir`
    /// outside it fails with [`IntentError::PathOutsideRoot`].
    pub fn sync_from_disk(&self, root: &Node, dir: &Path, extension: &str) -> Result<Vec<String>> {
        let mut seen = BTreeSet::new();

        if dir.is_dir() {
            for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_symlink() {
                    debug!(path = %entry.path().display(), "Skipping symlink");
                    continue;
                }
                if !entry.file_type().is_file()
                    || entry.path().extension().and_then(|e| e.to_str()) != Some(extension)
                {
                    continue;
                }

                let relative = self.relative_to_root(root, entry.path())?;
                let text = std::fs::read_to_string(entry.path())?;
                let unchanged = self
                    .get_file(root, &relative)?
                    .is_some_and(|leaf| leaf.text_content_hash.as_deref() == Some(hash_text(&text).as_str()));
                if !unchanged {
                    self.upsert_file(root, &relative, FileContent::text(text))?;
                }
                seen.insert(relative);
            }
        }

        for (path, _) in self.list_files(root)? {
            if !seen.contains(&path) {
                debug!(path = %path, "Removing node for deleted file");
                self.delete_file(root, &path)?;
            }
        }

        Ok(seen.into_iter().collect())
    }

    fn check_root(&self, root: &Node) -> Result<()> {
        if root.node_type == self.family.root_type() {
            Ok(())
        } else {
            Err(IntentError::InvalidParentType {
                child: self.family.file_type().as_str().to_string(),
                parent: root.node_type.as_str().to_string(),
            }
            .into())
        }
    }
}
