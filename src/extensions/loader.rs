//! Loading packages into the graph and selecting versions.
//!
//! Packages are first loaded into the template project of the System scope.
//! A project asking for an extension gets the highest template version that
//! satisfies its minimum, copied into its own extensions-root.

use super::package::{ExtensionPackage, MANIFEST_FILE, minimum_requirement, parse_version};
use crate::constants::{EXTENSIONS_ROOT_NAME, SYSTEM_PROJECT, SYSTEM_SCOPE};
use crate::core::IntentError;
use crate::graph::{GraphStore, NewNode, Node, NodeType};
use crate::paths::{ArtifactFamily, FileContent, PathMapper};
use anyhow::{Context, Result};
use semver::Version;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Extension, skill and hook nodes available to one project.
#[derive(Debug, Clone, Default)]
pub struct LoadedExtensions {
    pub extensions: Vec<Node>,
    pub skills: Vec<Node>,
    pub hooks: Vec<Node>,
}

impl LoadedExtensions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

/// Moves extension packages between disk, the System scope and projects.
pub struct ExtensionLoader<'a> {
    store: &'a GraphStore,
}

impl<'a> ExtensionLoader<'a> {
    #[must_use]
    pub const fn new(store: &'a GraphStore) -> Self {
        Self {
            store,
        }
    }

    /// Every package directly under `dir`, sorted by name then version.
    ///
    /// Directories without a manifest are ignored; packages that fail to parse
    /// are logged and skipped.
    pub fn discover(dir: &Path) -> Result<Vec<ExtensionPackage>> {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "No extensions directory");
            return Ok(Vec::new());
        }

        let mut packages = Vec::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read extensions directory: {}", dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_dir() || !path.join(MANIFEST_FILE).is_file() {
                continue;
            }
            match ExtensionPackage::read(&path) {
                Ok(package) => packages.push(package),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping invalid extension package"),
            }
        }

        packages.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.version.cmp(&b.version)));
        Ok(packages)
    }

    fn mapper(&self) -> PathMapper<'a> {
        PathMapper::new(self.store, ArtifactFamily::Extensions)
    }

    /// The template project of the System scope.
    pub fn template_project(&self) -> Result<Node> {
        self.store.get_or_create(NewNode::new(SYSTEM_SCOPE, NodeType::Project, SYSTEM_PROJECT))
    }

    /// A project's extensions-root, created on first use.
    pub fn extensions_root(&self, project: &Node) -> Result<Node> {
        self.store.get_or_create(NewNode::child_of(project, NodeType::ExtensionsRoot, EXTENSIONS_ROOT_NAME))
    }

    /// Write `package` under `extensions_root` as an `<name>@<version>` node
    /// with skill and hook children. Children no longer in the package are removed.
    pub fn load_into(&self, extensions_root: &Node, package: &ExtensionPackage) -> Result<Node> {
        let mut manifest = serde_json::to_value(&package.manifest)?;
        manifest["version"] = json!(package.version.to_string());

        let content = FileContent {
            text: package.manifest.description.clone(),
            structured: Some(manifest),
        };
        let extension = self.mapper().upsert_file(extensions_root, &package.node_name(), content)?;

        let mut skill_names = BTreeSet::new();
        for skill in &package.skills {
            let mut node = NewNode::child_of(&extension, NodeType::Skill, skill.path.clone()).with_text(skill.body.clone());
            if let Some(metadata) = &skill.metadata {
                node = node.with_structured(metadata.clone());
            }
            self.store.upsert(None, node)?;
            skill_names.insert(skill.path.as_str());
        }

        let mut hook_names = BTreeSet::new();
        for hook in &package.hooks {
            self.store.upsert(
                None,
                NewNode::child_of(&extension, NodeType::Hook, hook.path.clone()).with_structured(hook.config.clone()),
            )?;
            hook_names.insert(hook.path.as_str());
        }

        for (node_type, keep) in [(NodeType::Skill, &skill_names), (NodeType::Hook, &hook_names)] {
            for stale in self.store.children(&extension.id, node_type)? {
                if !keep.contains(stale.name.as_str()) {
                    debug!(extension = %extension.name, name = %stale.name, "Removing stale extension resource");
                    self.store.delete_cascade(&stale.id)?;
                }
            }
        }

        debug!(
            extension = %extension.name,
            scope = %extension.scope_id,
            skills = package.skills.len(),
            hooks = package.hooks.len(),
            "Loaded extension"
        );
        Ok(extension)
    }

    /// Load every package in `dir` into the System scope's template project.
    pub fn load_templates(&self, dir: &Path) -> Result<Vec<Node>> {
        let root = self.extensions_root(&self.template_project()?)?;
        let loaded = Self::discover(dir)?
            .iter()
            .map(|package| self.load_into(&root, package))
            .collect::<Result<Vec<_>>>()?;
        if !loaded.is_empty() {
            info!(count = loaded.len(), dir = %dir.display(), "Loaded extension templates");
        }
        Ok(loaded)
    }

    /// Extension nodes in the template project.
    pub fn templates(&self) -> Result<Vec<Node>> {
        let root = self.extensions_root(&self.template_project()?)?;
        self.store.children(&root.id, NodeType::Extension)
    }

    /// The highest version of `name` under `extensions_root` satisfying `min_version`.
    pub fn select(&self, extensions_root: &Node, name: &str, min_version: &str) -> Result<Option<Node>> {
        let requirement = minimum_requirement(min_version).map_err(|e| IntentError::InvalidDependency {
            name: name.to_string(),
            reason: format!("'{min_version}' is not a valid minimum version: {e}"),
        })?;

        let mut best: Option<(Version, Node)> = None;
        for node in self.store.children(&extensions_root.id, NodeType::Extension)? {
            if node.structured_str("name") != Some(name) {
                continue;
            }
            let Some(version) = node.structured_str("version").and_then(|v| parse_version(v).ok()) else {
                continue;
            };
            if !requirement.matches(&version) {
                continue;
            }
            if best.as_ref().is_none_or(|(current, _)| version > *current) {
                best = Some((version, node));
            }
        }
        Ok(best.map(|(_, node)| node))
    }

    /// Copy the best template of `name` into the project's extensions-root.
    ///
    /// Other versions of `name` already installed in the project are removed,
    /// so a project holds at most one version per extension.
    pub fn install(&self, project: &Node, name: &str, min_version: &str) -> Result<Node> {
        let templates = self.extensions_root(&self.template_project()?)?;
        let selected = self.select(&templates, name, min_version)?.ok_or_else(|| IntentError::ExtensionNotFound {
            name: name.to_string(),
            requirement: min_version.to_string(),
        })?;

        let target = self.extensions_root(project)?;
        for (_, previous) in self.mapper().list_files(&target)? {
            if previous.structured_str("name") == Some(name) && previous.name != selected.name {
                debug!(project = %project.name, extension = %previous.name, "Replacing installed extension");
                self.store.delete_cascade(&previous.id)?;
            }
        }
        let installed = self.store.copy_subtree(&selected.id, Some(&target.id), &project.scope_id)?;
        info!(project = %project.name, extension = %installed.name, "Installed extension");
        Ok(installed)
    }

    /// The extension, skill and hook nodes of a project, ordered by name.
    pub fn loaded_for(&self, project: &Node) -> Result<LoadedExtensions> {
        let root = self.extensions_root(project)?;
        let mut loaded = LoadedExtensions::default();
        for (_, extension) in self.mapper().list_files(&root)? {
            loaded.skills.extend(self.store.children(&extension.id, NodeType::Skill)?);
            loaded.hooks.extend(self.store.children(&extension.id, NodeType::Hook)?);
            loaded.extensions.push(extension);
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_package(root: &Path, name: &str, version: &str, skills: &[&str]) -> PathBuf {
        let dir = root.join(format!("{name}-{version}"));
        std::fs::create_dir_all(dir.join("skills")).unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE),
            format!(r#"{{"id": "{name}", "name": "{name}", "version": "{version}"}}"#),
        )
        .unwrap();
        for skill in skills {
            std::fs::write(dir.join("skills").join(skill), format!("---\ntitle: {skill}\n---\nbody\n")).unwrap();
        }
        dir
    }

    #[test]
    fn test_discover_sorted_and_skips_invalid() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), "b", "1.0.0", &[]);
        write_package(temp.path(), "a", "2.0.0", &[]);
        write_package(temp.path(), "a", "1.0.0", &[]);
        let broken = temp.path().join("broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join(MANIFEST_FILE), "{").unwrap();
        std::fs::create_dir_all(temp.path().join("not-a-package")).unwrap();

        let names: Vec<String> =
            ExtensionLoader::discover(temp.path()).unwrap().iter().map(ExtensionPackage::node_name).collect();
        assert_eq!(names, vec!["a@1.0.0", "a@2.0.0", "b@1.0.0"]);
        assert!(ExtensionLoader::discover(&temp.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_select_highest_satisfying() {
        let temp = TempDir::new().unwrap();
        for version in ["1.0.0", "1.4.0", "2.1.0"] {
            write_package(temp.path(), "style", version, &[]);
        }
        write_package(temp.path(), "other", "9.0.0", &[]);

        let store = GraphStore::in_memory().unwrap();
        let loader = ExtensionLoader::new(&store);
        loader.load_templates(temp.path()).unwrap();
        let root = loader.extensions_root(&loader.template_project().unwrap()).unwrap();

        assert_eq!(loader.select(&root, "style", "1.2").unwrap().unwrap().name, "style@2.1.0");
        assert_eq!(loader.select(&root, "style", "^1.0").unwrap().unwrap().name, "style@1.4.0");
        assert!(loader.select(&root, "style", "3").unwrap().is_none());
        assert!(loader.select(&root, "missing", "1").unwrap().is_none());
        assert!(loader.select(&root, "style", "soon").is_err());
    }

    #[test]
    fn test_install_copies_into_project_scope() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), "style", "1.0.0", &["a.md", "b.md"]);

        let store = GraphStore::in_memory().unwrap();
        let loader = ExtensionLoader::new(&store);
        loader.load_templates(temp.path()).unwrap();

        let project = store.create(NewNode::new("default", NodeType::Project, "web")).unwrap();
        let installed = loader.install(&project, "style", "1").unwrap();
        assert_eq!(installed.scope_id, "default");
        assert_eq!(installed.name, "style@1.0.0");

        let loaded = loader.loaded_for(&project).unwrap();
        assert_eq!(loaded.extensions.len(), 1);
        assert_eq!(loaded.skills.len(), 2);
        assert!(loaded.skills.iter().all(|s| s.scope_id == "default"));

        // Installing again updates in place.
        loader.install(&project, "style", "1").unwrap();
        assert_eq!(loader.loaded_for(&project).unwrap().skills.len(), 2);

        let err = loader.install(&project, "style", "2").unwrap_err();
        assert!(matches!(err.downcast_ref::<IntentError>(), Some(IntentError::ExtensionNotFound { .. })));
    }

    #[test]
    fn test_install_newer_version_replaces_older() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), "style", "1.0.0", &["a.md"]);

        let store = GraphStore::in_memory().unwrap();
        let loader = ExtensionLoader::new(&store);
        loader.load_templates(temp.path()).unwrap();
        let project = store.create(NewNode::new("default", NodeType::Project, "web")).unwrap();
        loader.install(&project, "style", "1").unwrap();

        write_package(temp.path(), "style", "1.2.0", &["b.md"]);
        loader.load_templates(temp.path()).unwrap();
        loader.install(&project, "style", "1").unwrap();

        let loaded = loader.loaded_for(&project).unwrap();
        let names: Vec<&str> = loaded.extensions.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["style@1.2.0"]);
        let skills: Vec<&str> = loaded.skills.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(skills, vec!["b.md"]);
    }

    #[test]
    fn test_reinstall_drops_skills_removed_from_template() {
        let temp = TempDir::new().unwrap();
        let dir = write_package(temp.path(), "style", "1.0.0", &["a.md", "b.md"]);

        let store = GraphStore::in_memory().unwrap();
        let loader = ExtensionLoader::new(&store);
        loader.load_templates(temp.path()).unwrap();
        let project = store.create(NewNode::new("default", NodeType::Project, "web")).unwrap();
        loader.install(&project, "style", "1").unwrap();

        std::fs::remove_file(dir.join("skills").join("b.md")).unwrap();
        loader.load_templates(temp.path()).unwrap();
        loader.install(&project, "style", "1").unwrap();

        let skills = loader.loaded_for(&project).unwrap().skills;
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "a.md");
    }

    #[test]
    fn test_reload_removes_stale_skills() {
        let temp = TempDir::new().unwrap();
        let dir = write_package(temp.path(), "style", "1.0.0", &["a.md", "b.md"]);

        let store = GraphStore::in_memory().unwrap();
        let loader = ExtensionLoader::new(&store);
        loader.load_templates(temp.path()).unwrap();

        std::fs::remove_file(dir.join("skills").join("b.md")).unwrap();
        let loaded = loader.load_templates(temp.path()).unwrap();
        assert_eq!(store.children(&loaded[0].id, NodeType::Skill).unwrap().len(), 1);
    }
}
