//! Artifact graph
//!
//! Every input and output of a build is a [`Node`] in one persisted tree. A
//! node has a closed [`NodeType`] tag, a name unique among its siblings of the
//! same type and scope, optional text and structured payloads with content
//! hashes, and a parent whose lifetime bounds its own.
//!
//! The unique key of a node is `(parent_id, scope_id, node_type, name)`. All
//! writers look a key up before creating it; [`GraphStore::create`] refuses a
//! key that already exists and [`GraphStore::upsert`] turns a second write
//! into an update.
//!
//! ```rust,no_run
//! use intentcode::graph::{GraphStore, NewNode, NodeType};
//!
//! # fn example() -> anyhow::Result<()> {
//! let store = GraphStore::in_memory()?;
//! let project = store.upsert(None, NewNode::new("default", NodeType::Project, "web"))?;
//! let again = store.upsert(None, NewNode::new("default", NodeType::Project, "web"))?;
//! assert_eq!(project.id, again.id);
//! # Ok(())
//! # }
//! ```

mod schema;
mod store;

pub use store::GraphStore;
pub(crate) use store::{conversion_error, now_string, parse_json_column, parse_time};

use crate::core::IntentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Role of a node in the artifact graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Project,
    BuildContainer,
    BuildRun,
    SpecsRoot,
    SpecsDir,
    SpecsFile,
    IntentRoot,
    IntentDir,
    IntentFile,
    SourceRoot,
    SourceDir,
    SourceFile,
    GenerationMetadata,
    IndexedMetadata,
    DependencyRoot,
    ExtensionsRoot,
    Extension,
    Skill,
    Hook,
    LocalConfigRoot,
    ConfigFile,
    AnalysisRoot,
    Suggestion,
    TechStackManifest,
}

impl NodeType {
    /// Every node type, in declaration order.
    pub const ALL: [Self; 24] = [
        Self::Project,
        Self::BuildContainer,
        Self::BuildRun,
        Self::SpecsRoot,
        Self::SpecsDir,
        Self::SpecsFile,
        Self::IntentRoot,
        Self::IntentDir,
        Self::IntentFile,
        Self::SourceRoot,
        Self::SourceDir,
        Self::SourceFile,
        Self::GenerationMetadata,
        Self::IndexedMetadata,
        Self::DependencyRoot,
        Self::ExtensionsRoot,
        Self::Extension,
        Self::Skill,
        Self::Hook,
        Self::LocalConfigRoot,
        Self::ConfigFile,
        Self::AnalysisRoot,
        Self::Suggestion,
        Self::TechStackManifest,
    ];

    /// The kebab-case tag stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::BuildContainer => "build-container",
            Self::BuildRun => "build-run",
            Self::SpecsRoot => "specs-root",
            Self::SpecsDir => "specs-dir",
            Self::SpecsFile => "specs-file",
            Self::IntentRoot => "intent-root",
            Self::IntentDir => "intent-dir",
            Self::IntentFile => "intent-file",
            Self::SourceRoot => "source-root",
            Self::SourceDir => "source-dir",
            Self::SourceFile => "source-file",
            Self::GenerationMetadata => "generation-metadata",
            Self::IndexedMetadata => "indexed-metadata",
            Self::DependencyRoot => "dependency-root",
            Self::ExtensionsRoot => "extensions-root",
            Self::Extension => "extension",
            Self::Skill => "skill",
            Self::Hook => "hook",
            Self::LocalConfigRoot => "local-config-root",
            Self::ConfigFile => "config-file",
            Self::AnalysisRoot => "analysis-root",
            Self::Suggestion => "suggestion",
            Self::TechStackManifest => "tech-stack-manifest",
        }
    }

    /// Node types allowed as this type's parent. Empty means the type is a root.
    #[must_use]
    pub const fn allowed_parents(self) -> &'static [Self] {
        use NodeType::*;
        match self {
            Project => &[],
            BuildContainer | SpecsRoot | DependencyRoot | ExtensionsRoot | LocalConfigRoot => {
                &[Project]
            }
            BuildRun => &[BuildContainer],
            IntentRoot | SourceRoot | AnalysisRoot | TechStackManifest => &[BuildRun],
            SpecsDir | SpecsFile => &[SpecsRoot, SpecsDir],
            IntentDir | IntentFile => &[IntentRoot, IntentDir],
            SourceDir | SourceFile => &[SourceRoot, SourceDir],
            GenerationMetadata => &[SourceFile],
            IndexedMetadata => &[IntentFile],
            Suggestion => &[AnalysisRoot],
            Extension => &[ExtensionsRoot],
            Skill | Hook => &[Extension],
            ConfigFile => &[LocalConfigRoot],
        }
    }

    /// Check that a node of this type may be placed under `parent`.
    pub fn check_parent(self, parent: Option<Self>) -> Result<(), IntentError> {
        let allowed = self.allowed_parents();
        let ok = match parent {
            None => allowed.is_empty(),
            Some(parent) => allowed.contains(&parent),
        };
        if ok {
            Ok(())
        } else {
            Err(IntentError::InvalidParentType {
                child: self.as_str().to_string(),
                parent: parent.map_or("none", Self::as_str).to_string(),
            })
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = IntentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s).ok_or_else(|| IntentError::Other {
            message: format!("Unknown node type '{s}'"),
        })
    }
}

/// Lifecycle flag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Active,
    Completed,
    Failed,
    Deleted,
}

impl NodeStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = IntentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "deleted" => Ok(Self::Deleted),
            other => Err(IntentError::Other {
                message: format!("Unknown node status '{other}'"),
            }),
        }
    }
}

/// A persisted node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub parent_id: Option<String>,
    pub scope_id: String,
    pub status: NodeStatus,
    pub node_type: NodeType,
    pub name: String,
    pub text_content: Option<String>,
    pub text_content_hash: Option<String>,
    pub structured_content: Option<Value>,
    pub structured_content_hash: Option<String>,
    pub structured_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Creation order; larger is newer.
    pub seq: i64,
}

impl Node {
    /// Read a string field of the structured payload.
    #[must_use]
    pub fn structured_str(&self, field: &str) -> Option<&str> {
        self.structured_content.as_ref()?.get(field)?.as_str()
    }
}

/// Content and identity of a node to create or update.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub parent_id: Option<String>,
    pub scope_id: String,
    pub node_type: NodeType,
    pub name: String,
    pub status: NodeStatus,
    pub text_content: Option<String>,
    pub structured_content: Option<Value>,
}

impl NewNode {
    pub fn new(scope_id: impl Into<String>, node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            parent_id: None,
            scope_id: scope_id.into(),
            node_type,
            name: name.into(),
            status: NodeStatus::Active,
            text_content: None,
            structured_content: None,
        }
    }

    /// Child of `parent`, in the parent's scope.
    pub fn child_of(parent: &Node, node_type: NodeType, name: impl Into<String>) -> Self {
        Self::new(parent.scope_id.clone(), node_type, name).with_parent(&parent.id)
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_structured(mut self, value: Value) -> Self {
        self.structured_content = Some(value);
        self
    }

    #[must_use]
    pub const fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }
}

/// Predicates for [`GraphStore::filter`]. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub parent_id: Option<String>,
    /// Only nodes without a parent.
    pub roots_only: bool,
    pub scope_id: Option<String>,
    pub node_type: Option<NodeType>,
    pub name: Option<String>,
    pub status: Option<NodeStatus>,
    pub include_deleted: bool,
    /// Order by the unique-key fields instead of creation order.
    pub ordered: bool,
}

impl NodeFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn parent(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }

    #[must_use]
    pub const fn roots(mut self) -> Self {
        self.roots_only = true;
        self
    }

    #[must_use]
    pub fn scope(mut self, scope_id: &str) -> Self {
        self.scope_id = Some(scope_id.to_string());
        self
    }

    #[must_use]
    pub const fn node_type(mut self, node_type: NodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    #[must_use]
    pub const fn status(mut self, status: NodeStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub const fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    #[must_use]
    pub const fn ordered(mut self) -> Self {
        self.ordered = true;
        self
    }
}

/// A directed, labelled edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from_id: String,
    pub to_id: String,
    pub label: String,
}
