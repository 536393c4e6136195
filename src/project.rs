//! Projects on disk and in the graph.
//!
//! A project is a directory with this layout:
//!
//! ```text
//! <root>/
//! ├── specs/            natural-language specs (specs/tech-stack.md is special)
//! ├── intent/           intent files, one per target (src/main.rs.md -> src/main.rs)
//! ├── .intentcode/
//! │   ├── build.toml    build configuration
//! │   └── deps.json     dependency manifest, rewritten by builds
//! └── ...               compiled targets
//! ```
//!
//! [`Workspace`] ties the global graph database to these directories: it
//! registers projects and runs builds for them.

use crate::build::{BuildOrchestrator, BuildSummary, resolve_project};
use crate::config::{LocalConfigKind, database_path};
use crate::constants::{CONFIG_DIR, INTENT_DIR, MARKDOWN_EXTENSION, SPECS_DIR, TECH_STACK_SPEC};
use crate::core::{CancelFlag, IntentError};
use crate::deps::DependencyReconciler;
use crate::generation::GenerationProvider;
use crate::graph::{GraphStore, NewNode, Node, NodeFilter, NodeType};
use crate::paths::root_payload;
use crate::utils::{BuildProgress, ensure_dir};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Directory layout of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    /// The layout recorded on a project node.
    pub fn of_project(project: &Node) -> Result<Self> {
        let root = project.structured_str("path").ok_or_else(|| IntentError::MissingField {
            node_type: NodeType::Project.to_string(),
            field: "path".to_string(),
        })?;
        Ok(Self::new(root))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn specs_dir(&self) -> PathBuf {
        self.root.join(SPECS_DIR)
    }

    #[must_use]
    pub fn intent_dir(&self) -> PathBuf {
        self.root.join(INTENT_DIR)
    }

    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.root.join(CONFIG_DIR)
    }

    #[must_use]
    pub fn deps_path(&self) -> PathBuf {
        LocalConfigKind::Deps.path_in(&self.root)
    }

    #[must_use]
    pub fn build_config_path(&self) -> PathBuf {
        LocalConfigKind::Build.path_in(&self.root)
    }

    #[must_use]
    pub fn tech_stack_path(&self) -> PathBuf {
        self.specs_dir().join(TECH_STACK_SPEC)
    }

    /// Target path, relative to the project root, of an intent file given
    /// relative to `intent/`. `None` when the name has no target left once the
    /// `.md` suffix is stripped.
    #[must_use]
    pub fn target_relative(&self, intent_relative: &str) -> Option<String> {
        let target = intent_relative.strip_suffix(&format!(".{MARKDOWN_EXTENSION}"))?;
        let file_name = target.rsplit('/').next().unwrap_or(target);
        if file_name.is_empty() || target.ends_with('/') {
            return None;
        }
        Some(target.to_string())
    }

    /// Absolute target path of an intent file given relative to `intent/`.
    #[must_use]
    pub fn target_path(&self, intent_relative: &str) -> Option<PathBuf> {
        self.target_relative(intent_relative).map(|target| self.root.join(target))
    }

    /// Create `specs/`, `intent/` and `.intentcode/`.
    pub fn create_dirs(&self) -> Result<()> {
        ensure_dir(&self.specs_dir())?;
        ensure_dir(&self.intent_dir())?;
        ensure_dir(&self.config_dir())?;
        Ok(())
    }
}

/// The global graph database plus the services builds need.
pub struct Workspace {
    home: PathBuf,
    store: Arc<GraphStore>,
    provider: Option<Arc<dyn GenerationProvider>>,
    cancel: CancelFlag,
    progress: BuildProgress,
}

impl Workspace {
    /// Open (creating if needed) the graph database under `home`.
    pub fn open(home: &Path) -> Result<Self> {
        ensure_dir(home)?;
        let store = GraphStore::open(&database_path(home))?;
        Ok(Self::with_store(home, Arc::new(store)))
    }

    /// A workspace over an existing store, e.g. an in-memory one in tests.
    pub fn with_store(home: &Path, store: Arc<GraphStore>) -> Self {
        Self {
            home: home.to_path_buf(),
            store,
            provider: None,
            cancel: CancelFlag::new(),
            progress: BuildProgress::hidden(),
        }
    }

    /// Generate with `provider` instead of the one in each project's `build.toml`.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: BuildProgress) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Create the project layout under `root` and register the project.
    ///
    /// Registering an existing name again updates its root directory.
    pub fn init_project(&self, scope: &str, name: &str, root: &Path) -> Result<Node> {
        ensure_dir(root)?;
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve project root: {}", root.display()))?;
        ProjectLayout::new(&root).create_dirs()?;

        let project =
            self.store.upsert(None, NewNode::new(scope, NodeType::Project, name).with_structured(root_payload(&root)))?;
        info!(scope = %scope, project = %name, root = %root.display(), "Project registered");
        Ok(project)
    }

    /// The project named `name` in `scope`.
    pub fn find_project(&self, scope: &str, name: &str) -> Result<Node> {
        resolve_project(&self.store, scope, name)
    }

    /// Every registered project of `scope`, by name.
    pub fn list_projects(&self, scope: &str) -> Result<Vec<Node>> {
        let mut projects = self.store.filter(&NodeFilter::new().roots().scope(scope).node_type(NodeType::Project))?;
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    fn orchestrator(&self) -> BuildOrchestrator {
        let mut orchestrator = BuildOrchestrator::new(Arc::clone(&self.store), &self.home)
            .with_cancel_flag(self.cancel.clone())
            .with_progress(self.progress.clone());
        if let Some(provider) = &self.provider {
            orchestrator = orchestrator.with_provider(Arc::clone(provider));
        }
        orchestrator
    }

    /// Build `name` in `scope`.
    pub async fn run_build(&self, scope: &str, name: &str) -> Result<BuildSummary> {
        self.orchestrator().run_build(scope, name).await
    }

    /// Build from synchronous code by driving a fresh Tokio runtime.
    ///
    /// Must not be called from inside a runtime.
    pub fn run_build_blocking(&self, scope: &str, name: &str) -> Result<BuildSummary> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start the async runtime")?;
        runtime.block_on(self.run_build(scope, name))
    }

    /// Check the project's `deps.json` against the graph.
    pub fn verify_dependencies(&self, scope: &str, name: &str) -> Result<()> {
        let project = self.find_project(scope, name)?;
        DependencyReconciler::new(&self.store).verify(&project)
    }
}
