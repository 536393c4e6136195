//! Drives one build from project lookup to a completed (or failed) build-run.

use super::plan::BuildPlan;
use super::session::{BuildSession, BuildSummary, ProjectContext};
use super::stages::{StageEnv, run_stage};
use crate::config::{BuildConfig, LocalConfigKind, default_extensions_dir};
use crate::constants::{
    ANALYSIS_ROOT_NAME, BUILD_CONTAINER_NAME, INTENT_ROOT_NAME, LOCAL_CONFIG_ROOT_NAME, SOURCE_ROOT_NAME,
    SPECS_ROOT_NAME, default_lock_timeout,
};
use crate::core::{CancelFlag, IntentError};
use crate::deps::DependencyReconciler;
use crate::extensions::ExtensionLoader;
use crate::generation::{CommandProvider, GenerationProtocol, GenerationProvider, PromptTemplates};
use crate::graph::{GraphStore, NewNode, Node, NodeFilter, NodeStatus, NodeType};
use crate::lock::ProjectLock;
use crate::paths::{ArtifactFamily, FileContent, PathMapper, root_payload};
use crate::project::ProjectLayout;
use crate::utils::{BuildProgress, read_text_if_exists};
use anyhow::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use strsim::levenshtein;
use tracing::{debug, error, info};

/// Maximum edit distance, as a percentage of the requested name, for a
/// registered project to be suggested instead.
const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

/// The project `name` in `scope`, or [`IntentError::ProjectNotFound`] naming
/// the closest registered project.
pub fn resolve_project(store: &GraphStore, scope: &str, name: &str) -> Result<Node> {
    if let Some(project) = store.get_by_unique_key(None, scope, NodeType::Project, name)? {
        return Ok(project);
    }

    let threshold = name.len().max(4) * SIMILARITY_THRESHOLD_PERCENT / 100;
    let closest = store
        .filter(&NodeFilter::new().roots().scope(scope).node_type(NodeType::Project))?
        .into_iter()
        .map(|p| (levenshtein(name, &p.name), p.name))
        .filter(|(distance, _)| *distance <= threshold)
        .min()
        .map(|(_, name)| name);

    Err(IntentError::ProjectNotFound {
        scope: scope.to_string(),
        name: name.to_string(),
        closest,
    }
    .into())
}

/// Runs builds against one graph store.
pub struct BuildOrchestrator {
    store: Arc<GraphStore>,
    home: PathBuf,
    provider: Option<Arc<dyn GenerationProvider>>,
    extensions_dir: Option<PathBuf>,
    cancel: CancelFlag,
    progress: BuildProgress,
    lock_timeout: Duration,
}

impl BuildOrchestrator {
    pub fn new(store: Arc<GraphStore>, home: &Path) -> Self {
        Self {
            store,
            home: home.to_path_buf(),
            provider: None,
            extensions_dir: None,
            cancel: CancelFlag::new(),
            progress: BuildProgress::hidden(),
            lock_timeout: default_lock_timeout(),
        }
    }

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

    /// Load extension templates from `dir` instead of the configured directory.
    #[must_use]
    pub fn with_extensions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extensions_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Build the project `name` of `scope`.
    ///
    /// Holds the project's build lock throughout. The build-run ends up
    /// `completed`, or `failed` when any stage fails, in which case the error
    /// is returned.
    pub async fn run_build(&self, scope: &str, name: &str) -> Result<BuildSummary> {
        let project = resolve_project(&self.store, scope, name)?;
        let layout = ProjectLayout::of_project(&project)?;
        let config = BuildConfig::load_from(&layout.build_config_path()).await?;

        let _lock = ProjectLock::acquire_with_timeout(&self.home, scope, name, self.lock_timeout).await?;
        info!(scope = %scope, project = %name, strategy = %config.strategy, "Starting build");

        let provider = self.provider(&config)?;
        let protocol = GenerationProtocol::new(Arc::clone(&self.store), provider)
            .with_max_attempts(config.max_attempts)
            .with_record_retention(config.record_retention);
        let templates = PromptTemplates::new()?;

        let extensions_dir = match &self.extensions_dir {
            Some(dir) => dir.clone(),
            None => config.expanded_extensions_dir()?.unwrap_or_else(|| default_extensions_dir(&self.home)),
        };
        ExtensionLoader::new(&self.store).load_templates(&extensions_dir)?;

        let build_run = self.start_build_run(&project, config.build_run_retention)?;
        let result = self.drive(&project, &build_run, layout, config, &protocol, &templates).await;

        match result {
            Ok(summary) => {
                self.store.set_status(&build_run.id, NodeStatus::Completed)?;
                self.progress.finish(&format!("Built {name}"));
                info!(
                    project = %name,
                    compiled = summary.compiled.len(),
                    skipped = summary.skipped.len(),
                    failed = summary.failed.len(),
                    replans = summary.replans,
                    "Build completed"
                );
                Ok(summary)
            }
            Err(e) => {
                self.progress.clear();
                error!(project = %name, build_run = %build_run.id, "Build failed: {e:#}");
                self.store.set_status(&build_run.id, NodeStatus::Failed)?;
                Err(e)
            }
        }
    }

    fn provider(&self, config: &BuildConfig) -> Result<Arc<dyn GenerationProvider>> {
        if let Some(provider) = &self.provider {
            return Ok(Arc::clone(provider));
        }
        match &config.provider {
            Some(provider) => Ok(Arc::new(CommandProvider::from_config(config.model.clone(), provider)?)),
            None => Err(IntentError::ConfigError {
                message: "No generation provider configured; add a [provider] section to .intentcode/build.toml"
                    .to_string(),
            }
            .into()),
        }
    }

    /// Prune old build-runs so that `retention` remain including a new one,
    /// then create it.
    fn start_build_run(&self, project: &Node, retention: usize) -> Result<Node> {
        let container =
            self.store.get_or_create(NewNode::child_of(project, NodeType::BuildContainer, BUILD_CONTAINER_NAME))?;
        for old in self.store.get_oldest(&container.id, NodeType::BuildRun, retention.saturating_sub(1))? {
            let removed = self.store.delete_cascade(&old.id)?;
            debug!(build_run = %old.name, removed, "Pruned build-run");
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"), &id[..8]);
        self.store.create(NewNode::child_of(&container, NodeType::BuildRun, name))
    }

    async fn drive(
        &self,
        project: &Node,
        build_run: &Node,
        layout: ProjectLayout,
        config: BuildConfig,
        protocol: &GenerationProtocol,
        templates: &PromptTemplates,
    ) -> Result<BuildSummary> {
        let context = self.project_context(project, build_run, layout, config)?;
        let loaded = ExtensionLoader::new(&self.store).loaded_for(project)?;

        let plan = BuildPlan::new(context.config.strategy, context.config.max_replans);
        let mut session = BuildSession::new(plan, build_run.clone(), &project.name);
        let number = session.add_project(context);
        session.set_extensions(number, loaded);

        let env = StageEnv {
            store: &self.store,
            protocol,
            templates,
            cancel: &self.cancel,
            progress: &self.progress,
        };

        while let Some(stage) = session.current_stage() {
            self.cancel.check()?;
            debug!(stage = %stage, "Running stage");
            let outcome = run_stage(&env, &mut session, stage).await?;
            if !session.complete_stage(stage, outcome.dependencies_changed)? {
                break;
            }
        }

        Ok(session.into_summary())
    }

    /// Create the per-run roots and refresh the project-level ones.
    fn project_context(
        &self,
        project: &Node,
        build_run: &Node,
        layout: ProjectLayout,
        config: BuildConfig,
    ) -> Result<ProjectContext> {
        let store = &self.store;
        let specs_root = store.upsert(
            None,
            NewNode::child_of(project, NodeType::SpecsRoot, SPECS_ROOT_NAME)
                .with_structured(root_payload(&layout.specs_dir())),
        )?;
        let intent_root = store.create(
            NewNode::child_of(build_run, NodeType::IntentRoot, INTENT_ROOT_NAME)
                .with_structured(root_payload(&layout.intent_dir())),
        )?;
        let source_root = store.create(
            NewNode::child_of(build_run, NodeType::SourceRoot, SOURCE_ROOT_NAME)
                .with_structured(root_payload(layout.root())),
        )?;
        let analysis_root = store.create(NewNode::child_of(build_run, NodeType::AnalysisRoot, ANALYSIS_ROOT_NAME))?;
        let local_config_root =
            store.get_or_create(NewNode::child_of(project, NodeType::LocalConfigRoot, LOCAL_CONFIG_ROOT_NAME))?;
        mirror_local_config(store, &local_config_root, layout.root())?;

        Ok(ProjectContext {
            project: project.clone(),
            specs_root,
            intent_root,
            source_root,
            analysis_root,
            local_config_root,
            dependency_root: DependencyReconciler::new(store).dependency_root(project)?,
            extensions_root: ExtensionLoader::new(store).extensions_root(project)?,
            layout,
            config,
        })
    }
}

/// Mirror each `.intentcode/` config file into a `config-file` node named by
/// its tag, removing nodes whose file is gone.
fn mirror_local_config(store: &GraphStore, root: &Node, project_root: &Path) -> Result<()> {
    let mapper = PathMapper::new(store, ArtifactFamily::LocalConfig);
    for kind in LocalConfigKind::ALL {
        match read_text_if_exists(&kind.path_in(project_root))? {
            Some(text) => {
                mapper.upsert_file(
                    root,
                    kind.tag(),
                    FileContent::text(text).with_structured(serde_json::json!({ "file": kind.file_name() })),
                )?;
            }
            None => {
                mapper.delete_file(root, kind.tag())?;
            }
        }
    }
    Ok(())
}
