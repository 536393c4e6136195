//! A registered project in a temporary directory, built with a scripted provider.

use super::fixtures::{IntentFixture, SpecFixture};
use super::provider::ScriptedProvider;
use crate::build::BuildSummary;
use crate::config::BuildConfig;
use crate::constants::DEFAULT_SCOPE;
use crate::graph::{GraphStore, Node};
use crate::project::{ProjectLayout, Workspace};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Temporary home plus one project, sharing an in-memory graph store.
pub struct TestProject {
    pub temp_dir: TempDir,
    pub home: PathBuf,
    pub root: PathBuf,
    pub name: String,
    pub store: Arc<GraphStore>,
    pub provider: Arc<ScriptedProvider>,
    pub project: Node,
}

impl TestProject {
    /// A project named `web` with the stub provider.
    pub fn new() -> Result<Self> {
        Self::with_provider(ScriptedProvider::stub())
    }

    pub fn with_provider(provider: ScriptedProvider) -> Result<Self> {
        super::init_test_logging(None);

        let temp_dir = TempDir::new()?;
        let home = temp_dir.path().join("home");
        let store = Arc::new(GraphStore::in_memory()?);
        let workspace = Workspace::with_store(&home, Arc::clone(&store));
        let project = workspace.init_project(DEFAULT_SCOPE, "web", &temp_dir.path().join("web"))?;
        let root = ProjectLayout::of_project(&project)?.root().to_path_buf();

        Ok(Self {
            temp_dir,
            home,
            root,
            name: "web".to_string(),
            store,
            provider: Arc::new(provider),
            project,
        })
    }

    /// A workspace over the shared store using the scripted provider.
    pub fn workspace(&self) -> Workspace {
        Workspace::with_store(&self.home, Arc::clone(&self.store)).with_provider(self.provider.clone())
    }

    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(&self.root)
    }

    pub fn write_intent(&self, fixture: &IntentFixture) -> Result<PathBuf> {
        fixture.write_to(&self.root)
    }

    pub fn write_spec(&self, fixture: &SpecFixture) -> Result<PathBuf> {
        fixture.write_to(&self.root)
    }

    pub async fn write_config(&self, config: &BuildConfig) -> Result<()> {
        config.save_to(&self.layout().build_config_path()).await
    }

    pub async fn build(&self) -> Result<BuildSummary> {
        self.workspace().run_build(DEFAULT_SCOPE, &self.name).await
    }

    pub fn read(&self, relative: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(relative)).ok()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
