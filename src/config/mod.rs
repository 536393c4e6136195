//! Configuration
//!
//! Two layers:
//!
//! - **Build configuration** (`<project>/.intentcode/build.toml`): model,
//!   strategy, retry and retention bounds, optional command provider. A missing
//!   file means every default.
//! - **Home directory** (`~/.intentcode`, or `INTENTCODE_HOME`): the graph
//!   database and extension templates shared by all projects.
//!
//! # Example `build.toml`
//!
//! ```toml
//! strategy = "indexed"
//! max_replans = 3
//! extensions_dir = "~/intentcode-extensions"
//!
//! [model]
//! id = "local-coder"
//! temperature = 0.2
//!
//! [provider]
//! program = "my-llm"
//! args = ["--json"]
//! timeout_secs = 120
//! ```

use crate::constants::{
    BUILD_CONFIG_FILE, BUILD_RUN_RETENTION, CONFIG_DIR, DATABASE_FILE, DEFAULT_PROVIDER_TIMEOUT_SECS,
    DEPS_FILE, EXTENSIONS_DIR, GENERATION_RECORD_RETENTION, HOME_ENV_VAR, MAX_GENERATION_ATTEMPTS,
    MAX_REPLANS,
};
use crate::core::IntentError;
use crate::generation::ModelDescriptor;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Code generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Index every intent file before compiling and feed summaries as context.
    Indexed,
    /// Compile with sibling intent files as context.
    #[default]
    DirectAnalysis,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Indexed => f.write_str("indexed"),
            Self::DirectAnalysis => f.write_str("direct-analysis"),
        }
    }
}

/// External command used as the generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: Option<u64>,
}

const fn default_provider_timeout() -> Option<u64> {
    Some(DEFAULT_PROVIDER_TIMEOUT_SECS)
}

/// Per-project build configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub model: ModelDescriptor,
    pub strategy: Strategy,
    pub max_replans: usize,
    pub max_attempts: usize,
    pub build_run_retention: usize,
    pub record_retention: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            model: ModelDescriptor::default(),
            strategy: Strategy::default(),
            max_replans: MAX_REPLANS,
            max_attempts: MAX_GENERATION_ATTEMPTS,
            build_run_retention: BUILD_RUN_RETENTION,
            record_retention: GENERATION_RECORD_RETENTION,
            extensions_dir: None,
            provider: None,
        }
    }
}

impl BuildConfig {
    /// Load from `path`, or defaults when the file does not exist.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read build config from {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse build config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty TOML, creating parent directories.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize build config")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write build config to {}", path.display()))?;
        Ok(())
    }

    fn validate(&self) -> Result<(), IntentError> {
        let zero = |field: &str| IntentError::ConfigError {
            message: format!("{field} must be at least 1"),
        };
        if self.max_attempts == 0 {
            return Err(zero("max_attempts"));
        }
        if self.build_run_retention == 0 {
            return Err(zero("build_run_retention"));
        }
        if self.record_retention == 0 {
            return Err(zero("record_retention"));
        }
        if self.model.id.trim().is_empty() {
            return Err(IntentError::ConfigError {
                message: "model.id must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// The extensions directory with `~` and environment variables expanded.
    pub fn expanded_extensions_dir(&self) -> Result<Option<PathBuf>> {
        self.extensions_dir
            .as_deref()
            .map(|dir| {
                shellexpand::full(dir)
                    .map(|expanded| PathBuf::from(expanded.as_ref()))
                    .map_err(|e| {
                        IntentError::ConfigError {
                            message: format!("Cannot expand extensions_dir '{dir}': {e}"),
                        }
                        .into()
                    })
            })
            .transpose()
    }
}

/// Config files kept under `.intentcode/`, keyed by a fixed tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalConfigKind {
    Deps,
    Build,
}

impl LocalConfigKind {
    pub const ALL: [Self; 2] = [Self::Deps, Self::Build];

    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Deps => "deps",
            Self::Build => "build",
        }
    }

    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Deps => DEPS_FILE,
            Self::Build => BUILD_CONFIG_FILE,
        }
    }

    /// Path of this file inside a project root.
    #[must_use]
    pub fn path_in(self, project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_DIR).join(self.file_name())
    }
}

/// Resolve the intentcode home directory.
///
/// An explicit path wins, then `INTENTCODE_HOME`, then `~/.intentcode`.
pub fn home_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(HOME_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(shellexpand::tilde(&path).as_ref()));
        }
    }
    let home = dirs::home_dir().ok_or_else(|| IntentError::ConfigError {
        message: "Could not determine home directory".to_string(),
    })?;
    Ok(home.join(CONFIG_DIR))
}

/// Graph database location inside a home directory.
#[must_use]
pub fn database_path(home: &Path) -> PathBuf {
    home.join(DATABASE_FILE)
}

/// Default extension template directory inside a home directory.
#[must_use]
pub fn default_extensions_dir(home: &Path) -> PathBuf {
    home.join(EXTENSIONS_DIR)
}
