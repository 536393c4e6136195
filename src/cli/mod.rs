//! Command-line interface for intentcode.
//!
//! A thin front end over [`Workspace`](crate::project::Workspace):
//!
//! - `init` - Create a project layout and register the project
//! - `build` - Run the build pipeline for a registered project
//! - `deps verify` - Check `.intentcode/deps.json` against the build graph
//! - `extensions list` - List extension templates available to projects
//!
//! # Global Options
//!
//! - `--home <DIR>` - intentcode home (graph database, extension templates);
//!   defaults to `INTENTCODE_HOME`, then `~/.intentcode`
//! - `--verbose` / `--quiet` - Log level (`debug` / off); `RUST_LOG` otherwise
//! - `--no-progress` - Disable spinners
//!
//! # Examples
//!
//! ```bash
//! intentcode init ./web --name web
//! intentcode build web
//! intentcode --verbose build web --scope team
//! intentcode deps verify web
//! ```

mod build;
mod deps;
mod extensions;
mod init;

use crate::config::home_dir;
use crate::constants::NO_PROGRESS_ENV_VAR;
use crate::project::Workspace;
use crate::utils::BuildProgress;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

pub use build::BuildCommand;
pub use deps::DepsCommand;
pub use extensions::ExtensionsCommand;
pub use init::InitCommand;

static INIT_LOGGING: Once = Once::new();

/// Settings derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Filter directive for the log subscriber; `None` disables logging.
    pub log_level: Option<String>,
    pub no_progress: bool,
    pub home: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Export settings that other modules read from the environment.
    pub fn apply_to_env(&self) {
        if self.no_progress {
            // SAFETY: called once from the main thread before any other thread starts.
            unsafe { std::env::set_var(NO_PROGRESS_ENV_VAR, "1") };
        }
    }

    /// Install the global log subscriber, once per process.
    ///
    /// `RUST_LOG` takes precedence over the level chosen by flags.
    pub fn init_logging(&self) {
        let Some(level) = self.log_level.clone() else {
            return;
        };
        INIT_LOGGING.call_once(|| {
            let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init();
        });
    }

    /// Open the workspace in the configured home directory.
    pub fn workspace(&self) -> Result<Workspace> {
        let home = home_dir(self.home.as_deref())?;
        let progress = if self.no_progress || self.log_level.is_none() {
            BuildProgress::hidden()
        } else {
            BuildProgress::new()
        };
        Ok(Workspace::open(&home)?.with_progress(progress))
    }
}

/// Compile intent files into source code.
#[derive(Parser)]
#[command(
    name = "intentcode",
    about = "Compile pseudo-code intent files into source code",
    version,
    long_about = "intentcode turns natural-language specs into intent files and intent files into \
                  source code through validated, cached generation, recompiling only what changed."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show debug output (same as `RUST_LOG=debug`).
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// intentcode home directory (graph database and extension templates).
    #[arg(long, global = true, env = "INTENTCODE_HOME")]
    home: Option<PathBuf>,

    /// Disable progress spinners.
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project layout and register it.
    Init(InitCommand),

    /// Build a registered project.
    Build(BuildCommand),

    /// Inspect the dependency manifest.
    #[command(subcommand)]
    Deps(DepsCommand),

    /// Inspect extension templates.
    #[command(subcommand)]
    Extensions(ExtensionsCommand),
}

impl Cli {
    /// Run the parsed command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            home: self.home.clone(),
        }
    }

    /// Run the command with an explicit configuration.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.apply_to_env();
        config.init_logging();

        match self.command {
            Commands::Init(cmd) => cmd.execute(&config),
            Commands::Build(cmd) => cmd.execute(&config).await,
            Commands::Deps(cmd) => cmd.execute(&config),
            Commands::Extensions(cmd) => cmd.execute(&config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_levels() {
        let cli = Cli::parse_from(["intentcode", "--verbose", "build", "web"]);
        assert_eq!(cli.build_config().log_level.as_deref(), Some("debug"));

        let cli = Cli::parse_from(["intentcode", "-q", "build", "web"]);
        assert_eq!(cli.build_config().log_level, None);

        let cli = Cli::parse_from(["intentcode", "--home", "/tmp/ic", "--no-progress", "deps", "verify", "web"]);
        let config = cli.build_config();
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert!(config.no_progress);
        assert_eq!(config.home, Some(PathBuf::from("/tmp/ic")));
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["intentcode", "-v", "-q", "build", "web"]).is_err());
    }
}
