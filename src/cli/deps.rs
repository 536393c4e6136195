//! `intentcode deps`: dependency manifest commands.

use super::CliConfig;
use crate::constants::DEFAULT_SCOPE;
use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

#[derive(Subcommand)]
pub enum DepsCommand {
    /// Check that .intentcode/deps.json matches the build graph.
    Verify {
        /// Registered project name.
        name: String,

        /// Scope the project is registered in.
        #[arg(short, long, default_value = DEFAULT_SCOPE)]
        scope: String,
    },
}

impl DepsCommand {
    pub fn execute(self, config: &CliConfig) -> Result<()> {
        match self {
            Self::Verify {
                name,
                scope,
            } => {
                config.workspace()?.verify_dependencies(&scope, &name)?;
                println!("{} deps.json of {} matches the build graph", "✓".green(), name.bold());
                Ok(())
            }
        }
    }
}
