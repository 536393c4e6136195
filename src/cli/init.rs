//! `intentcode init`: create a project layout and register it.

use super::CliConfig;
use crate::constants::DEFAULT_SCOPE;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args)]
pub struct InitCommand {
    /// Project root directory; created when missing.
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Name to register the project under.
    #[arg(short, long)]
    name: String,

    /// Scope to register the project in.
    #[arg(short, long, default_value = DEFAULT_SCOPE)]
    scope: String,
}

impl InitCommand {
    pub fn execute(self, config: &CliConfig) -> Result<()> {
        let workspace = config.workspace()?;
        let project = workspace.init_project(&self.scope, &self.name, &self.path)?;

        println!(
            "{} Registered project {} ({})",
            "✓".green(),
            project.name.bold(),
            project.structured_str("path").unwrap_or_default()
        );
        println!("  Write specs under specs/ or intent files under intent/, then run 'intentcode build {}'", self.name);
        Ok(())
    }
}
