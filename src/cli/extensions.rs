//! `intentcode extensions`: extension template commands.

use super::CliConfig;
use crate::config::default_extensions_dir;
use crate::extensions::ExtensionLoader;
use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum ExtensionsCommand {
    /// List extension packages available as templates.
    List {
        /// Directory to read packages from instead of `<home>/extensions`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

impl ExtensionsCommand {
    pub fn execute(self, config: &CliConfig) -> Result<()> {
        match self {
            Self::List {
                dir,
            } => {
                let workspace = config.workspace()?;
                let dir = dir.unwrap_or_else(|| default_extensions_dir(workspace.home()));
                let loader = ExtensionLoader::new(workspace.store());
                loader.load_templates(&dir)?;

                let templates = loader.templates()?;
                if templates.is_empty() {
                    println!("No extensions found in {}", dir.display());
                    return Ok(());
                }
                for template in templates {
                    let description = template.structured_str("description").unwrap_or_default();
                    println!("{} {}", template.name.bold(), description.dimmed());
                }
                Ok(())
            }
        }
    }
}
