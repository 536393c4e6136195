//! `intentcode build`: run the build pipeline for a registered project.

use super::CliConfig;
use crate::build::BuildSummary;
use crate::constants::DEFAULT_SCOPE;
use crate::core::CancelFlag;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct BuildCommand {
    /// Registered project name.
    name: String,

    /// Scope the project is registered in.
    #[arg(short, long, default_value = DEFAULT_SCOPE)]
    scope: String,

    /// Print the build summary as JSON.
    #[arg(long)]
    json: bool,
}

impl BuildCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let workspace = config.workspace()?;

        let cancel = cancel_on_ctrl_c();
        let summary = workspace.with_cancel_flag(cancel).run_build(&self.scope, &self.name).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_summary(&summary);
        }
        Ok(())
    }
}

/// A cancel flag raised by the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let signalled = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling after the current step...".yellow());
            signalled.cancel();
        }
    });
    cancel
}

fn print_summary(summary: &BuildSummary) {
    println!("{} Built {}", "✓".green(), summary.project.bold());
    for target in &summary.compiled {
        println!("  {} {target}", "compiled".green());
    }
    for target in &summary.skipped {
        println!("  {} {target}", "unchanged".dimmed());
    }
    for failure in &summary.failed {
        println!("  {} {}", "failed".red(), failure.intent_path);
        for error in &failure.errors {
            println!("      {error}");
        }
    }
    if summary.intent_files_written + summary.intent_files_deleted > 0 {
        println!(
            "  intent files: {} written, {} deleted",
            summary.intent_files_written, summary.intent_files_deleted
        );
    }
    if summary.suggestions > 0 {
        println!("  {} suggestions recorded", summary.suggestions);
    }
    println!(
        "  {} generations ({} from cache), {} re-plans",
        summary.generations, summary.cache_hits, summary.replans
    );
}
