//! Console progress for builds.
//!
//! Each stage of a build shows a spinner line while it runs and a finished
//! line when it completes. Spinners are hidden when the
//! `INTENTCODE_NO_PROGRESS` environment variable is set, under `--quiet`, or
//! when the caller asks for a hidden reporter (tests, embedded use).

use crate::constants::NO_PROGRESS_ENV_VAR;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn is_progress_disabled() -> bool {
    std::env::var(NO_PROGRESS_ENV_VAR).is_ok()
}

/// Spinner-based reporter for build stages.
#[derive(Clone)]
pub struct BuildProgress {
    bar: Option<ProgressBar>,
}

impl BuildProgress {
    /// Create a visible reporter unless progress is disabled by environment.
    #[must_use]
    pub fn new() -> Self {
        if is_progress_disabled() {
            return Self::hidden();
        }

        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar: Some(bar),
        }
    }

    /// A reporter that prints nothing.
    #[must_use]
    pub const fn hidden() -> Self {
        Self {
            bar: None,
        }
    }

    /// Whether anything will be drawn.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.bar.is_some()
    }

    /// Show that a stage started.
    pub fn start_stage(&self, project: &str, stage: &str) {
        if let Some(bar) = &self.bar {
            bar.set_prefix(project.to_string());
            bar.set_message(format!("{stage}..."));
        }
    }

    /// Update the message for the running stage (e.g. the file being compiled).
    pub fn detail(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.to_string());
        }
    }

    /// Print a permanent line above the spinner.
    pub fn println(&self, line: &str) {
        if let Some(bar) = &self.bar {
            bar.println(line);
        }
    }

    /// Finish and clear the spinner with a final message.
    pub fn finish(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(message.to_string());
        }
    }

    /// Remove the spinner without leaving a line behind.
    pub fn clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl Default for BuildProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{prefix:.bold} {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_reporter_is_silent() {
        let progress = BuildProgress::hidden();
        assert!(!progress.is_visible());
        progress.start_stage("web", "compile");
        progress.detail("src/main.rs");
        progress.finish("done");
    }
}
