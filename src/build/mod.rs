//! The build pipeline
//!
//! A build is a sequence of stages run one after another over every project in
//! a [`BuildSession`]:
//!
//! ```text
//! verify-internals → define-tech-stack → specs-to-intent → update-deps
//!   → analyze-intent → [index] → compile → update-deps → verify-internals
//! ```
//!
//! `index` runs only with the `indexed` strategy. When an `update-deps` stage
//! finds that a project's dependencies changed, the [`BuildPlan`] truncates to
//! the current stage and appends a fresh copy of the whole sequence, up to a
//! configured number of re-plans.
//!
//! [`BuildOrchestrator`] owns the session for the duration of one build and
//! dispatches each stage to its handler in [`stages`].

mod orchestrator;
mod plan;
mod session;
pub mod stages;

pub use orchestrator::{BuildOrchestrator, resolve_project};
pub use plan::BuildPlan;
pub use session::{BuildSession, BuildSummary, CompileFailure, ProjectContext};

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    VerifyInternals,
    DefineTechStack,
    SpecsToIntent,
    UpdateDeps,
    AnalyzeIntent,
    Index,
    Compile,
}

impl StageKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VerifyInternals => "verify-internals",
            Self::DefineTechStack => "define-tech-stack",
            Self::SpecsToIntent => "specs-to-intent",
            Self::UpdateDeps => "update-deps",
            Self::AnalyzeIntent => "analyze-intent",
            Self::Index => "index",
            Self::Compile => "compile",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
