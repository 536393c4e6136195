//! The stage sequence of one build and its cursor.

use super::StageKind;
use crate::config::Strategy;
use crate::core::IntentError;

/// Planned stages, the cursor into them, and the re-plan budget.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    strategy: Strategy,
    stages: Vec<StageKind>,
    cursor: usize,
    replans: usize,
    max_replans: usize,
}

impl BuildPlan {
    /// The stage sequence for `strategy`.
    #[must_use]
    pub fn baseline(strategy: Strategy) -> Vec<StageKind> {
        let mut stages = vec![
            StageKind::VerifyInternals,
            StageKind::DefineTechStack,
            StageKind::SpecsToIntent,
            StageKind::UpdateDeps,
            StageKind::AnalyzeIntent,
        ];
        if strategy == Strategy::Indexed {
            stages.push(StageKind::Index);
        }
        stages.extend([StageKind::Compile, StageKind::UpdateDeps, StageKind::VerifyInternals]);
        stages
    }

    #[must_use]
    pub fn new(strategy: Strategy, max_replans: usize) -> Self {
        Self {
            strategy,
            stages: Self::baseline(strategy),
            cursor: 0,
            replans: 0,
            max_replans,
        }
    }

    /// The stage under the cursor; `None` once the build is done.
    #[must_use]
    pub fn current(&self) -> Option<StageKind> {
        self.stages.get(self.cursor).copied()
    }

    /// Move to the next stage. Returns `false` when the cursor passed the end.
    pub fn advance(&mut self) -> bool {
        if self.cursor < self.stages.len() {
            self.cursor += 1;
        }
        !self.is_done()
    }

    /// Drop everything after the current stage and append a fresh baseline.
    ///
    /// Fails with [`IntentError::ReplanLimitExceeded`] once `max_replans`
    /// re-plans have already happened; the plan is left unchanged then.
    pub fn replan(&mut self) -> Result<(), IntentError> {
        if self.replans >= self.max_replans {
            return Err(IntentError::ReplanLimitExceeded {
                limit: self.max_replans,
            });
        }
        self.stages.truncate(self.cursor + 1);
        self.stages.extend(Self::baseline(self.strategy));
        self.replans += 1;
        Ok(())
    }

    /// Finish the current stage: re-plan if it changed dependencies, then advance.
    /// Returns whether stages remain.
    pub fn complete_stage(&mut self, dependencies_changed: bool) -> Result<bool, IntentError> {
        if dependencies_changed {
            self.replan()?;
        }
        Ok(self.advance())
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cursor >= self.stages.len()
    }

    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn stages(&self) -> &[StageKind] {
        &self.stages
    }

    #[must_use]
    pub const fn replans(&self) -> usize {
        self.replans
    }
}
