//! In-memory state of one build.

use super::plan::BuildPlan;
use super::StageKind;
use crate::config::BuildConfig;
use crate::core::IntentError;
use crate::extensions::LoadedExtensions;
use crate::graph::Node;
use crate::project::ProjectLayout;
use serde::Serialize;
use std::collections::BTreeMap;

/// Graph handles and settings of one project taking part in a build.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub project: Node,
    pub specs_root: Node,
    pub intent_root: Node,
    pub source_root: Node,
    pub analysis_root: Node,
    pub local_config_root: Node,
    pub dependency_root: Node,
    pub extensions_root: Node,
    pub layout: ProjectLayout,
    pub config: BuildConfig,
}

/// A compile output that reported errors instead of source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileFailure {
    pub intent_path: String,
    pub errors: Vec<String>,
}

/// What a build did, reported when it completes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
    pub project: String,
    pub build_run_id: String,
    pub stages_run: Vec<StageKind>,
    pub replans: usize,
    /// Target paths written this build.
    pub compiled: Vec<String>,
    /// Target paths skipped as unchanged.
    pub skipped: Vec<String>,
    pub failed: Vec<CompileFailure>,
    pub intent_files_written: usize,
    pub intent_files_deleted: usize,
    pub indexed: usize,
    pub suggestions: usize,
    pub generations: usize,
    pub cache_hits: usize,
}

impl BuildSummary {
    /// Count one generation.
    pub fn record_generation(&mut self, from_cache: bool) {
        self.generations += 1;
        if from_cache {
            self.cache_hits += 1;
        }
    }

    fn note_target(list: &mut Vec<String>, target: &str) {
        if !list.iter().any(|t| t == target) {
            list.push(target.to_string());
        }
    }

    /// A target written this build. A later pass skipping it does not undo this.
    pub fn compiled(&mut self, target: &str) {
        self.skipped.retain(|t| t != target);
        Self::note_target(&mut self.compiled, target);
    }

    pub fn skipped(&mut self, target: &str) {
        if !self.compiled.iter().any(|t| t == target) {
            Self::note_target(&mut self.skipped, target);
        }
    }

    pub fn failed(&mut self, intent_path: &str, errors: Vec<String>) {
        self.failed.retain(|f| f.intent_path != intent_path);
        self.failed.push(CompileFailure {
            intent_path: intent_path.to_string(),
            errors,
        });
    }
}

/// Owned by the orchestrator for the duration of one build.
///
/// Stage handlers mutate it only through the narrow methods below.
#[derive(Debug)]
pub struct BuildSession {
    plan: BuildPlan,
    build_run: Node,
    projects: BTreeMap<u32, ProjectContext>,
    extensions: BTreeMap<u32, LoadedExtensions>,
    dependency_snapshots: BTreeMap<u32, Option<String>>,
    summary: BuildSummary,
}

impl BuildSession {
    #[must_use]
    pub fn new(plan: BuildPlan, build_run: Node, project_name: &str) -> Self {
        let summary = BuildSummary {
            project: project_name.to_string(),
            build_run_id: build_run.id.clone(),
            ..BuildSummary::default()
        };
        Self {
            plan,
            build_run,
            projects: BTreeMap::new(),
            extensions: BTreeMap::new(),
            dependency_snapshots: BTreeMap::new(),
            summary,
        }
    }

    /// Register a project and return its number.
    pub fn add_project(&mut self, context: ProjectContext) -> u32 {
        let number = self.projects.keys().next_back().map_or(1, |last| last + 1);
        self.dependency_snapshots.insert(number, context.dependency_root.structured_content_hash.clone());
        self.projects.insert(number, context);
        number
    }

    #[must_use]
    pub fn project_numbers(&self) -> Vec<u32> {
        self.projects.keys().copied().collect()
    }

    pub fn project(&self, number: u32) -> Result<&ProjectContext, IntentError> {
        self.projects.get(&number).ok_or_else(|| IntentError::Other {
            message: format!("No project #{number} in this build session"),
        })
    }

    #[must_use]
    pub const fn build_run(&self) -> &Node {
        &self.build_run
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<StageKind> {
        self.plan.current()
    }

    #[must_use]
    pub const fn plan(&self) -> &BuildPlan {
        &self.plan
    }

    /// Record the finished stage and move on. Returns whether stages remain.
    pub fn complete_stage(&mut self, stage: StageKind, dependencies_changed: bool) -> Result<bool, IntentError> {
        self.summary.stages_run.push(stage);
        let more = self.plan.complete_stage(dependencies_changed)?;
        self.summary.replans = self.plan.replans();
        Ok(more)
    }

    #[must_use]
    pub fn extensions(&self, number: u32) -> Option<&LoadedExtensions> {
        self.extensions.get(&number)
    }

    pub fn set_extensions(&mut self, number: u32, loaded: LoadedExtensions) {
        self.extensions.insert(number, loaded);
    }

    /// Store the dependency-root hash of a project. Returns whether it differs
    /// from the previous snapshot.
    pub fn refresh_dependency_snapshot(&mut self, number: u32, hash: Option<String>) -> bool {
        let previous = self.dependency_snapshots.insert(number, hash.clone());
        previous.flatten() != hash
    }

    pub fn summary_mut(&mut self) -> &mut BuildSummary {
        &mut self.summary
    }

    #[must_use]
    pub const fn summary(&self) -> &BuildSummary {
        &self.summary
    }

    #[must_use]
    pub fn into_summary(self) -> BuildSummary {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_compiled_wins_over_skipped() {
        let mut summary = BuildSummary::default();
        summary.skipped("src/a.rs");
        summary.compiled("src/a.rs");
        summary.skipped("src/a.rs");
        summary.compiled("src/a.rs");
        assert_eq!(summary.compiled, vec!["src/a.rs"]);
        assert!(summary.skipped.is_empty());
    }

    #[test]
    fn test_summary_failures_replace() {
        let mut summary = BuildSummary::default();
        summary.failed("a.rs.md", vec!["one".to_string()]);
        summary.failed("a.rs.md", vec!["two".to_string()]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].errors, vec!["two"]);
    }

    #[test]
    fn test_generation_counts() {
        let mut summary = BuildSummary::default();
        summary.record_generation(false);
        summary.record_generation(true);
        assert_eq!(summary.generations, 2);
        assert_eq!(summary.cache_hits, 1);
    }
}
