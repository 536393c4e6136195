//! Stage handlers.
//!
//! Each handler runs one [`StageKind`] over every project of the session and
//! reports whether it changed a project's dependencies.

pub mod analyze_intent;
pub mod compile;
pub mod index;
pub mod specs_to_intent;
pub mod tech_stack;
pub mod update_deps;
pub mod verify_internals;

use super::session::{BuildSession, ProjectContext};
use super::StageKind;
use crate::core::CancelFlag;
use crate::generation::{GenerationProtocol, PromptTemplates};
use crate::graph::{GraphStore, Node, NodeType};
use crate::paths::{ArtifactFamily, PathMapper};
use crate::utils::{BuildProgress, canonical_json};
use anyhow::Result;

/// Services shared by every stage of one build.
pub struct StageEnv<'a> {
    pub store: &'a GraphStore,
    pub protocol: &'a GenerationProtocol,
    pub templates: &'a PromptTemplates,
    pub cancel: &'a CancelFlag,
    pub progress: &'a BuildProgress,
}

/// Result of running one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageOutcome {
    pub dependencies_changed: bool,
}

impl StageOutcome {
    #[must_use]
    pub const fn unchanged() -> Self {
        Self {
            dependencies_changed: false,
        }
    }
}

/// Run `stage` over every project of the session.
pub async fn run_stage(env: &StageEnv<'_>, session: &mut BuildSession, stage: StageKind) -> Result<StageOutcome> {
    let mut outcome = StageOutcome::unchanged();
    for number in session.project_numbers() {
        env.cancel.check()?;
        let context = session.project(number)?.clone();
        env.progress.start_stage(&context.project.name, stage.as_str());

        let project_outcome = match stage {
            StageKind::VerifyInternals => verify_internals::run(env, &context)?,
            StageKind::DefineTechStack => tech_stack::run(env, session, number, &context).await?,
            StageKind::SpecsToIntent => specs_to_intent::run(env, session, &context).await?,
            StageKind::UpdateDeps => update_deps::run(env, session, number, &context)?,
            StageKind::AnalyzeIntent => analyze_intent::run(env, session, &context).await?,
            StageKind::Index => index::run(env, session, &context).await?,
            StageKind::Compile => compile::run(env, session, number, &context).await?,
        };
        outcome.dependencies_changed |= project_outcome.dependencies_changed;
    }
    Ok(outcome)
}

/// Intent files of the current run with their text, sorted by path.
pub(crate) fn intent_files(env: &StageEnv<'_>, context: &ProjectContext) -> Result<Vec<(String, Node)>> {
    PathMapper::new(env.store, ArtifactFamily::Intent).list_files(&context.intent_root)
}

/// The tech stack manifest generated in this build, as canonical JSON.
pub(crate) fn tech_stack_text(env: &StageEnv<'_>, session: &BuildSession) -> Result<Option<String>> {
    let run = session.build_run();
    let node = env.store.get_by_unique_key(
        Some(&run.id),
        &run.scope_id,
        NodeType::TechStackManifest,
        crate::constants::TECH_STACK_NODE_NAME,
    )?;
    Ok(node.and_then(|n| n.structured_content).map(|content| canonical_json(&content)))
}

/// Build-runs of the project older than the current one, newest first.
pub(crate) fn earlier_runs(env: &StageEnv<'_>, session: &BuildSession) -> Result<Vec<Node>> {
    let current = session.build_run();
    let Some(container_id) = current.parent_id.as_deref() else {
        return Ok(Vec::new());
    };
    let mut runs: Vec<Node> = env
        .store
        .children(container_id, NodeType::BuildRun)?
        .into_iter()
        .filter(|run| run.id != current.id)
        .collect();
    runs.sort_by(|a, b| b.seq.cmp(&a.seq));
    Ok(runs)
}

/// The leaf at `relative_path` under the `family` root of each earlier run,
/// newest first.
pub(crate) fn earlier_files(
    env: &StageEnv<'_>,
    session: &BuildSession,
    family: ArtifactFamily,
    relative_path: &str,
) -> Result<Vec<Node>> {
    let mapper = PathMapper::new(env.store, family);
    let root_name = match family {
        ArtifactFamily::Intent => crate::constants::INTENT_ROOT_NAME,
        ArtifactFamily::Source => crate::constants::SOURCE_ROOT_NAME,
        _ => return Ok(Vec::new()),
    };

    let mut files = Vec::new();
    for run in earlier_runs(env, session)? {
        let Some(root) = env.store.get_by_unique_key(Some(&run.id), &run.scope_id, family.root_type(), root_name)?
        else {
            continue;
        };
        if let Some(file) = mapper.get_file(&root, relative_path)? {
            files.push(file);
        }
    }
    Ok(files)
}
