//! `update-deps`: fold front-matter declarations into the dependency views,
//! rewrite `deps.json`, and report whether the project's dependencies moved
//! since the last snapshot.

use super::{StageEnv, StageOutcome, intent_files};
use crate::build::{BuildSession, ProjectContext};
use crate::deps::{DependencyReconciler, declared_dependencies};
use anyhow::{Context, Result};
use tracing::{debug, info};

pub fn run(
    env: &StageEnv<'_>,
    session: &mut BuildSession,
    number: u32,
    context: &ProjectContext,
) -> Result<StageOutcome> {
    let reconciler = DependencyReconciler::new(env.store);

    for (path, node) in intent_files(env, context)? {
        let declared = declared_dependencies(node.text_content.as_deref().unwrap_or_default())
            .with_context(|| format!("Invalid dependencies in intent file {path}"))?;
        reconciler.apply_declared(&context.project, &node, &declared)?;
    }
    reconciler.write_manifest(&context.project)?;

    let root = reconciler.dependency_root(&context.project)?;
    let changed = session.refresh_dependency_snapshot(number, root.structured_content_hash);
    if changed {
        info!(project = %context.project.name, "Dependencies changed; re-planning");
    } else {
        debug!(project = %context.project.name, "Dependencies unchanged");
    }

    Ok(StageOutcome {
        dependencies_changed: changed,
    })
}
