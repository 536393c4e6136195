//! `define-tech-stack`: turn `specs/tech-stack.md` into a manifest, merge it
//! into the project's dependencies and install the extensions it asks for.

use super::{StageEnv, StageOutcome};
use crate::build::{BuildSession, ProjectContext};
use crate::constants::TECH_STACK_NODE_NAME;
use crate::core::IntentError;
use crate::deps::{DependencyReconciler, DepsManifest};
use crate::extensions::ExtensionLoader;
use crate::generation::prompt::TechStackPromptContext;
use crate::generation::{CallSite, validators};
use crate::graph::{NewNode, NodeType};
use crate::utils::read_text_if_exists;
use anyhow::Result;
use tracing::{debug, info, warn};

pub async fn run(
    env: &StageEnv<'_>,
    session: &mut BuildSession,
    number: u32,
    context: &ProjectContext,
) -> Result<StageOutcome> {
    let path = context.layout.tech_stack_path();
    let Some(spec_text) = read_text_if_exists(&path)? else {
        debug!(project = %context.project.name, "No tech stack description");
        return Ok(StageOutcome::unchanged());
    };

    let loader = ExtensionLoader::new(env.store);
    let mut available: Vec<String> = loader.templates()?.into_iter().map(|n| n.name).collect();
    available.sort();

    let prompt = env.templates.render(
        CallSite::TechStack,
        &TechStackPromptContext {
            spec_text: spec_text.clone(),
            available_extensions: available,
        },
    )?;
    let generation = env.protocol.generate_validated(&prompt, validators::tech_stack_manifest).await?;
    session.summary_mut().record_generation(generation.from_cache);

    let node = env.store.upsert(
        None,
        NewNode::child_of(session.build_run(), NodeType::TechStackManifest, TECH_STACK_NODE_NAME)
            .with_text(spec_text)
            .with_structured(generation.structured.clone()),
    )?;
    env.protocol.save_record(&node.id, &generation)?;

    let manifest: DepsManifest = serde_json::from_value(generation.structured.clone()).map_err(IntentError::from)?;
    let root = DependencyReconciler::new(env.store).apply_tech_stack(&context.project, &manifest)?;

    for (name, min_version) in manifest.extensions.iter().flatten() {
        env.cancel.check()?;
        match loader.install(&context.project, name, min_version) {
            Ok(installed) => debug!(extension = %installed.name, "Extension ready"),
            Err(e) if matches!(e.downcast_ref::<IntentError>(), Some(IntentError::ExtensionNotFound { .. })) => {
                warn!(project = %context.project.name, extension = %name, requirement = %min_version, "{e}");
            }
            Err(e) => return Err(e),
        }
    }
    session.set_extensions(number, loader.loaded_for(&context.project)?);

    // Tech stack merges are not reported as dependency changes.
    session.refresh_dependency_snapshot(number, root.structured_content_hash);

    info!(
        project = %context.project.name,
        tool = manifest.tool.as_deref().unwrap_or("-"),
        "Tech stack defined"
    );
    Ok(StageOutcome::unchanged())
}
