//! `specs-to-intent`: mirror `specs/`, turn the specifications into intent file
//! operations when they changed, apply them to `intent/`, and mirror `intent/`
//! into the run's intent-root.

use super::{StageEnv, StageOutcome};
use crate::build::{BuildSession, ProjectContext};
use crate::constants::{MARKDOWN_EXTENSION, TECH_STACK_SPEC};
use crate::generation::prompt::SpecsToIntentPromptContext;
use crate::generation::{CallSite, PromptFile, validators};
use crate::paths::{ArtifactFamily, PathMapper};
use crate::utils::atomic_write;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum IntentFileOp {
    Set { path: String, content: String },
    Delete { path: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentFileOps {
    file_ops: Vec<IntentFileOp>,
}

pub async fn run(env: &StageEnv<'_>, session: &mut BuildSession, context: &ProjectContext) -> Result<StageOutcome> {
    let specs = PathMapper::new(env.store, ArtifactFamily::Specs);
    let intent = PathMapper::new(env.store, ArtifactFamily::Intent);
    let intent_dir = context.layout.intent_dir();

    specs.sync_from_disk(&context.specs_root, &context.layout.specs_dir(), MARKDOWN_EXTENSION)?;
    intent.sync_from_disk(&context.intent_root, &intent_dir, MARKDOWN_EXTENSION)?;

    let spec_files: Vec<PromptFile> = specs
        .list_files(&context.specs_root)?
        .into_iter()
        .filter(|(path, _)| path != TECH_STACK_SPEC)
        .map(|(path, node)| PromptFile {
            path,
            text: node.text_content.unwrap_or_default(),
        })
        .collect();

    if spec_files.is_empty() {
        debug!(project = %context.project.name, "No specifications to translate");
        return Ok(StageOutcome::unchanged());
    }

    let existing: Vec<PromptFile> = intent
        .list_files(&context.intent_root)?
        .into_iter()
        .map(|(path, node)| PromptFile {
            path,
            text: node.text_content.unwrap_or_default(),
        })
        .collect();

    let prompt = env
        .templates
        .render(
            CallSite::SpecsToIntent,
            &SpecsToIntentPromptContext {
                specs: spec_files,
            },
        )?
        .with_existing_files("Existing intent files", &existing);

    let unchanged = env
        .protocol
        .latest_record(&context.specs_root.id)?
        .is_some_and(|record| record.prompt == prompt.stable());
    if unchanged {
        debug!(project = %context.project.name, "Specifications unchanged; keeping intent files");
        return Ok(StageOutcome::unchanged());
    }

    let generation = env.protocol.generate_validated(&prompt, validators::intent_file_ops).await?;
    session.summary_mut().record_generation(generation.from_cache);

    let ops: IntentFileOps =
        serde_json::from_value(generation.structured.clone()).context("Malformed intent file operations")?;
    let (written, deleted) = apply_ops(&intent_dir, &ops.file_ops)?;
    env.protocol.save_record(&context.specs_root.id, &generation)?;

    let summary = session.summary_mut();
    summary.intent_files_written += written;
    summary.intent_files_deleted += deleted;

    intent.sync_from_disk(&context.intent_root, &intent_dir, MARKDOWN_EXTENSION)?;
    info!(project = %context.project.name, written, deleted, "Intent files updated from specifications");
    Ok(StageOutcome::unchanged())
}

fn apply_ops(intent_dir: &Path, ops: &[IntentFileOp]) -> Result<(usize, usize)> {
    let (mut written, mut deleted) = (0, 0);
    for op in ops {
        match op {
            IntentFileOp::Set {
                path,
                content,
            } => {
                atomic_write(&intent_dir.join(path), content.as_bytes())?;
                written += 1;
            }
            IntentFileOp::Delete {
                path,
            } => {
                let file = intent_dir.join(path);
                match std::fs::remove_file(&file) {
                    Ok(()) => deleted += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(e).with_context(|| format!("Failed to delete intent file: {}", file.display()));
                    }
                }
            }
        }
    }
    Ok((written, deleted))
}
