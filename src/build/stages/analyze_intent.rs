//! `analyze-intent`: one review of all intent files, stored as suggestion nodes.

use super::{StageEnv, StageOutcome, intent_files, tech_stack_text};
use crate::build::{BuildSession, ProjectContext};
use crate::generation::prompt::AnalyzePromptContext;
use crate::generation::{CallSite, PromptFile, validators};
use crate::graph::{NewNode, NodeType};
use anyhow::Result;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use tracing::{debug, info};

pub async fn run(env: &StageEnv<'_>, session: &mut BuildSession, context: &ProjectContext) -> Result<StageOutcome> {
    let files: Vec<PromptFile> = intent_files(env, context)?
        .into_iter()
        .map(|(path, node)| PromptFile {
            path,
            text: node.text_content.unwrap_or_default(),
        })
        .collect();
    if files.is_empty() {
        debug!(project = %context.project.name, "No intent files to analyze");
        return Ok(StageOutcome::unchanged());
    }

    let known: BTreeSet<String> = files.iter().map(|f| f.path.clone()).collect();
    let prompt = env.templates.render(
        CallSite::Analyze,
        &AnalyzePromptContext {
            intent_files: files,
            tech_stack: tech_stack_text(env, session)?,
        },
    )?;
    let generation = env.protocol.generate_validated(&prompt, validators::suggestions(&known)).await?;
    session.summary_mut().record_generation(generation.from_cache);
    env.protocol.save_record(&context.analysis_root.id, &generation)?;

    for stale in env.store.children(&context.analysis_root.id, NodeType::Suggestion)? {
        env.store.delete_cascade(&stale.id)?;
    }

    let suggestions = generation.structured.get("suggestions").and_then(Value::as_array).cloned().unwrap_or_default();
    for (i, suggestion) in suggestions.iter().enumerate() {
        let text = suggestion.get("text").and_then(Value::as_str).unwrap_or_default();
        let intent_path = suggestion.get("intentPath").cloned().unwrap_or(Value::Null);
        env.store.create(
            NewNode::child_of(&context.analysis_root, NodeType::Suggestion, format!("{:03}", i + 1))
                .with_text(text)
                .with_structured(json!({ "intentPath": intent_path })),
        )?;
    }

    session.summary_mut().suggestions = suggestions.len();
    info!(project = %context.project.name, suggestions = suggestions.len(), "Intent analyzed");
    Ok(StageOutcome::unchanged())
}
