//! `index`: summarise each intent file into an `indexed-metadata` child, used
//! as compile context by the indexed strategy.

use super::{StageEnv, StageOutcome, intent_files};
use crate::build::{BuildSession, ProjectContext};
use crate::constants::INDEX_NODE_NAME;
use crate::generation::prompt::IndexPromptContext;
use crate::generation::{CallSite, validators};
use crate::graph::{GraphStore, NewNode, Node, NodeType};
use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info};

pub async fn run(env: &StageEnv<'_>, session: &mut BuildSession, context: &ProjectContext) -> Result<StageOutcome> {
    let mut indexed = 0;
    for (path, node) in intent_files(env, context)? {
        env.cancel.check()?;
        env.progress.detail(&path);

        let prompt = env.templates.render(
            CallSite::Index,
            &IndexPromptContext {
                intent_path: path.clone(),
                intent_text: node.text_content.clone().unwrap_or_default(),
            },
        )?;
        let generation = env.protocol.generate_validated(&prompt, validators::index_output).await?;
        session.summary_mut().record_generation(generation.from_cache);

        let metadata = env.store.upsert(
            None,
            NewNode::child_of(&node, NodeType::IndexedMetadata, INDEX_NODE_NAME)
                .with_structured(generation.structured.clone()),
        )?;
        env.protocol.save_record(&metadata.id, &generation)?;
        debug!(intent_file = %path, from_cache = generation.from_cache, "Indexed");
        indexed += 1;
    }

    session.summary_mut().indexed = indexed;
    info!(project = %context.project.name, indexed, "Intent files indexed");
    Ok(StageOutcome::unchanged())
}

/// The index summary of an intent file, if it has been indexed.
pub fn summary_of(store: &GraphStore, intent_file: &Node) -> Result<Option<String>> {
    let metadata =
        store.get_by_unique_key(Some(&intent_file.id), &intent_file.scope_id, NodeType::IndexedMetadata, INDEX_NODE_NAME)?;
    Ok(metadata
        .and_then(|m| m.structured_content)
        .and_then(|content| content.get("summary").and_then(Value::as_str).map(str::to_string)))
}
