//! `compile`: turn each intent file into its target source file.
//!
//! Files are compiled one at a time in path order. Before generating, the
//! stable part of the compile prompt is compared with the latest record for the
//! same target; when they match and the target file still exists, the file is
//! skipped and its record and dependencies are carried into this run.

use super::index::summary_of;
use super::{StageEnv, StageOutcome, earlier_files, intent_files, tech_stack_text};
use crate::build::{BuildSession, ProjectContext};
use crate::config::Strategy;
use crate::constants::GENERATION_NODE_NAME;
use crate::deps::{DependencyDelta, DependencyReconciler, declared_dependencies};
use crate::extensions::LoadedExtensions;
use crate::generation::prompt::CompilePromptContext;
use crate::generation::{CallSite, GenerationRecord, Prompt, PromptFile, validators};
use crate::graph::{GraphStore, NewNode, Node, NodeType};
use crate::paths::{ArtifactFamily, FileContent, PathMapper};
use crate::utils::{atomic_write, hash_text, read_text_if_exists};
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Whether a target can be left as it is: the latest record was produced by
/// the same model from the same stable prompt, and the target file exists.
#[must_use]
pub fn should_skip(previous: Option<&GenerationRecord>, model_id: &str, prompt: &Prompt, target_path: &Path) -> bool {
    previous.is_some_and(|record| record.model_id == model_id && record.prompt == prompt.stable())
        && target_path.is_file()
}

pub async fn run(
    env: &StageEnv<'_>,
    session: &mut BuildSession,
    number: u32,
    context: &ProjectContext,
) -> Result<StageOutcome> {
    let source = PathMapper::new(env.store, ArtifactFamily::Source);
    let reconciler = DependencyReconciler::new(env.store);
    let files = intent_files(env, context)?;
    let tech_stack = tech_stack_text(env, session)?;
    let skills = skill_files(session.extensions(number));
    let model_id = env.protocol.model().id.clone();

    for (intent_path, intent_node) in &files {
        env.cancel.check()?;
        env.progress.detail(intent_path);

        let Some(target) = context.layout.target_relative(intent_path) else {
            warn!(intent_file = %intent_path, "Intent file name does not map to a target; skipping");
            continue;
        };
        let target_path = context.layout.root().join(&target);
        let intent_text = intent_node.text_content.clone().unwrap_or_default();

        let prompt = env.templates.render(
            CallSite::Compile,
            &CompilePromptContext {
                target_path: target.clone(),
                intent_path: intent_path.clone(),
                declared_dependencies: declared_dependencies(&intent_text)
                    .with_context(|| format!("Invalid dependencies in intent file {intent_path}"))?,
                intent_text,
                tech_stack: tech_stack.clone(),
                skills: skills.clone(),
                context_files: context_files(env.store, context.config.strategy, &files, intent_path)?,
            },
        )?;

        let current = source.get_file(&context.source_root, &target)?;
        let previous = match &current {
            Some(node) => env.protocol.latest_record(&node.id)?,
            None => None,
        };
        let previous = match previous {
            Some(record) => Some(record),
            None => latest_earlier_record(env, session, &target)?,
        };

        if should_skip(previous.as_ref(), &model_id, &prompt, &target_path) {
            debug!(target = %target, "Prompt unchanged and target present; skipping");
            let node = match current {
                Some(node) => node,
                None => {
                    let text = read_text_if_exists(&target_path)?.unwrap_or_default();
                    source.upsert_file(&context.source_root, &target, source_content(text, intent_path))?
                }
            };
            if let Some(record) = &previous {
                if record.owner_node_id != node.id {
                    env.protocol.carry_record(record, &node.id)?;
                }
            }
            if let Some(earlier_intent) = earlier_files(env, session, ArtifactFamily::Intent, intent_path)?.first() {
                reconciler.carry_forward(&context.project, earlier_intent, intent_node)?;
            }
            session.summary_mut().skipped(&target);
            continue;
        }

        let prompt = match read_text_if_exists(&target_path)? {
            Some(existing) => prompt.with_existing_source(&existing),
            None => prompt,
        };
        let generation = env.protocol.generate_validated(&prompt, validators::compile_output).await?;
        session.summary_mut().record_generation(generation.from_cache);

        let errors = string_list(generation.structured.get("errors"));
        if !errors.is_empty() {
            warn!(intent_file = %intent_path, errors = ?errors, "Intent file could not be compiled");
            session.summary_mut().failed(intent_path, errors);
            continue;
        }

        let target_source = generation
            .structured
            .get("targetSource")
            .and_then(Value::as_str)
            .context("Compile output has no targetSource")?;
        atomic_write(&target_path, target_source.as_bytes())?;

        let node = source.upsert_file(&context.source_root, &target, source_content(target_source, intent_path))?;
        env.protocol.save_record(&node.id, &generation)?;
        env.store.upsert(
            None,
            NewNode::child_of(&node, NodeType::GenerationMetadata, GENERATION_NODE_NAME).with_structured(json!({
                "intentPath": intent_path,
                "model": generation.model.id,
                "cacheKey": generation.cache_key,
                "fromCache": generation.from_cache,
                "attempts": generation.attempts,
                "promptHash": hash_text(&generation.stable_prompt),
            })),
        )?;

        let deltas = DependencyDelta::from_output(&generation.structured)?;
        if !deltas.is_empty() {
            reconciler.process_deltas(&context.project, intent_node, &deltas)?;
        }

        info!(target = %target, from_cache = generation.from_cache, attempts = generation.attempts, "Compiled");
        session.summary_mut().compiled(&target);
    }

    Ok(StageOutcome::unchanged())
}

fn source_content(text: impl Into<String>, intent_path: &str) -> FileContent {
    FileContent::text(text).with_structured(json!({ "intentPath": intent_path }))
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items.iter().map(|item| item.as_str().map_or_else(|| item.to_string(), str::to_string)).collect()
        })
        .unwrap_or_default()
}

/// The newest record of `target` in an earlier build-run.
fn latest_earlier_record(env: &StageEnv<'_>, session: &BuildSession, target: &str) -> Result<Option<GenerationRecord>> {
    for node in earlier_files(env, session, ArtifactFamily::Source, target)? {
        if let Some(record) = env.protocol.latest_record(&node.id)? {
            return Ok(Some(record));
        }
    }
    Ok(None)
}

/// Skills of the loaded extensions as prompt files named `<extension>/<skill>`.
fn skill_files(loaded: Option<&LoadedExtensions>) -> Vec<PromptFile> {
    let Some(loaded) = loaded else {
        return Vec::new();
    };
    let names: HashMap<&str, &str> = loaded
        .extensions
        .iter()
        .map(|e| (e.id.as_str(), e.structured_str("name").unwrap_or(e.name.as_str())))
        .collect();

    let mut skills: Vec<PromptFile> = loaded
        .skills
        .iter()
        .map(|skill| {
            let extension = skill.parent_id.as_deref().and_then(|id| names.get(id)).copied().unwrap_or_default();
            PromptFile {
                path: format!("{extension}/{}", skill.name),
                text: skill.text_content.clone().unwrap_or_default(),
            }
        })
        .collect();
    skills.sort_by(|a, b| a.path.cmp(&b.path));
    skills
}

/// Context for one intent file: index summaries of every other file with the
/// indexed strategy, the full text of same-directory siblings otherwise.
fn context_files(
    store: &GraphStore,
    strategy: Strategy,
    files: &[(String, Node)],
    intent_path: &str,
) -> Result<Vec<PromptFile>> {
    let directory = |path: &str| path.rsplit_once('/').map_or("", |(dir, _)| dir).to_string();
    let own_dir = directory(intent_path);

    let mut context = Vec::new();
    for (path, node) in files {
        if path == intent_path {
            continue;
        }
        match strategy {
            Strategy::Indexed => {
                if let Some(summary) = summary_of(store, node)? {
                    context.push(PromptFile {
                        path: path.clone(),
                        text: summary,
                    });
                }
            }
            Strategy::DirectAnalysis => {
                if directory(path) == own_dir {
                    context.push(PromptFile {
                        path: path.clone(),
                        text: node.text_content.clone().unwrap_or_default(),
                    });
                }
            }
        }
    }
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ModelDescriptor;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(model_id: &str, prompt: &str) -> GenerationRecord {
        GenerationRecord {
            id: "r".to_string(),
            owner_node_id: "n".to_string(),
            model_id: model_id.to_string(),
            temperature: None,
            prompt: prompt.to_string(),
            prompt_hash: hash_text(prompt),
            output_text: None,
            output_text_hash: None,
            output_structured: None,
            output_structured_hash: None,
            created_at: Utc::now(),
            seq: 1,
        }
    }

    #[test]
    fn test_should_skip() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("main.rs");
        let prompt = Prompt::new(CallSite::Compile, "# task: compile\nbody\n".to_string());
        let model = ModelDescriptor::default();
        let same = record(&model.id, prompt.stable());

        // No target file yet.
        assert!(!should_skip(Some(&same), &model.id, &prompt, &target));

        std::fs::write(&target, "fn main() {}").unwrap();
        assert!(should_skip(Some(&same), &model.id, &prompt, &target));
        // The existing-source section does not take part in the comparison.
        let with_source = prompt.clone().with_existing_source("fn main() {}");
        assert!(should_skip(Some(&same), &model.id, &with_source, &target));

        assert!(!should_skip(None, &model.id, &prompt, &target));
        assert!(!should_skip(Some(&record(&model.id, "# task: compile\nother\n")), &model.id, &prompt, &target));
        assert!(!should_skip(Some(&same), "another-model", &prompt, &target));
    }

    #[test]
    fn test_string_list() {
        assert_eq!(string_list(Some(&json!(["a", 1]))), vec!["a", "1"]);
        assert!(string_list(None).is_empty());
    }

    #[test]
    fn test_context_files_direct_uses_siblings() {
        let store = GraphStore::in_memory().unwrap();
        let project = store.create(NewNode::new("default", NodeType::Project, "web")).unwrap();
        let node = |name: &str, text: &str| Node {
            text_content: Some(text.to_string()),
            name: name.to_string(),
            ..project.clone()
        };
        let files = vec![
            ("lib.rs.md".to_string(), node("lib.rs.md", "lib")),
            ("src/a.rs.md".to_string(), node("a.rs.md", "a")),
            ("src/b.rs.md".to_string(), node("b.rs.md", "b")),
        ];

        let context = context_files(&store, Strategy::DirectAnalysis, &files, "src/a.rs.md").unwrap();
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].path, "src/b.rs.md");

        // Nothing is indexed, so the indexed strategy has no context.
        assert!(context_files(&store, Strategy::Indexed, &files, "src/a.rs.md").unwrap().is_empty());
    }
}
