//! A generation provider that replays scripted replies.
//!
//! Replies are routed by the call site named on the prompt's `# task:` line.
//! Queued replies are used first, in order; once a call site's queue is empty
//! its default reply is returned. Every prompt is kept so tests can count and
//! inspect calls.

use crate::generation::{CallSite, GenerationOutput, GenerationProvider, ModelDescriptor};
use anyhow::{Result, anyhow};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// A structured payload.
    Structured(Value),
    /// Text with no structured payload.
    Text(String),
    /// A provider failure.
    Fail(String),
}

/// Scripted [`GenerationProvider`].
pub struct ScriptedProvider {
    model: ModelDescriptor,
    queued: Mutex<HashMap<CallSite, VecDeque<ScriptedReply>>>,
    defaults: Mutex<HashMap<CallSite, Value>>,
    prompts: Mutex<Vec<(Option<CallSite>, String)>>,
}

impl ScriptedProvider {
    /// A provider with no defaults: unscripted calls fail.
    pub fn new() -> Self {
        Self {
            model: ModelDescriptor::new("scripted"),
            queued: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose defaults pass every validator: a `cargo` tech stack,
    /// no intent file operations, no suggestions, a one-line index summary,
    /// and a trivial `main` for every compile.
    pub fn stub() -> Self {
        Self::new()
            .with_default(CallSite::TechStack, json!({"tool": "cargo", "runtimes": {"rust": {}}}))
            .with_default(CallSite::SpecsToIntent, json!({"fileOps": []}))
            .with_default(CallSite::Analyze, json!({"suggestions": []}))
            .with_default(CallSite::Index, json!({"summary": "Entry point.", "symbols": []}))
            .with_default(CallSite::Compile, json!({"targetSource": "fn main() {}\n"}))
    }

    #[must_use]
    pub fn with_model(mut self, id: &str) -> Self {
        self.model = ModelDescriptor::new(id);
        self
    }

    /// Set the reply used once a call site's queue is empty.
    #[must_use]
    pub fn with_default(self, site: CallSite, payload: Value) -> Self {
        self.set_default(site, payload);
        self
    }

    pub fn set_default(&self, site: CallSite, payload: Value) {
        if let Ok(mut defaults) = self.defaults.lock() {
            defaults.insert(site, payload);
        }
    }

    /// Queue a reply for the next call at `site`.
    pub fn push(&self, site: CallSite, reply: ScriptedReply) {
        if let Ok(mut queued) = self.queued.lock() {
            queued.entry(site).or_default().push_back(reply);
        }
    }

    /// Queue a structured payload for the next call at `site`.
    pub fn push_structured(&self, site: CallSite, payload: Value) {
        self.push(site, ScriptedReply::Structured(payload));
    }

    /// Prompts received at `site`, oldest first.
    pub fn prompts(&self, site: CallSite) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| {
                prompts.iter().filter(|(s, _)| *s == Some(site)).map(|(_, prompt)| prompt.clone()).collect()
            })
            .unwrap_or_default()
    }

    /// Number of calls made at `site`.
    pub fn calls(&self, site: CallSite) -> usize {
        self.prompts(site).len()
    }

    /// Number of calls made at any site.
    pub fn total_calls(&self) -> usize {
        self.prompts.lock().map(|prompts| prompts.len()).unwrap_or_default()
    }

    fn reply_for(&self, site: Option<CallSite>) -> Result<ScriptedReply> {
        let site = site.ok_or_else(|| anyhow!("Prompt has no '# task:' line"))?;
        let queued = self
            .queued
            .lock()
            .map_err(|_| anyhow!("Scripted provider poisoned"))?
            .get_mut(&site)
            .and_then(VecDeque::pop_front);
        if let Some(reply) = queued {
            return Ok(reply);
        }
        let defaults = self.defaults.lock().map_err(|_| anyhow!("Scripted provider poisoned"))?;
        defaults
            .get(&site)
            .cloned()
            .map(ScriptedReply::Structured)
            .ok_or_else(|| anyhow!("No scripted reply for {site}"))
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::stub()
    }
}

impl GenerationProvider for ScriptedProvider {
    fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<GenerationOutput>> {
        Box::pin(async move {
            let site = CallSite::from_prompt(prompt);
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push((site, prompt.to_string()));
            }
            match self.reply_for(site)? {
                ScriptedReply::Structured(value) => Ok(GenerationOutput {
                    raw_text: value.to_string(),
                    structured: Some(value),
                }),
                ScriptedReply::Text(text) => Ok(GenerationOutput {
                    structured: None,
                    raw_text: text,
                }),
                ScriptedReply::Fail(message) => Err(anyhow!(message)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_default() {
        let provider = ScriptedProvider::new().with_default(CallSite::Index, json!({"summary": "s"}));
        provider.push(CallSite::Index, ScriptedReply::Text("not json".to_string()));

        let first = provider.generate("# task: index\n").await.unwrap();
        assert!(first.structured.is_none());
        let second = provider.generate("# task: index\n").await.unwrap();
        assert_eq!(second.structured, Some(json!({"summary": "s"})));

        assert!(provider.generate("# task: compile\n").await.is_err());
        assert!(provider.generate("no task line").await.is_err());
        assert_eq!(provider.calls(CallSite::Index), 2);
        assert_eq!(provider.total_calls(), 4);
    }
}
