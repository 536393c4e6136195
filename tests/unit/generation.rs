use anyhow::Result;
use futures::future::BoxFuture;
use intentcode::core::IntentError;
use intentcode::generation::{
    CallSite, GenerationCache, GenerationOutput, GenerationProtocol, GenerationProvider, GenerationRecords,
    ModelDescriptor, Prompt, validators,
};
use intentcode::graph::{GraphStore, NewNode, NodeType};
use intentcode::test_utils::{ScriptedProvider, ScriptedReply};
use serde_json::json;
use std::sync::Arc;
use std::sync::Mutex;

fn compile_prompt(body: &str) -> Prompt {
    Prompt::new(CallSite::Compile, format!("# task: compile\n{body}\n"))
}

#[tokio::test]
async fn test_cached_entry_short_circuits_provider() {
    let store = Arc::new(GraphStore::in_memory().unwrap());
    let provider = Arc::new(ScriptedProvider::new());
    let protocol = GenerationProtocol::new(Arc::clone(&store), provider.clone());

    let prompt = compile_prompt("hello");
    let cache = GenerationCache::new(&store);
    let key = GenerationCache::cache_key("scripted", &prompt.full());
    cache
        .save("scripted", &key, &prompt.full(), Some("cached"), None, Some(&json!({"targetSource": "cached"})))
        .unwrap();

    let generation = protocol.generate_validated(&prompt, validators::compile_output).await.unwrap();
    assert!(generation.from_cache);
    assert_eq!(generation.attempts, 0);
    assert_eq!(generation.structured["targetSource"], "cached");
    assert_eq!(provider.total_calls(), 0);
}

/// Writes a bogus cache entry under the prompt's key on every call and
/// records whether the previous call's entry was still there.
struct CachePoisoner {
    model: ModelDescriptor,
    store: Arc<GraphStore>,
    valid_on_call: usize,
    seen_stale_entry: Mutex<Vec<bool>>,
}

impl GenerationProvider for CachePoisoner {
    fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<GenerationOutput>> {
        Box::pin(async move {
            let cache = GenerationCache::new(&self.store);
            let key = GenerationCache::cache_key(&self.model.id, prompt);
            let stale = cache.get(&self.model.id, &key)?.is_some();
            let mut seen = self.seen_stale_entry.lock().unwrap();
            seen.push(stale);

            cache.save(&self.model.id, &key, prompt, Some("bogus"), None, Some(&json!({"bogus": true})))?;
            if seen.len() == self.valid_on_call {
                let value = json!({"targetSource": "fn main() {}"});
                return Ok(GenerationOutput {
                    raw_text: value.to_string(),
                    structured: Some(value),
                });
            }
            Ok(GenerationOutput {
                raw_text: "{}".to_string(),
                structured: Some(json!({})),
            })
        })
    }
}

#[tokio::test]
async fn test_rejected_attempt_evicts_cache_entry() {
    let store = Arc::new(GraphStore::in_memory().unwrap());
    let provider = Arc::new(CachePoisoner {
        model: ModelDescriptor::new("poisoner"),
        store: Arc::clone(&store),
        valid_on_call: 3,
        seen_stale_entry: Mutex::new(Vec::new()),
    });
    let protocol = GenerationProtocol::new(Arc::clone(&store), provider.clone());

    let prompt = compile_prompt("evict");
    let generation = protocol.generate_validated(&prompt, validators::compile_output).await.unwrap();
    assert_eq!(generation.attempts, 3);

    // Every attempt found the cache empty: the entry written during a rejected
    // attempt was evicted before the next one.
    assert_eq!(*provider.seen_stale_entry.lock().unwrap(), vec![false, false, false]);

    let cache = GenerationCache::new(&store);
    let entry = cache.get("poisoner", &generation.cache_key).unwrap().unwrap();
    assert_eq!(entry.output_structured, Some(json!({"targetSource": "fn main() {}"})));
}

#[tokio::test]
async fn test_exhausted_attempts_leave_no_cache_entry() {
    let store = Arc::new(GraphStore::in_memory().unwrap());
    let provider = Arc::new(ScriptedProvider::new());
    provider.push(CallSite::Compile, ScriptedReply::Text("no json here".to_string()));
    provider.push(CallSite::Compile, ScriptedReply::Fail("provider down".to_string()));
    let protocol = GenerationProtocol::new(Arc::clone(&store), provider.clone()).with_max_attempts(2);

    let prompt = compile_prompt("exhaust");
    let err = protocol.generate_validated(&prompt, validators::compile_output).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IntentError>(),
        Some(IntentError::GenerationExhausted { attempts: 2, .. })
    ));
    assert_eq!(provider.calls(CallSite::Compile), 2);

    let lookup = GenerationCache::new(&store).try_get("scripted", &prompt.full()).unwrap();
    assert!(lookup.found.is_none());
}

#[tokio::test]
async fn test_records_keep_newest_k() {
    let store = Arc::new(GraphStore::in_memory().unwrap());
    let owner = store.create(NewNode::new("default", NodeType::Project, "web")).unwrap();
    let protocol = GenerationProtocol::new(Arc::clone(&store), Arc::new(ScriptedProvider::stub()))
        .with_record_retention(3);

    for i in 0..5 {
        let generation =
            protocol.generate_validated(&compile_prompt(&format!("v{i}")), validators::compile_output).await.unwrap();
        protocol.save_record(&owner.id, &generation).unwrap();
    }

    let records = GenerationRecords::new(&store).list(&owner.id).unwrap();
    assert_eq!(records.len(), 3);
    assert!(records[0].prompt.contains("v4"));
    assert!(records[2].prompt.contains("v2"));
    assert_eq!(protocol.latest_record(&owner.id).unwrap().unwrap().id, records[0].id);
}
