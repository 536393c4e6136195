//! The validate/retry/cache wrapper around every generation.
//!
//! 1. A cache hit for `(model, prompt)` is returned as-is; it was validated
//!    when it was written.
//! 2. Otherwise the provider is asked up to `max_attempts` times. A reply with
//!    no structured payload, a provider error, or a payload the call site's
//!    validator rejects counts as a failed attempt and evicts anything cached
//!    under the key before the next attempt.
//! 3. The first valid payload is cached and returned. Running out of attempts
//!    is [`IntentError::GenerationExhausted`].

use super::cache::GenerationCache;
use super::prompt::Prompt;
use super::provider::{GenerationProvider, ModelDescriptor};
use super::records::{GenerationRecord, GenerationRecords};
use super::validators::Validation;
use crate::constants::{GENERATION_RECORD_RETENTION, MAX_GENERATION_ATTEMPTS};
use crate::core::IntentError;
use crate::graph::GraphStore;
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A payload that passed (or was cached after passing) validation.
#[derive(Debug, Clone)]
pub struct ValidatedGeneration {
    pub call_site: String,
    pub cache_key: String,
    pub model: ModelDescriptor,
    /// The prompt without volatile sections, as recorded per node.
    pub stable_prompt: String,
    pub structured: Value,
    pub raw_text: String,
    pub from_cache: bool,
    /// Provider calls made; zero for cache hits.
    pub attempts: usize,
}

/// Validated, cached generation over one provider.
#[derive(Clone)]
pub struct GenerationProtocol {
    store: Arc<GraphStore>,
    provider: Arc<dyn GenerationProvider>,
    max_attempts: usize,
    record_retention: usize,
}

impl GenerationProtocol {
    pub fn new(store: Arc<GraphStore>, provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            store,
            provider,
            max_attempts: MAX_GENERATION_ATTEMPTS,
            record_retention: GENERATION_RECORD_RETENTION,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_record_retention(mut self, keep: usize) -> Self {
        self.record_retention = keep.max(1);
        self
    }

    #[must_use]
    pub fn model(&self) -> &ModelDescriptor {
        self.provider.model()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Generate a payload for `prompt` that passes `validator`.
    pub async fn generate_validated<F>(&self, prompt: &Prompt, validator: F) -> Result<ValidatedGeneration>
    where
        F: Fn(&Value) -> Validation,
    {
        let call_site = prompt.call_site().as_str();
        let model = self.provider.model().clone();
        let input = prompt.full();
        let cache = GenerationCache::new(&self.store);

        let lookup = cache.try_get(&model.id, &input)?;
        if let Some(entry) = lookup.found {
            if let Some(structured) = entry.output_structured {
                debug!(call_site, cache_key = %lookup.cache_key, "Generation cache hit");
                return Ok(ValidatedGeneration {
                    call_site: call_site.to_string(),
                    cache_key: lookup.cache_key,
                    model,
                    stable_prompt: prompt.stable().to_string(),
                    structured,
                    raw_text: entry.output_text.unwrap_or_default(),
                    from_cache: true,
                    attempts: 0,
                });
            }
        }

        let cache_key = lookup.cache_key;
        let mut last_reason = String::from("no attempt was made");

        for attempt in 1..=self.max_attempts {
            debug!(call_site, attempt, cache_key = %cache_key, "Requesting generation");

            let verdict = match self.provider.generate(&input).await {
                Err(e) => Err(format!("provider failed: {e:#}")),
                Ok(output) => match output.structured {
                    None => Err("reply contained no structured payload".to_string()),
                    Some(structured) => validator(&structured).map(|()| (structured, output.raw_text)),
                },
            };

            match verdict {
                Ok((structured, raw_text)) => {
                    cache.save(&model.id, &cache_key, &input, Some(&raw_text), None, Some(&structured))?;
                    info!(call_site, attempt, "Generation accepted");
                    return Ok(ValidatedGeneration {
                        call_site: call_site.to_string(),
                        cache_key,
                        model,
                        stable_prompt: prompt.stable().to_string(),
                        structured,
                        raw_text,
                        from_cache: false,
                        attempts: attempt,
                    });
                }
                Err(reason) => {
                    warn!(call_site, attempt, reason = %reason, "Generation rejected");
                    if cache.delete_by_key(&model.id, &cache_key)? {
                        debug!(call_site, cache_key = %cache_key, "Evicted cache entry after rejection");
                    }
                    last_reason = reason;
                }
            }
        }

        Err(IntentError::GenerationExhausted {
            call_site: call_site.to_string(),
            attempts: self.max_attempts,
            last_reason,
        }
        .into())
    }

    /// Record `generation` against its owner node and prune the owner's history.
    pub fn save_record(&self, owner_node_id: &str, generation: &ValidatedGeneration) -> Result<GenerationRecord> {
        GenerationRecords::new(&self.store).save_and_prune(
            owner_node_id,
            &generation.model,
            &generation.stable_prompt,
            Some(&generation.raw_text),
            Some(&generation.structured),
            self.record_retention,
        )
    }

    /// Copy an earlier record to `owner_node_id` without generating.
    pub fn carry_record(&self, record: &GenerationRecord, owner_node_id: &str) -> Result<GenerationRecord> {
        GenerationRecords::new(&self.store).carry_forward(record, owner_node_id, self.record_retention)
    }

    /// Newest record of `owner_node_id`.
    pub fn latest_record(&self, owner_node_id: &str) -> Result<Option<GenerationRecord>> {
        GenerationRecords::new(&self.store).latest(owner_node_id)
    }
}
