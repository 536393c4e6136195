//! Input-keyed generation cache.
//!
//! Entries are keyed by `(model_id, cache_key)` where the key hashes the model
//! identifier and the exact serialized input. The cache knows nothing about
//! which node a generation ends up owned by.

use crate::graph::{GraphStore, now_string, parse_json_column, parse_time};
use crate::utils::hash_parts;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde_json::Value;

/// A cached generation.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub model_id: String,
    pub cache_key: String,
    pub input: String,
    pub output_text: Option<String>,
    pub output_messages: Option<Value>,
    pub output_structured: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Result of [`GenerationCache::try_get`].
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub cache_key: String,
    pub found: Option<CacheEntry>,
}

/// Cache over the `generation_cache` table.
pub struct GenerationCache<'a> {
    store: &'a GraphStore,
}

impl<'a> GenerationCache<'a> {
    #[must_use]
    pub const fn new(store: &'a GraphStore) -> Self {
        Self {
            store,
        }
    }

    /// Key for a model and serialized input.
    #[must_use]
    pub fn cache_key(model_id: &str, input: &str) -> String {
        hash_parts(&[model_id, input])
    }

    pub fn try_get(&self, model_id: &str, input: &str) -> Result<CacheLookup> {
        let cache_key = Self::cache_key(model_id, input);
        let found = self.get(model_id, &cache_key)?;
        Ok(CacheLookup {
            cache_key,
            found,
        })
    }

    /// Entry stored under an already computed key.
    pub fn get(&self, model_id: &str, cache_key: &str) -> Result<Option<CacheEntry>> {
        self.store.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT model_id, cache_key, input, output_text, output_messages, \
                     output_structured, created_at FROM generation_cache \
                     WHERE model_id = ?1 AND cache_key = ?2",
                    params![model_id, cache_key],
                    |row| {
                        let created_at: String = row.get(6)?;
                        Ok(CacheEntry {
                            model_id: row.get(0)?,
                            cache_key: row.get(1)?,
                            input: row.get(2)?,
                            output_text: row.get(3)?,
                            output_messages: parse_json_column(4, row.get(4)?)?,
                            output_structured: parse_json_column(5, row.get(5)?)?,
                            created_at: parse_time(6, &created_at)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    /// Store (or replace) the entry under `cache_key`.
    pub fn save(
        &self,
        model_id: &str,
        cache_key: &str,
        input: &str,
        output_text: Option<&str>,
        output_messages: Option<&Value>,
        output_structured: Option<&Value>,
    ) -> Result<()> {
        let messages = output_messages.map(serde_json::to_string).transpose()?;
        let structured = output_structured.map(serde_json::to_string).transpose()?;
        self.store.with_connection(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO generation_cache \
                 (model_id, cache_key, input, output_text, output_messages, output_structured, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![model_id, cache_key, input, output_text, messages, structured, now_string()],
            )?;
            Ok(())
        })
    }

    /// Evict an entry, returning whether one existed.
    pub fn delete_by_key(&self, model_id: &str, cache_key: &str) -> Result<bool> {
        self.store.with_connection(|conn| {
            let removed = conn.execute(
                "DELETE FROM generation_cache WHERE model_id = ?1 AND cache_key = ?2",
                params![model_id, cache_key],
            )?;
            Ok(removed > 0)
        })
    }
}
