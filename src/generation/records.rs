//! Per-node generation records.
//!
//! Each successful generation is recorded against the node it produced,
//! keyed by `(owner, model, prompt hash)`, and the owner's history is pruned to
//! the newest few right after every write.

use super::provider::ModelDescriptor;
use crate::graph::{GraphStore, now_string, parse_json_column, parse_time};
use crate::utils::{hash_json, hash_text};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use serde_json::Value;
use tracing::debug;

const RECORD_COLUMNS: &str = "seq, id, owner_node_id, model_id, temperature, prompt, prompt_hash, \
     output_text, output_text_hash, output_structured, output_structured_hash, created_at";

/// A generation recorded against its owning node.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRecord {
    pub id: String,
    pub owner_node_id: String,
    pub model_id: String,
    pub temperature: Option<f64>,
    pub prompt: String,
    pub prompt_hash: String,
    pub output_text: Option<String>,
    pub output_text_hash: Option<String>,
    pub output_structured: Option<Value>,
    pub output_structured_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub seq: i64,
}

/// Record access over the `generation_records` table.
pub struct GenerationRecords<'a> {
    store: &'a GraphStore,
}

impl<'a> GenerationRecords<'a> {
    #[must_use]
    pub const fn new(store: &'a GraphStore) -> Self {
        Self {
            store,
        }
    }

    /// Write a record, replacing one with the same owner, model and prompt.
    ///
    /// The written record becomes the owner's newest.
    pub fn save(
        &self,
        owner_node_id: &str,
        model: &ModelDescriptor,
        prompt: &str,
        output_text: Option<&str>,
        output_structured: Option<&Value>,
    ) -> Result<GenerationRecord> {
        let prompt_hash = hash_text(prompt);
        let text_hash = output_text.map(hash_text);
        let structured = output_structured.map(serde_json::to_string).transpose()?;
        let structured_hash = output_structured.map(hash_json);
        let id = uuid::Uuid::new_v4().to_string();

        self.store.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM generation_records \
                 WHERE owner_node_id = ?1 AND model_id = ?2 AND prompt_hash = ?3",
                params![owner_node_id, model.id, prompt_hash],
            )?;
            tx.execute(
                "INSERT INTO generation_records (id, owner_node_id, model_id, temperature, prompt, \
                 prompt_hash, output_text, output_text_hash, output_structured, output_structured_hash, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id,
                    owner_node_id,
                    model.id,
                    model.temperature,
                    prompt,
                    prompt_hash,
                    output_text,
                    text_hash,
                    structured,
                    structured_hash,
                    now_string(),
                ],
            )?;
            tx.commit()?;
            let record = query_records(
                conn,
                &format!("SELECT {RECORD_COLUMNS} FROM generation_records WHERE id = ?1"),
                &id,
            )?;
            record.into_iter().next().ok_or_else(|| anyhow::anyhow!("Generation record {id} vanished"))
        })
    }

    /// Keep only the `keep` newest records of `owner_node_id`. Returns how many were removed.
    pub fn prune(&self, owner_node_id: &str, keep: usize) -> Result<usize> {
        let removed = self.store.with_connection(|conn| {
            Ok(conn.execute(
                "DELETE FROM generation_records WHERE owner_node_id = ?1 AND seq NOT IN ( \
                     SELECT seq FROM generation_records WHERE owner_node_id = ?1 \
                     ORDER BY seq DESC LIMIT ?2)",
                params![owner_node_id, keep as i64],
            )?)
        })?;
        if removed > 0 {
            debug!(owner = %owner_node_id, removed, "Pruned generation records");
        }
        Ok(removed)
    }

    /// Save then prune to `keep`.
    pub fn save_and_prune(
        &self,
        owner_node_id: &str,
        model: &ModelDescriptor,
        prompt: &str,
        output_text: Option<&str>,
        output_structured: Option<&Value>,
        keep: usize,
    ) -> Result<GenerationRecord> {
        let record = self.save(owner_node_id, model, prompt, output_text, output_structured)?;
        self.prune(owner_node_id, keep)?;
        Ok(record)
    }

    /// Copy `record` to another owner, keeping its model, prompt and outputs.
    pub fn carry_forward(&self, record: &GenerationRecord, owner_node_id: &str, keep: usize) -> Result<GenerationRecord> {
        let model = ModelDescriptor {
            id: record.model_id.clone(),
            temperature: record.temperature,
        };
        self.save_and_prune(
            owner_node_id,
            &model,
            &record.prompt,
            record.output_text.as_deref(),
            record.output_structured.as_ref(),
            keep,
        )
    }

    /// Newest record of `owner_node_id`.
    pub fn latest(&self, owner_node_id: &str) -> Result<Option<GenerationRecord>> {
        Ok(self.list(owner_node_id)?.into_iter().next())
    }

    /// Records of `owner_node_id`, newest first.
    pub fn list(&self, owner_node_id: &str) -> Result<Vec<GenerationRecord>> {
        self.store.with_connection(|conn| {
            query_records(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM generation_records WHERE owner_node_id = ?1 ORDER BY seq DESC"
                ),
                owner_node_id,
            )
        })
    }
}

fn query_records(conn: &Connection, sql: &str, key: &str) -> Result<Vec<GenerationRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let records = stmt.query_map(params![key], row_to_record)?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<GenerationRecord> {
    let created_at: String = row.get(11)?;
    Ok(GenerationRecord {
        seq: row.get(0)?,
        id: row.get(1)?,
        owner_node_id: row.get(2)?,
        model_id: row.get(3)?,
        temperature: row.get(4)?,
        prompt: row.get(5)?,
        prompt_hash: row.get(6)?,
        output_text: row.get(7)?,
        output_text_hash: row.get(8)?,
        output_structured: parse_json_column(9, row.get(9)?)?,
        output_structured_hash: row.get(10)?,
        created_at: parse_time(11, &created_at)?,
    })
}
