//! Content hashing for graph payloads and generation inputs.
//!
//! Every hash is SHA-256 rendered as `sha256:<lowercase hex>`, the same format
//! used for file checksums. Structured payloads are hashed over a canonical
//! JSON rendering (object keys sorted recursively) so that two equal values
//! always hash identically regardless of insertion order.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Hash raw bytes.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Hash a text payload.
#[must_use]
pub fn hash_text(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

/// Hash a structured payload over its canonical JSON rendering.
#[must_use]
pub fn hash_json(value: &Value) -> String {
    hash_text(&canonical_json(value))
}

/// Hash several parts with an unambiguous separator between them.
#[must_use]
pub fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Render a value as compact JSON with object keys sorted at every level.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
