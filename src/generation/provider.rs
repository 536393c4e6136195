//! Generation provider interface.

use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies the model a provider generates with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Model identifier, part of every cache key and generation record.
    pub id: String,
    /// Optional sampling temperature, recorded alongside generations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            temperature: None,
        }
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl Default for ModelDescriptor {
    fn default() -> Self {
        Self::new("default")
    }
}

/// One reply from a provider in structured-output mode.
///
/// Providers report "no structured output" by leaving `structured` empty
/// rather than failing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOutput {
    pub structured: Option<Value>,
    pub raw_text: String,
}

/// A source of generated output.
///
/// Implementations must be usable behind `Arc<dyn GenerationProvider>`.
pub trait GenerationProvider: Send + Sync {
    fn model(&self) -> &ModelDescriptor;

    /// Generate a reply for `prompt` in structured-output mode.
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<GenerationOutput>>;
}

/// Parse the first JSON object embedded in `text`.
///
/// Accepts a bare object, an object inside a fenced code block, or an object
/// surrounded by prose. Returns `None` when no object parses.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    for (start, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        if let Some(Ok(value @ Value::Object(_))) = stream.next() {
            return Some(value);
        }
    }
    None
}
