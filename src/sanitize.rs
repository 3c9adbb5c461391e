//! Policy applied to prior results before a handler sees them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::PriorResults;

/// Default cap on a single text value, in characters.
pub const DEFAULT_MAX_TEXT_LEN: usize = 8000;

/// Appended to every truncated text value.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Removes bulk fields and shortens long text in prior results.
///
/// Stripping applies to the top-level keys of each task's result.
/// Truncation applies to every string at any depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizePolicy {
    /// Top-level result keys removed from the downstream view.
    pub strip_fields: Vec<String>,
    /// Maximum characters kept from one string value.
    pub max_text_len: usize,
    pub truncation_marker: String,
}

impl Default for SanitizePolicy {
    fn default() -> Self {
        Self {
            strip_fields: vec![
                "raw_response".to_string(),
                "raw".to_string(),
                "blocks".to_string(),
            ],
            max_text_len: DEFAULT_MAX_TEXT_LEN,
            truncation_marker: TRUNCATION_MARKER.to_string(),
        }
    }
}

impl SanitizePolicy {
    /// A policy that passes prior results through unchanged.
    pub fn passthrough() -> Self {
        Self {
            strip_fields: Vec::new(),
            max_text_len: usize::MAX,
            truncation_marker: String::new(),
        }
    }

    /// Also strip `field` from every prior result.
    pub fn strip(mut self, field: &str) -> Self {
        self.strip_fields.push(field.to_string());
        self
    }

    /// Set the truncation length.
    pub fn max_text_len(mut self, len: usize) -> Self {
        self.max_text_len = len;
        self
    }

    /// Produce the sanitized view of `prior`. The input is left untouched.
    pub fn apply(&self, prior: &PriorResults) -> PriorResults {
        prior
            .iter()
            .map(|(name, result)| (name.clone(), self.sanitize_result(result)))
            .collect()
    }

    fn sanitize_result(&self, result: &Value) -> Value {
        match result {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(key, _)| !self.strip_fields.iter().any(|f| f == *key))
                    .map(|(key, value)| (key.clone(), self.truncate(value)))
                    .collect(),
            ),
            other => self.truncate(other),
        }
    }

    fn truncate(&self, value: &Value) -> Value {
        match value {
            Value::String(text) => match text.char_indices().nth(self.max_text_len) {
                Some((cut, _)) => {
                    let mut short = String::with_capacity(cut + self.truncation_marker.len());
                    short.push_str(&text[..cut]);
                    short.push_str(&self.truncation_marker);
                    Value::String(short)
                }
                None => value.clone(),
            },
            Value::Array(items) => Value::Array(items.iter().map(|v| self.truncate(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, v)| (key.clone(), self.truncate(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}
