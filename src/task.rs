//! Task handler trait and error types.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Named input values for one run, also handed to handlers as their context.
pub type Inputs = Map<String, Value>;

/// Results of earlier tasks, keyed by task name.
pub type PriorResults = BTreeMap<String, Value>;

/// Error returned by a task handler.
#[derive(Error, Debug)]
pub enum TaskError {
    /// Transient failure - worth retrying.
    #[error("{0:#}")]
    Retryable(#[source] anyhow::Error),

    /// Permanent failure - won't succeed on retry.
    #[error("{0:#}")]
    Permanent(#[source] anyhow::Error),
}

impl TaskError {
    /// Create a retryable error.
    pub fn retryable(err: impl Into<anyhow::Error>) -> Self {
        Self::Retryable(err.into())
    }

    /// Create a permanent error.
    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        Self::Permanent(err.into())
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self::Permanent(err)
    }
}

/// Descriptive metadata for listing handlers.
///
/// Carries no behavior; the runner never reads it.
#[derive(Default, Clone, Debug, PartialEq, Serialize)]
pub struct Metadata {
    /// Human-readable description.
    pub description: Option<String>,
    /// Arbitrary key-value tags for filtering.
    pub tags: HashMap<String, String>,
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the description.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }
}

/// A named unit of work that consumes inputs and prior results.
///
/// The name is persisted as the key of the task's stored result. Renaming a
/// handler orphans every result stored under the old name.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Stable name of this task. Must be a constant.
    fn name(&self) -> &'static str;

    /// Whether this task can run against the given inputs.
    ///
    /// Prior results are deliberately not visible here.
    fn supports(&self, inputs: &Inputs, context: &Inputs) -> bool;

    /// Execute the task.
    async fn run(
        &self,
        inputs: &Inputs,
        prior: &PriorResults,
        context: &Inputs,
    ) -> Result<Value, TaskError>;

    /// Descriptive metadata for listings.
    fn metadata(&self) -> Metadata {
        Metadata::default()
    }
}
