//! In-memory result store.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{ResultStore, StoreError};
use crate::task::{Inputs, PriorResults};

/// Process-local store with no persistence.
///
/// Useful for tests, one-shot invocations, or callers that persist results
/// themselves after the run.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    subject: Option<String>,
    inputs: Inputs,
    results: RwLock<PriorResults>,
    locked: AtomicBool,
}

impl MemoryResultStore {
    /// Create an empty store with no subject.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the subject.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Replace the input bag.
    pub fn with_inputs(mut self, inputs: Inputs) -> Self {
        self.inputs = inputs;
        self
    }

    /// Add one named input.
    pub fn with_input(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.to_string(), value.into());
        self
    }

    /// Seed results, as if recorded by an earlier session.
    pub fn with_results(self, results: PriorResults) -> Self {
        Self {
            results: RwLock::new(results),
            ..self
        }
    }

    /// Raise or clear the cooperative lock.
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    async fn prior(&self, name: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.results.read().await.get(name).cloned())
    }

    async fn all_prior(&self) -> Result<PriorResults, StoreError> {
        Ok(self.results.read().await.clone())
    }

    async fn save_result(&self, name: &str, result: Value) -> Result<(), StoreError> {
        self.results.write().await.insert(name.to_string(), result);
        Ok(())
    }

    async fn is_locked(&self) -> Result<bool, StoreError> {
        Ok(self.locked.load(Ordering::SeqCst))
    }
}
