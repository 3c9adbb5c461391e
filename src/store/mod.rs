//! Result storage trait, persisted layout and backends.

pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::task::{Inputs, PriorResults};

pub use file::FileResultStore;
pub use memory::MemoryResultStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteResultStore;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(String),
}

/// Persistence boundary for one pipeline run against one subject.
///
/// A second save under the same task name overwrites the first. Stores are
/// not synchronized across processes; [`is_locked`](Self::is_locked) is a
/// cooperative signal set by whoever coordinates workers.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// The primary input of the run, if any.
    fn subject(&self) -> Option<&str>;

    /// Fixed named inputs supplied before the run.
    fn inputs(&self) -> &Inputs;

    /// Stored result for one task.
    async fn prior(&self, name: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.all_prior().await?.remove(name))
    }

    /// Every stored result, keyed by task name.
    async fn all_prior(&self) -> Result<PriorResults, StoreError>;

    /// Store `result` under `name`. Durable once this returns.
    async fn save_result(&self, name: &str, result: Value) -> Result<(), StoreError>;

    /// Whether another worker is currently writing this subject's results.
    async fn is_locked(&self) -> Result<bool, StoreError> {
        Ok(false)
    }
}

/// Complete on-disk snapshot of one subject's results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub subject: Option<String>,
    #[serde(default)]
    pub results: PriorResults,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Content-addressed key for a subject: lowercase hex SHA-256.
pub fn subject_key(subject: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject.as_bytes());
    format!("{:x}", hasher.finalize())
}
