//! File-backed result store: one JSON snapshot per subject.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::{subject_key, ResultStore, Snapshot, StoreError};
use crate::task::{Inputs, PriorResults};

/// Store that keeps every subject's results in `<dir>/<sha256(subject)>.json`.
///
/// The same subject always maps to the same file, so a later process can
/// resume a partially completed run. Every save rewrites the complete
/// snapshot; there is no buffering.
///
/// The cooperative lock is a `<key>.lock` file next to the snapshot. A store
/// that took the lock through [`lock`](Self::lock) does not report it back to
/// itself, so the holder can keep running while other stores on the same
/// subject see it as locked.
#[derive(Debug)]
pub struct FileResultStore {
    dir: PathBuf,
    key: String,
    subject: String,
    inputs: Inputs,
    results: Mutex<PriorResults>,
    held: AtomicBool,
}

/// Per-process counter so concurrent writers never share a temp file.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

impl FileResultStore {
    /// Open the store for `subject`, loading any snapshot already on disk.
    ///
    /// A missing file yields an empty result set. The directory is created
    /// on first write.
    pub async fn open(
        dir: impl Into<PathBuf>,
        subject: impl Into<String>,
        inputs: Inputs,
    ) -> Result<Self, StoreError> {
        let dir = dir.into();
        let subject = subject.into();
        let key = subject_key(&subject);
        let path = snapshot_path(&dir, &key);

        let results = match fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                debug!(
                    path = %path.display(),
                    results = snapshot.results.len(),
                    "loaded result snapshot"
                );
                snapshot.results
            }
            Err(e) if e.kind() == ErrorKind::NotFound => PriorResults::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            dir,
            key,
            subject,
            inputs,
            results: Mutex::new(results),
            held: AtomicBool::new(false),
        })
    }

    /// Content-addressed key derived from the subject.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> PathBuf {
        snapshot_path(&self.dir, &self.key)
    }

    /// Path of the cooperative lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{}.lock", self.key))
    }

    /// Take the cooperative lock. Returns false if someone already holds it.
    pub async fn lock(&self) -> Result<bool, StoreError> {
        fs::create_dir_all(&self.dir).await?;
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.lock_path())
            .await
        {
            Ok(_) => {
                self.held.store(true, Ordering::SeqCst);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Release the cooperative lock. Releasing an absent lock is a no-op.
    pub async fn unlock(&self) -> Result<(), StoreError> {
        match fs::remove_file(self.lock_path()).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => {
                self.held.store(false, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    /// True while this store holds the lock it took with [`lock`](Self::lock).
    pub fn holds_lock(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    async fn flush(&self, results: &PriorResults) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            subject: Some(self.subject.clone()),
            results: results.clone(),
            updated_at: Some(Utc::now()),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        fs::create_dir_all(&self.dir).await?;
        let path = self.path();
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!("{}.json.{}-{seq}.tmp", self.key, std::process::id()));
        let written = match fs::write(&tmp, bytes).await {
            Ok(()) => fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), results = results.len(), "flushed result snapshot");
        Ok(())
    }
}

fn snapshot_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

#[async_trait]
impl ResultStore for FileResultStore {
    fn subject(&self) -> Option<&str> {
        Some(&self.subject)
    }

    fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    async fn prior(&self, name: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.results.lock().await.get(name).cloned())
    }

    async fn all_prior(&self) -> Result<PriorResults, StoreError> {
        Ok(self.results.lock().await.clone())
    }

    async fn save_result(&self, name: &str, result: Value) -> Result<(), StoreError> {
        // Held across the write so saves from this process never interleave.
        let mut results = self.results.lock().await;
        let mut next = results.clone();
        next.insert(name.to_string(), result);
        // Memory only changes once the snapshot is on disk.
        self.flush(&next).await?;
        *results = next;
        Ok(())
    }

    async fn is_locked(&self) -> Result<bool, StoreError> {
        if self.holds_lock() {
            return Ok(false);
        }
        Ok(fs::try_exists(self.lock_path()).await?)
    }
}
