//! SQLite implementation of ResultStore.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;

use super::{subject_key, ResultStore, StoreError};
use crate::task::{Inputs, PriorResults};

/// SQLite-backed result store for one subject.
///
/// Many subjects share the same tables; rows are keyed by the subject's
/// content hash. Locks live in their own table so any worker holding the
/// pool can coordinate through [`lock`](Self::lock) and [`unlock`](Self::unlock).
/// The store holding the lock is never blocked by it.
pub struct SqliteResultStore {
    pool: SqlitePool,
    key: String,
    subject: String,
    inputs: Inputs,
    held: AtomicBool,
}

impl SqliteResultStore {
    /// Create a store for `subject` on the given pool.
    pub fn new(pool: SqlitePool, subject: impl Into<String>, inputs: Inputs) -> Self {
        let subject = subject.into();
        Self {
            pool,
            key: subject_key(&subject),
            subject,
            inputs,
            held: AtomicBool::new(false),
        }
    }

    /// Run migrations to create the result and lock tables.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_results (
                subject_key TEXT NOT NULL,
                task_name TEXT NOT NULL,
                subject TEXT NOT NULL,
                result TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (subject_key, task_name)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subject_locks (
                subject_key TEXT PRIMARY KEY,
                locked_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    /// Take the cooperative lock. Returns false if it is already held.
    pub async fn lock(&self) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO subject_locks (subject_key)
            VALUES (?)
            ON CONFLICT (subject_key) DO NOTHING
            "#,
        )
        .bind(self.key.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        let acquired = result.rows_affected() == 1;
        if acquired {
            self.held.store(true, Ordering::SeqCst);
        }
        Ok(acquired)
    }

    /// Release the cooperative lock.
    pub async fn unlock(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM subject_locks WHERE subject_key = ?")
            .bind(self.key.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        self.held.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// True while this store holds the lock it took with [`lock`](Self::lock).
    pub fn holds_lock(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    fn subject(&self) -> Option<&str> {
        Some(&self.subject)
    }

    fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    async fn prior(&self, name: &str) -> Result<Option<Value>, StoreError> {
        let row: Option<String> = sqlx::query_scalar(
            "SELECT result FROM task_results WHERE subject_key = ? AND task_name = ?",
        )
        .bind(self.key.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(|text| serde_json::from_str(&text))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn all_prior(&self) -> Result<PriorResults, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT task_name, result FROM task_results WHERE subject_key = ?",
        )
        .bind(self.key.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|(name, text)| -> Result<(String, Value), StoreError> {
                Ok((name, serde_json::from_str(&text)?))
            })
            .collect()
    }

    async fn save_result(&self, name: &str, result: Value) -> Result<(), StoreError> {
        let text = serde_json::to_string(&result)?;

        sqlx::query(
            r#"
            INSERT INTO task_results (subject_key, task_name, subject, result)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (subject_key, task_name)
            DO UPDATE SET result = excluded.result, updated_at = datetime('now')
            "#,
        )
        .bind(self.key.as_str())
        .bind(name)
        .bind(self.subject.as_str())
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn is_locked(&self) -> Result<bool, StoreError> {
        if self.holds_lock() {
            return Ok(false);
        }
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM subject_locks WHERE subject_key = ?")
                .bind(self.key.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;

        Ok(count > 0)
    }
}
