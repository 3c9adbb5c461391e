//! Tests for SqliteResultStore.

use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tasklane::{Inputs, ResultStore, SqliteResultStore};

async fn setup_pool() -> SqlitePool {
    // One connection: every new connection to :memory: is a fresh database.
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

async fn setup_store(pool: &SqlitePool, subject: &str) -> SqliteResultStore {
    let store = SqliteResultStore::new(pool.clone(), subject, Inputs::new());
    store.run_migrations().await.unwrap();
    store
}

#[tokio::test]
async fn test_save_and_read_back() {
    let pool = setup_pool().await;
    let store = setup_store(&pool, "hello world").await;

    store.save_result("translate", json!({"text": "bonjour"})).await.unwrap();

    assert_eq!(
        store.prior("translate").await.unwrap(),
        Some(json!({"text": "bonjour"}))
    );
    assert_eq!(store.prior("ocr").await.unwrap(), None);
    assert_eq!(store.subject(), Some("hello world"));
}

#[tokio::test]
async fn test_second_save_overwrites() {
    let pool = setup_pool().await;
    let store = setup_store(&pool, "hello world").await;

    store.save_result("translate", json!({"text": "hola"})).await.unwrap();
    store.save_result("translate", json!({"text": "bonjour"})).await.unwrap();

    let all = store.all_prior().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all["translate"], json!({"text": "bonjour"}));
}

#[tokio::test]
async fn test_subjects_are_isolated() {
    let pool = setup_pool().await;
    let first = setup_store(&pool, "first").await;
    let second = setup_store(&pool, "second").await;

    first.save_result("ocr", json!({"text": "1"})).await.unwrap();
    second.save_result("ocr", json!({"text": "2"})).await.unwrap();

    assert_eq!(first.all_prior().await.unwrap()["ocr"], json!({"text": "1"}));
    assert_eq!(second.all_prior().await.unwrap()["ocr"], json!({"text": "2"}));

    let reopened = setup_store(&pool, "first").await;
    assert_eq!(reopened.all_prior().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_lock_is_per_subject() {
    let pool = setup_pool().await;
    let first = setup_store(&pool, "first").await;
    let second = setup_store(&pool, "second").await;

    let first_again = setup_store(&pool, "first").await;

    assert!(first.lock().await.unwrap());
    assert!(!first_again.lock().await.unwrap());
    assert!(first_again.is_locked().await.unwrap());
    assert!(!second.is_locked().await.unwrap());

    first.unlock().await.unwrap();
    assert!(!first_again.is_locked().await.unwrap());
}

#[tokio::test]
async fn test_lock_holder_is_not_blocked() {
    let pool = setup_pool().await;
    let holder = setup_store(&pool, "first").await;

    assert!(holder.lock().await.unwrap());
    assert!(holder.holds_lock());
    assert!(!holder.is_locked().await.unwrap());

    holder.unlock().await.unwrap();
    assert!(!holder.holds_lock());
}
