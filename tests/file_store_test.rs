//! Tests for FileResultStore.

use async_trait::async_trait;
use serde_json::{json, Value};
use tasklane::store::subject_key;
use tasklane::{
    FileResultStore, Inputs, PriorResults, ResultStore, Runner, Snapshot, TaskError, TaskHandler,
    TaskQueue, TaskRegistry, TaskStatus,
};
use tempfile::TempDir;

const SUBJECT: &str = "https://example.com/receipt.jpg";

struct Ocr;

#[async_trait]
impl TaskHandler for Ocr {
    fn name(&self) -> &'static str {
        "ocr"
    }

    fn supports(&self, inputs: &Inputs, _context: &Inputs) -> bool {
        inputs.contains_key("subject")
    }

    async fn run(
        &self,
        _inputs: &Inputs,
        _prior: &PriorResults,
        _context: &Inputs,
    ) -> Result<Value, TaskError> {
        Ok(json!({"text": "TOTAL 12.50"}))
    }
}

struct Extract;

#[async_trait]
impl TaskHandler for Extract {
    fn name(&self) -> &'static str {
        "extract"
    }

    fn supports(&self, _inputs: &Inputs, _context: &Inputs) -> bool {
        true
    }

    async fn run(
        &self,
        _inputs: &Inputs,
        prior: &PriorResults,
        _context: &Inputs,
    ) -> Result<Value, TaskError> {
        let text = prior
            .get("ocr")
            .and_then(|r| r["text"].as_str())
            .ok_or_else(|| TaskError::permanent(anyhow::anyhow!("ocr result missing")))?;
        Ok(json!({"total": text.trim_start_matches("TOTAL ")}))
    }
}

async fn open(dir: &TempDir) -> FileResultStore {
    FileResultStore::open(dir.path(), SUBJECT, Inputs::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_missing_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;

    assert!(store.all_prior().await.unwrap().is_empty());
    assert_eq!(store.subject(), Some(SUBJECT));
    assert!(!store.path().exists());
}

#[tokio::test]
async fn test_results_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir).await;
        store.save_result("ocr", json!({"text": "hello"})).await.unwrap();
        store
            .save_result("classify", json!({"label": "receipt", "score": 0.93}))
            .await
            .unwrap();
    }

    let reopened = open(&dir).await;
    let results = reopened.all_prior().await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results["ocr"], json!({"text": "hello"}));
    assert_eq!(results["classify"], json!({"label": "receipt", "score": 0.93}));
}

#[tokio::test]
async fn test_file_is_named_by_subject_hash() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    store.save_result("ocr", json!({"text": "hi"})).await.unwrap();

    let expected = dir.path().join(format!("{}.json", subject_key(SUBJECT)));
    assert_eq!(store.path(), expected);
    assert!(expected.exists());
    assert_eq!(store.key(), subject_key(SUBJECT));
}

#[tokio::test]
async fn test_every_save_writes_full_snapshot() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    store.save_result("ocr", json!({"text": "one"})).await.unwrap();
    store.save_result("classify", json!({"label": "x"})).await.unwrap();
    store.save_result("ocr", json!({"text": "two"})).await.unwrap();

    let bytes = std::fs::read(store.path()).unwrap();
    let snapshot: Snapshot = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(snapshot.subject.as_deref(), Some(SUBJECT));
    assert_eq!(snapshot.results.len(), 2);
    assert_eq!(snapshot.results["ocr"], json!({"text": "two"}));
    assert!(snapshot.updated_at.is_some());
}

#[tokio::test]
async fn test_directory_created_on_first_write() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("runs").join("2024");
    let store = FileResultStore::open(&nested, SUBJECT, Inputs::new())
        .await
        .unwrap();
    assert!(!nested.exists());

    store.save_result("ocr", json!({})).await.unwrap();
    assert!(store.path().exists());
}

#[tokio::test]
async fn test_lock_file_signals_locked_to_other_stores() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let other = open(&dir).await;
    assert!(!store.is_locked().await.unwrap());

    assert!(store.lock().await.unwrap());
    assert!(store.lock_path().exists());
    assert!(!other.lock().await.unwrap());
    assert!(!store.is_locked().await.unwrap());
    assert!(other.is_locked().await.unwrap());

    store.unlock().await.unwrap();
    assert!(!other.is_locked().await.unwrap());
    store.unlock().await.unwrap();
}

#[tokio::test]
async fn test_lock_holder_runs_while_others_wait() {
    let dir = TempDir::new().unwrap();
    let runner = Runner::builder(TaskRegistry::builder().register(Ocr).build()).build();
    let holder = open(&dir).await;
    let waiter = open(&dir).await;
    assert!(holder.lock().await.unwrap());

    let mut blocked = TaskQueue::new(["ocr"]);
    assert!(runner.run_next(&waiter, &mut blocked).await.unwrap().is_none());
    assert_eq!(blocked.len(), 1);

    let mut queue = TaskQueue::new(["ocr"]);
    let outcome = runner.run_next(&holder, &mut queue).await.unwrap().unwrap();
    assert_eq!(outcome.status, TaskStatus::Done);
    assert!(queue.is_empty());

    holder.unlock().await.unwrap();
    let outcome = runner.run_next(&waiter, &mut blocked).await.unwrap().unwrap();
    assert_eq!(outcome.name, "ocr");
}

#[tokio::test]
async fn test_failed_write_leaves_results_unchanged() {
    let dir = TempDir::new().unwrap();
    let results_dir = dir.path().join("results");
    let store = FileResultStore::open(&results_dir, SUBJECT, Inputs::new())
        .await
        .unwrap();
    store.save_result("classify", json!({"label": "x"})).await.unwrap();

    // A plain file where the results directory should be makes every write fail.
    std::fs::remove_dir_all(&results_dir).unwrap();
    std::fs::write(&results_dir, b"not a directory").unwrap();

    assert!(store.save_result("ocr", json!({"t": 1})).await.is_err());

    let results = store.all_prior().await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(!results.contains_key("ocr"));
    assert_eq!(store.prior("ocr").await.unwrap(), None);
    let queue = TaskQueue::pending_against(["ocr", "classify"], &results);
    assert_eq!(queue.remaining(), ["ocr".to_string()]);
}

#[tokio::test]
async fn test_saves_leave_no_temp_files() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    store.save_result("ocr", json!({"text": "one"})).await.unwrap();
    store.save_result("ocr", json!({"text": "two"})).await.unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_interrupted_run_resumes_from_disk() {
    let dir = TempDir::new().unwrap();
    let registry = TaskRegistry::builder().register(Ocr).register(Extract).build();
    let runner = Runner::builder(registry).build();
    let names = ["ocr", "extract"];

    {
        let store = open(&dir).await;
        let mut queue = TaskQueue::new(names);
        let first = runner.run_next(&store, &mut queue).await.unwrap().unwrap();
        assert_eq!(first.name, "ocr");
        assert_eq!(first.status, TaskStatus::Done);
    }

    let store = open(&dir).await;
    let mut queue = TaskQueue::pending_against(names, &store.all_prior().await.unwrap());
    assert_eq!(queue.remaining(), ["extract".to_string()]);

    let outcomes = runner.run_all(&store, &mut queue).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].result, json!({"total": "12.50"}));

    let reopened = open(&dir).await;
    assert_eq!(reopened.all_prior().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_corrupt_snapshot_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(format!("{}.json", subject_key(SUBJECT)));
    std::fs::write(&path, b"{not json").unwrap();

    let err = FileResultStore::open(dir.path(), SUBJECT, Inputs::new())
        .await
        .unwrap_err();
    assert!(matches!(err, tasklane::StoreError::Serialization(_)));
}
