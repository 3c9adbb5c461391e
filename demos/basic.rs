//! Basic usage example for tasklane.
//!
//! This example demonstrates:
//! - Implementing the TaskHandler trait
//! - Registering handlers eagerly and lazily
//! - Persisting results to a file store and resuming
//! - Reporting progress through runner hooks
//!
//! Run it twice: the second run finds every result on disk and does nothing.

use async_trait::async_trait;
use serde_json::{json, Value};
use tasklane::{
    FileResultStore, Inputs, Metadata, PriorResults, ResultStore, RetryPolicy, Runner,
    TaskError, TaskHandler, TaskQueue, TaskRegistry,
};

/// Counts the words in the subject text.
struct WordCount;

#[async_trait]
impl TaskHandler for WordCount {
    fn name(&self) -> &'static str {
        "word_count"
    }

    fn supports(&self, inputs: &Inputs, _context: &Inputs) -> bool {
        inputs.get("subject").is_some_and(Value::is_string)
    }

    async fn run(
        &self,
        inputs: &Inputs,
        _prior: &PriorResults,
        _context: &Inputs,
    ) -> Result<Value, TaskError> {
        let text = inputs["subject"].as_str().unwrap_or_default();
        Ok(json!({ "words": text.split_whitespace().count() }))
    }

    fn metadata(&self) -> Metadata {
        Metadata::new().with_description("count words in the subject")
    }
}

/// Shouts the subject, using the word count computed earlier.
struct Shout {
    suffix: String,
}

#[async_trait]
impl TaskHandler for Shout {
    fn name(&self) -> &'static str {
        "shout"
    }

    fn supports(&self, _inputs: &Inputs, _context: &Inputs) -> bool {
        true
    }

    async fn run(
        &self,
        inputs: &Inputs,
        prior: &PriorResults,
        context: &Inputs,
    ) -> Result<Value, TaskError> {
        let words = prior
            .get("word_count")
            .and_then(|r| r["words"].as_u64())
            .ok_or_else(|| TaskError::permanent(anyhow::anyhow!("word_count has not run")))?;
        let text = inputs["subject"].as_str().unwrap_or_default().to_uppercase();
        let suffix = context
            .get("suffix")
            .and_then(Value::as_str)
            .unwrap_or(self.suffix.as_str());
        Ok(json!({ "text": format!("{text}{suffix}"), "words": words }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tasklane=info".into()),
        )
        .init();

    let registry = TaskRegistry::builder()
        .register(WordCount)
        .register_lazy("shout", || Shout {
            suffix: "!".to_string(),
        })
        .build();

    for (name, meta) in registry.describe() {
        println!("{name}: {}", meta.description.unwrap_or_default());
    }

    let runner = Runner::builder(registry)
        .retry(RetryPolicy::exponential(2))
        .on_before_task(|name, _inputs, prior| {
            println!("-> {name} ({} prior results)", prior.len());
        })
        .on_after_task(|name, result, status| {
            println!("<- {name} [{status}] {result}");
        })
        .build();

    let dir = std::env::temp_dir().join("tasklane-demo");
    let mut inputs = Inputs::new();
    inputs.insert("suffix".to_string(), json!("!!!"));
    let store = FileResultStore::open(&dir, "hello pipeline world", inputs).await?;

    let names = ["word_count", "shout", "not_registered"];
    let unknown = runner.registry().unknown(names);
    if !unknown.is_empty() {
        println!("warning: no handler for {unknown:?}");
    }

    let mut queue = TaskQueue::pending_against(names, &store.all_prior().await?);
    if queue.is_empty() {
        println!("nothing to do, results in {}", store.path().display());
        return Ok(());
    }

    let started = std::time::Instant::now();
    let outcomes = runner.run_all(&store, &mut queue).await?;
    println!(
        "ran {} tasks in {:?}, results in {}",
        outcomes.len(),
        started.elapsed(),
        store.path().display()
    );

    Ok(())
}
