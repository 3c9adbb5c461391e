//! Runner that drives a task queue against a result store.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::observer::{AfterTaskFn, BeforeTaskFn, TaskObserver};
use crate::queue::TaskQueue;
use crate::registry::TaskRegistry;
use crate::result::{self, TaskOutcome, TaskStatus, NOT_SUPPORTED_REASON, NO_HANDLER_REASON};
use crate::retry::RetryPolicy;
use crate::sanitize::SanitizePolicy;
use crate::store::{ResultStore, StoreError};
use crate::task::{Inputs, PriorResults, TaskError, TaskHandler};

/// Default key under which the subject is injected into a task's inputs.
pub const DEFAULT_PRIMARY_INPUT_KEY: &str = "subject";

/// Error returned by the runner.
///
/// Task outcomes are data, never errors: only storage failures surface here.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("result store failed: {0}")]
    Store(#[from] StoreError),
}

/// Executes queued tasks one at a time and persists every outcome.
///
/// The runner holds no per-run state. The same runner can drive any number
/// of stores, one call at a time per store.
pub struct Runner {
    registry: Arc<TaskRegistry>,
    sanitize: SanitizePolicy,
    retry: RetryPolicy,
    primary_input_key: &'static str,
    stop_on_failure: bool,
    observers: Vec<Arc<dyn TaskObserver>>,
}

impl Runner {
    /// Start building a runner over `registry`.
    pub fn builder(registry: impl Into<Arc<TaskRegistry>>) -> RunnerBuilder {
        RunnerBuilder::new(registry)
    }

    /// The registry this runner resolves task names against.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Run the next task in `queue`.
    ///
    /// Returns `None` without touching the queue or the store when the store
    /// is locked, and `None` when the queue is empty. Otherwise the task is
    /// consumed, its result persisted, and its outcome returned.
    ///
    /// A handler that panics is recorded as a permanent failure like any
    /// other error. Panics in observers are not caught.
    pub async fn run_next<S>(
        &self,
        store: &S,
        queue: &mut TaskQueue,
    ) -> Result<Option<TaskOutcome>, RunnerError>
    where
        S: ResultStore + ?Sized,
    {
        if store.is_locked().await? {
            debug!(subject = ?store.subject(), "store locked, not advancing queue");
            return Ok(None);
        }
        let Some(name) = queue.pop() else {
            return Ok(None);
        };

        let started = Instant::now();
        let context = store.inputs();
        let inputs = self.assemble_inputs(store);
        let prior = self.sanitize.apply(&store.all_prior().await?);

        let (status, result) = match self.registry.get(&name) {
            None => {
                warn!(task = %name, "no handler registered");
                (TaskStatus::NoHandler, result::skipped(NO_HANDLER_REASON))
            }
            Some(handler) if !handler.supports(&inputs, context) => {
                debug!(task = %name, "inputs not supported, skipping");
                (TaskStatus::Skipped, result::skipped(NOT_SUPPORTED_REASON))
            }
            Some(handler) => {
                for observer in &self.observers {
                    observer.before_task(&name, &inputs, &prior).await;
                }
                self.execute(handler.as_ref(), &name, &inputs, &prior, context)
                    .await
            }
        };

        store.save_result(&name, result.clone()).await?;

        for observer in &self.observers {
            observer.after_task(&name, &result, status).await;
        }

        let elapsed = started.elapsed();
        info!(
            task = %name,
            status = %status,
            elapsed_ms = elapsed.as_millis() as u64,
            "task finished"
        );

        Ok(Some(TaskOutcome {
            name,
            status,
            result,
            elapsed,
        }))
    }

    /// Drain `queue`, one task at a time.
    ///
    /// Stops early when the store becomes locked, and after the first failure
    /// if the runner was built with `stop_on_failure`. Results already saved
    /// stay saved when this returns an error.
    pub async fn run_all<S>(
        &self,
        store: &S,
        queue: &mut TaskQueue,
    ) -> Result<Vec<TaskOutcome>, RunnerError>
    where
        S: ResultStore + ?Sized,
    {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.run_next(store, queue).await? {
            let stop = self.stop_on_failure && outcome.status == TaskStatus::Failed;
            outcomes.push(outcome);
            if stop {
                debug!(remaining = queue.len(), "stopping after failed task");
                break;
            }
        }
        Ok(outcomes)
    }

    /// The store's input bag plus the subject under the primary input key,
    /// unless the bag already supplies that key.
    fn assemble_inputs<S: ResultStore + ?Sized>(&self, store: &S) -> Inputs {
        let mut inputs = store.inputs().clone();
        if let Some(subject) = store.subject() {
            inputs
                .entry(self.primary_input_key)
                .or_insert_with(|| Value::String(subject.to_string()));
        }
        inputs
    }

    async fn execute(
        &self,
        handler: &dyn TaskHandler,
        name: &str,
        inputs: &Inputs,
        prior: &PriorResults,
        context: &Inputs,
    ) -> (TaskStatus, Value) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let run = AssertUnwindSafe(handler.run(inputs, prior, context));
            let err = match run.catch_unwind().await {
                Ok(Ok(value)) => return (TaskStatus::Done, value),
                Ok(Err(err)) => err,
                Err(panic) => TaskError::permanent(anyhow::anyhow!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };

            if let Some(delay) = self.retry.next_delay(attempt, &err) {
                warn!(
                    task = name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "task failed, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            warn!(task = name, attempt, error = %err, "task failed");
            let mut result = result::failed(&err.to_string());
            if attempt > 1 {
                result["attempts"] = json!(attempt);
            }
            return (TaskStatus::Failed, result);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Builder for constructing a [`Runner`].
pub struct RunnerBuilder {
    registry: Arc<TaskRegistry>,
    sanitize: SanitizePolicy,
    retry: RetryPolicy,
    primary_input_key: &'static str,
    stop_on_failure: bool,
    observers: Vec<Arc<dyn TaskObserver>>,
}

impl RunnerBuilder {
    /// Create a new builder over the given registry.
    pub fn new(registry: impl Into<Arc<TaskRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            sanitize: SanitizePolicy::default(),
            retry: RetryPolicy::None,
            primary_input_key: DEFAULT_PRIMARY_INPUT_KEY,
            stop_on_failure: false,
            observers: Vec::new(),
        }
    }

    /// Set the policy applied to prior results.
    pub fn sanitize(mut self, policy: SanitizePolicy) -> Self {
        self.sanitize = policy;
        self
    }

    /// Set the retry policy for retryable handler failures.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Set the key the subject is injected under.
    pub fn primary_input_key(mut self, key: &'static str) -> Self {
        self.primary_input_key = key;
        self
    }

    /// Make `run_all` stop after the first failed task.
    pub fn stop_on_failure(mut self, stop: bool) -> Self {
        self.stop_on_failure = stop;
        self
    }

    /// Register an observer.
    pub fn observer(mut self, observer: impl TaskObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Call `hook` with (name, inputs, sanitized prior results) before a task runs.
    pub fn on_before_task<F>(self, hook: F) -> Self
    where
        F: Fn(&str, &Inputs, &PriorResults) + Send + Sync + 'static,
    {
        self.observer(BeforeTaskFn(hook))
    }

    /// Call `hook` with (name, result, status) after every task.
    pub fn on_after_task<F>(self, hook: F) -> Self
    where
        F: Fn(&str, &Value, TaskStatus) + Send + Sync + 'static,
    {
        self.observer(AfterTaskFn(hook))
    }

    /// Build the runner.
    pub fn build(self) -> Runner {
        Runner {
            registry: self.registry,
            sanitize: self.sanitize,
            retry: self.retry,
            primary_input_key: self.primary_input_key,
            stop_on_failure: self.stop_on_failure,
            observers: self.observers,
        }
    }
}
