//! Observation hooks fired around task execution.

use async_trait::async_trait;
use serde_json::Value;

use crate::result::TaskStatus;
use crate::task::{Inputs, PriorResults};

/// Observes task execution for progress display or auditing.
///
/// Observers cannot influence execution. A panicking observer propagates to
/// the caller of the runner.
#[async_trait]
pub trait TaskObserver: Send + Sync {
    /// Called right before a supported task executes.
    async fn before_task(&self, _name: &str, _inputs: &Inputs, _prior: &PriorResults) {}

    /// Called after every dequeued task, whatever its status.
    async fn after_task(&self, _name: &str, _result: &Value, _status: TaskStatus) {}
}

/// An observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl NoopObserver {
    /// Create a new no-op observer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskObserver for NoopObserver {}

/// Adapts a closure into a before-task observer.
pub struct BeforeTaskFn<F>(pub F);

#[async_trait]
impl<F> TaskObserver for BeforeTaskFn<F>
where
    F: Fn(&str, &Inputs, &PriorResults) + Send + Sync,
{
    async fn before_task(&self, name: &str, inputs: &Inputs, prior: &PriorResults) {
        (self.0)(name, inputs, prior)
    }
}

/// Adapts a closure into an after-task observer.
pub struct AfterTaskFn<F>(pub F);

#[async_trait]
impl<F> TaskObserver for AfterTaskFn<F>
where
    F: Fn(&str, &Value, TaskStatus) + Send + Sync,
{
    async fn after_task(&self, name: &str, result: &Value, status: TaskStatus) {
        (self.0)(name, result, status)
    }
}
