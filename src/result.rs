//! Task outcomes and the sentinel result shapes the runner writes itself.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Reason recorded when no handler is registered under a task name.
pub const NO_HANDLER_REASON: &str = "no registered handler";

/// Reason recorded when a handler rejects the inputs.
pub const NOT_SUPPORTED_REASON: &str = "not supported";

/// Terminal status of one task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Handler ran and its result was stored verbatim.
    Done,
    /// Handler declined the inputs.
    Skipped,
    /// Handler returned an error.
    Failed,
    /// No handler is registered under the name.
    NoHandler,
}

impl TaskStatus {
    /// Stable snake_case name, as stored and logged.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::NoHandler => "no_handler",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one dequeued task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub name: String,
    pub status: TaskStatus,
    /// The result that was persisted.
    pub result: Value,
    pub elapsed: Duration,
}

/// Build a `{skipped: true, reason}` result.
pub fn skipped(reason: &str) -> Value {
    json!({ "skipped": true, "reason": reason })
}

/// Build a `{failed: true, error}` result.
pub fn failed(error: &str) -> Value {
    json!({ "failed": true, "error": error })
}

/// True if `result` is the skip sentinel.
pub fn is_skipped(result: &Value) -> bool {
    result.get("skipped").and_then(Value::as_bool).unwrap_or(false)
}

/// True if `result` is the failure sentinel.
pub fn is_failed(result: &Value) -> bool {
    result.get("failed").and_then(Value::as_bool).unwrap_or(false)
}

/// True if `result` was produced by a handler rather than by the runner.
pub fn is_done(result: &Value) -> bool {
    !is_skipped(result) && !is_failed(result)
}

/// The error message of a failure sentinel.
pub fn failure_message(result: &Value) -> Option<&str> {
    if is_failed(result) {
        result.get("error").and_then(Value::as_str)
    } else {
        None
    }
}
