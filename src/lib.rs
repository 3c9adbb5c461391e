//! # Tasklane
//!
//! Resumable task pipelines for a single subject.
//!
//! A run takes a subject (an image URL, a text blob, ...) and an ordered
//! queue of task names. Each task sees the run's inputs plus the stored
//! results of every task before it, and its own result is persisted under
//! its name as soon as it finishes. A run that stops halfway can be picked
//! up later without redoing finished work.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tasklane::{FileResultStore, Inputs, Runner, TaskQueue, TaskRegistry};
//!
//! let registry = TaskRegistry::builder()
//!     .register(Ocr)
//!     .register_lazy("translate", || Translate::new(client.clone()))
//!     .build();
//!
//! let runner = Runner::builder(registry)
//!     .on_after_task(|name, _result, status| println!("{name}: {status}"))
//!     .build();
//!
//! let store = FileResultStore::open("results", image_url, Inputs::new()).await?;
//! let mut queue = TaskQueue::pending_against(["ocr", "translate"], &store.all_prior().await?);
//! runner.run_all(&store, &mut queue).await?;
//! ```
//!
//! ## Outcomes
//!
//! Every dequeued task ends in one of four statuses, and each is persisted:
//!
//! - `done` - the handler's result, verbatim
//! - `skipped` - `{"skipped": true, "reason": "not supported"}`
//! - `no_handler` - `{"skipped": true, "reason": "no registered handler"}`
//! - `failed` - `{"failed": true, "error": "..."}`
//!
//! Only storage failures are returned as errors.
//!
//! ## Feature Flags
//!
//! - `sqlite` - Enable the SQLite-backed result store

pub mod observer;
pub mod queue;
pub mod registry;
pub mod result;
pub mod retry;
pub mod runner;
pub mod sanitize;
pub mod store;
pub mod task;

pub use observer::{NoopObserver, TaskObserver};
pub use queue::TaskQueue;
pub use registry::{RegistryBuilder, TaskRegistry};
pub use result::{TaskOutcome, TaskStatus};
pub use retry::RetryPolicy;
pub use runner::{Runner, RunnerBuilder, RunnerError};
pub use sanitize::SanitizePolicy;
pub use store::{FileResultStore, MemoryResultStore, ResultStore, Snapshot, StoreError};
pub use task::{Inputs, Metadata, PriorResults, TaskError, TaskHandler};

#[cfg(feature = "sqlite")]
pub use store::SqliteResultStore;
