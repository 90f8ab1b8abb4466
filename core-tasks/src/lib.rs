//! # Task Runtime
//!
//! The lifecycle envelope every ingestion task runs in.
//!
//! ## Overview
//!
//! - [`Runnable`] - setup / execute / teardown hooks implemented per task
//! - [`TaskRunner`] - generic runner: events, time limit, retries
//! - [`retry`] - pure retry classification and backoff
//! - [`TaskContext`] - attempt metadata and progress reporting
//!
//! ## Usage
//!
//! ```ignore
//! use core_tasks::{Runnable, TaskRunner};
//!
//! let runner = TaskRunner::new(config.tasks.limits_for(task.name()))
//!     .with_event_bus(event_bus.clone());
//! let summary = runner.run(&task, input).await?;
//! ```

pub mod context;
pub mod error;
pub mod progress;
pub mod retry;
pub mod runnable;
pub mod runner;

pub use context::{TaskContext, TaskId};
pub use error::{ErrorKind, Result, TaskError};
pub use progress::TaskProgress;
pub use retry::{should_retry, RetryDecision, RetryPolicy};
pub use runnable::Runnable;
pub use runner::TaskRunner;
