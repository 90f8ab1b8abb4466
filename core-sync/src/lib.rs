//! # Garmin Sync Engine
//!
//! Incremental ingestion of Garmin activity and wellness files.
//!
//! ## Overview
//!
//! - [`classifier`] - activity vs. wellness by file name
//! - [`dispatcher`] - binds files to processors, batch fan-out
//! - [`orchestrator`] - the incremental sync state machine
//! - [`workflow`], [`download`], [`processing_tasks`], [`validation`] -
//!   [`Runnable`](core_tasks::Runnable) tasks for the task runtime
//!
//! ## Usage
//!
//! ```ignore
//! use core_sync::{SyncOrchestrator, SyncRequest, SyncWorkflowTask};
//! use core_tasks::TaskRunner;
//!
//! let task = SyncWorkflowTask::new(Arc::new(orchestrator));
//! let runner = TaskRunner::new(config.workflow_limits()).with_event_bus(bus.clone());
//! let result = runner.run(&task, SyncRequest::new(user_id, 30)).await?;
//! ```

pub mod classifier;
pub mod dispatcher;
pub mod download;
pub mod error;
pub mod health_scan;
pub mod orchestrator;
pub mod processing_tasks;
pub mod validation;
pub mod workflow;

pub use classifier::{classify, is_health_file, FileCategory};
pub use dispatcher::{
    BatchResult, BuildOptions, OutcomeStatus, ProcessingDispatcher, ProcessingOutcome,
    ProcessingRequest, ProcessingTarget,
};
pub use download::{DownloadInput, DownloadSummary, GarminDownloadTask, DOWNLOAD_TASK_NAME};
pub use error::{Result, SyncError};
pub use health_scan::find_health_files;
pub use orchestrator::{
    SyncOrchestrator, SyncRunResult, SyncRunStatus, SyncState, NO_NEW_DATA_MESSAGE,
};
pub use processing_tasks::{BatchInput, ProcessBatchTask, ProcessFileTask, BATCH_TASK_NAME};
pub use validation::{
    ValidateProcessedDataTask, ValidationInput, ValidationReport, ValidationStatus,
    VALIDATION_TASK_NAME,
};
pub use workflow::{SyncRequest, SyncWorkflowTask};
