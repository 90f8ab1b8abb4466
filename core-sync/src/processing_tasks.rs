//! Per-file and batch processing tasks.
//!
//! - `processing.process_activity_file` / `processing.process_health_file`
//!   run one [`ProcessingRequest`] and report progress at 0, 20, 80 and 100.
//! - `processing.process_file_batch` runs a list of downloaded files and
//!   reports `index / total * 90` before each item.

use crate::dispatcher::{
    BatchResult, ProcessingDispatcher, ProcessingOutcome, ProcessingRequest, ProcessingTarget,
};
use async_trait::async_trait;
use bridge_traits::upstream::DownloadedFile;
use core_tasks::{Result, Runnable, TaskContext, TaskError};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const BATCH_TASK_NAME: &str = "processing.process_file_batch";

/// Runs a single processing request bound to one target.
pub struct ProcessFileTask {
    dispatcher: ProcessingDispatcher,
    target: ProcessingTarget,
}

impl ProcessFileTask {
    pub fn activity(dispatcher: ProcessingDispatcher) -> Self {
        Self {
            dispatcher,
            target: ProcessingTarget::ActivityProcessing,
        }
    }

    pub fn health(dispatcher: ProcessingDispatcher) -> Self {
        Self {
            dispatcher,
            target: ProcessingTarget::HealthProcessing,
        }
    }

    pub fn for_target(dispatcher: ProcessingDispatcher, target: ProcessingTarget) -> Self {
        Self { dispatcher, target }
    }

    pub fn target(&self) -> ProcessingTarget {
        self.target
    }
}

#[async_trait]
impl Runnable for ProcessFileTask {
    type Input = ProcessingRequest;
    type Output = ProcessingOutcome;

    fn name(&self) -> &str {
        self.target.task_name()
    }

    async fn execute(&self, ctx: &TaskContext, request: ProcessingRequest) -> Result<ProcessingOutcome> {
        ctx.update_progress(0, 100, "validating");

        if request.target != self.target {
            return Err(TaskError::Validation(format!(
                "Request for {} sent to {}",
                request.target.task_name(),
                self.target.task_name()
            )));
        }

        ctx.update_progress(20, 100, "processing");
        let outcome = self.dispatcher.execute(&request).await?;
        ctx.update_progress(80, 100, "indexing_completed");

        ctx.update_progress(100, 100, "completed");
        Ok(outcome)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInput {
    pub user_id: String,
    pub files: Vec<DownloadedFile>,
}

pub struct ProcessBatchTask {
    dispatcher: ProcessingDispatcher,
}

impl ProcessBatchTask {
    pub fn new(dispatcher: ProcessingDispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl Runnable for ProcessBatchTask {
    type Input = BatchInput;
    type Output = BatchResult;

    fn name(&self) -> &str {
        BATCH_TASK_NAME
    }

    async fn execute(&self, ctx: &TaskContext, input: BatchInput) -> Result<BatchResult> {
        ctx.update_progress(0, 100, "initializing");
        info!(user_id = %input.user_id, files = input.files.len(), "Processing batch of FIT files");

        let batch = self
            .dispatcher
            .dispatch_batch_with_progress(&input.files, &input.user_id, |index, total| {
                let percent = (index * 90 / total.max(1)) as u64;
                ctx.update_progress(percent, 100, &format!("processing_file_{}", index + 1));
            })
            .await;

        ctx.update_progress(100, 100, "completed");
        Ok(batch)
    }
}
