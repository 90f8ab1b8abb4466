//! `workflows.garmin_sync` task: one [`SyncOrchestrator`] run inside the task runtime.

use crate::orchestrator::{SyncOrchestrator, SyncRunResult};
use async_trait::async_trait;
use core_runtime::config::WORKFLOW_TASK_NAME;
use core_tasks::{Result, Runnable, TaskContext, TaskError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Input of a sync workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub user_id: String,
    pub days: u32,
}

impl SyncRequest {
    pub fn new(user_id: impl Into<String>, days: u32) -> Self {
        Self {
            user_id: user_id.into(),
            days,
        }
    }
}

pub struct SyncWorkflowTask {
    orchestrator: Arc<SyncOrchestrator>,
}

impl SyncWorkflowTask {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Runnable for SyncWorkflowTask {
    type Input = SyncRequest;
    type Output = SyncRunResult;

    fn name(&self) -> &str {
        WORKFLOW_TASK_NAME
    }

    async fn execute(&self, ctx: &TaskContext, input: SyncRequest) -> Result<SyncRunResult> {
        if input.user_id.trim().is_empty() {
            return Err(TaskError::Validation("user_id cannot be empty".to_string()));
        }
        if input.days == 0 {
            return Err(TaskError::Validation(
                "days must be at least 1".to_string(),
            ));
        }

        info!(user_id = %input.user_id, days = input.days, "Starting Garmin sync workflow");

        let result = self
            .orchestrator
            .run_with_id(ctx.task_id().as_str(), &input.user_id, input.days)
            .await?;

        ctx.update_progress(100, 100, "Sync completed");
        Ok(result)
    }
}
