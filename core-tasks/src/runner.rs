//! Generic task runner.
//!
//! Wraps every [`Runnable`] in the same envelope: prerun event, setup,
//! execute under the hard time limit, teardown, then a success, retry or
//! failure event. Retry vs. propagate is decided here and nowhere else.
//! A panic in setup or execute is caught and handled like an error, so
//! teardown and the failure event still happen.

use crate::context::{TaskContext, TaskId};
use crate::error::{Result, TaskError};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::runnable::Runnable;
use core_runtime::config::TaskLimits;
use core_runtime::events::{EventBus, TaskPayload};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

#[derive(Clone)]
pub struct TaskRunner {
    limits: TaskLimits,
    policy: RetryPolicy,
    event_bus: Option<EventBus>,
}

impl TaskRunner {
    pub fn new(limits: TaskLimits) -> Self {
        Self {
            policy: RetryPolicy::from_limits(&limits),
            limits,
            event_bus: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn limits(&self) -> &TaskLimits {
        &self.limits
    }

    /// Run `task` with a fresh task id.
    pub async fn run<R: Runnable>(&self, task: &R, input: R::Input) -> Result<R::Output> {
        self.run_with_id(task, TaskId::new(), input).await
    }

    /// Run `task`, retrying per policy, and return its output verbatim.
    ///
    /// An exhausted budget returns the last error unchanged.
    #[instrument(skip(self, task, input), fields(task = %task.name(), task_id = %task_id))]
    pub async fn run_with_id<R: Runnable>(
        &self,
        task: &R,
        task_id: TaskId,
        input: R::Input,
    ) -> Result<R::Output> {
        let mut attempt = 1u32;

        loop {
            let mut ctx = TaskContext::new(task.name(), task_id.clone(), attempt);
            if let Some(bus) = &self.event_bus {
                ctx = ctx.with_event_bus(bus.clone());
            }

            info!(attempt, "Starting task");
            ctx.emit(TaskPayload::Started { attempt });
            let started = Instant::now();

            let outcome = self.run_attempt(task, &ctx, input.clone()).await;
            let elapsed = started.elapsed();
            let duration_ms = elapsed.as_millis() as u64;

            if elapsed > self.limits.soft_time_limit() {
                warn!(
                    elapsed_ms = duration_ms,
                    soft_limit_secs = self.limits.soft_time_limit_secs,
                    "Task exceeded soft time limit"
                );
            }

            let err = match outcome {
                Ok(output) => {
                    info!(duration_ms, "Task completed");
                    ctx.emit(TaskPayload::Succeeded { duration_ms });
                    return Ok(output);
                }
                Err(err) => err,
            };

            error!(duration_ms, error = %err, kind = %err.kind(), "Task failed");

            match self
                .policy
                .decide(&err, ctx.retries(), self.limits.max_retries)
            {
                RetryDecision::Retry { delay, reason } => {
                    warn!(attempt, delay_ms = delay.as_millis() as u64, reason = %reason, "Retrying task");
                    ctx.emit(TaskPayload::Retrying {
                        reason,
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp { reason } => {
                    warn!(attempt, reason = %reason, "Giving up on task");
                    ctx.emit(TaskPayload::Failed {
                        error: err.to_string(),
                        error_kind: err.name().to_string(),
                        duration_ms,
                    });
                    return Err(err);
                }
            }
        }
    }

    async fn run_attempt<R: Runnable>(
        &self,
        task: &R,
        ctx: &TaskContext,
        input: R::Input,
    ) -> Result<R::Output> {
        let time_limit = self.limits.time_limit();

        let body = async {
            task.setup(ctx).await?;
            task.execute(ctx, input).await
        };

        let guarded = AssertUnwindSafe(body).catch_unwind();

        let outcome = match tokio::time::timeout(time_limit, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => Err(panic_error(task.name(), payload.as_ref())),
            Err(_) => Err(timeout_error(task.name(), time_limit)),
        };

        if let Err(teardown_err) = task.teardown(ctx).await {
            error!(error = %teardown_err, "Task teardown failed");
        }

        outcome
    }
}

fn timeout_error(task_name: &str, limit: Duration) -> TaskError {
    TaskError::Timeout(format!(
        "Task {} exceeded time limit of {}s",
        task_name,
        limit.as_secs()
    ))
}

fn panic_error(task_name: &str, payload: &(dyn Any + Send)) -> TaskError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    TaskError::Other(format!("Task {} panicked: {}", task_name, message))
}
