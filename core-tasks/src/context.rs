//! Per-attempt execution context handed to every [`crate::Runnable`] hook.

use crate::progress::TaskProgress;
use core_runtime::events::{CoreEvent, EventBus, TaskEvent, TaskPayload};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Unique identifier of one task execution (shared by all its retries).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Clone)]
pub struct TaskContext {
    task_name: String,
    task_id: TaskId,
    attempt: u32,
    event_bus: Option<EventBus>,
}

impl TaskContext {
    pub fn new(task_name: impl Into<String>, task_id: TaskId, attempt: u32) -> Self {
        Self {
            task_name: task_name.into(),
            task_id,
            attempt,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// 1-indexed attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Retries performed before this attempt.
    pub fn retries(&self) -> u32 {
        self.attempt.saturating_sub(1)
    }

    pub fn event_bus(&self) -> Option<&EventBus> {
        self.event_bus.as_ref()
    }

    /// Report progress as a `Progress` task event.
    pub fn update_progress(&self, current: u64, total: u64, message: &str) -> TaskProgress {
        let progress = TaskProgress::compute(current, total, message);
        debug!(
            task = %self.task_name,
            task_id = %self.task_id,
            current,
            total,
            percentage = progress.percentage,
            message,
            "Task progress"
        );

        self.emit(TaskPayload::Progress {
            current: progress.current,
            total: progress.total,
            percentage: progress.percentage,
            message: progress.message.clone(),
        });

        progress
    }

    pub(crate) fn emit(&self, payload: TaskPayload) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Task(TaskEvent::new(
                self.task_name.clone(),
                self.task_id.to_string(),
                payload,
            )))
            .ok();
        }
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_name", &self.task_name)
            .field("task_id", &self.task_id)
            .field("attempt", &self.attempt)
            .field("has_event_bus", &self.event_bus.is_some())
            .finish()
    }
}
