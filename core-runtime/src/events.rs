//! # Event Bus System
//!
//! Provides an event-driven architecture for the ingestion core using `tokio::sync::broadcast`.
//! Task runners and the sync orchestrator publish here; the lifecycle monitor
//! and any host-side observers subscribe.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed task lifecycle and sync progress events
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐
//! │ TaskRunner  ├──────────────>│           │     subscribe    ┌──────────────────┐
//! └─────────────┘               │ EventBus  ├─────────────────>│ LifecycleMonitor │
//! ┌─────────────┐     emit      │ (broadcast│                  └──────────────────┘
//! │ Orchestrator├──────────────>│  channel) │
//! └─────────────┘               └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, TaskEvent, TaskPayload};
//!
//! let event_bus = EventBus::new(100);
//! let mut rx = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Task(TaskEvent::new(
//!         "garmin.download_daily_data",
//!         "task-1",
//!         TaskPayload::Started { attempt: 1 },
//!     )))
//!     .ok();
//! ```
//!
//! ## Error Handling
//!
//! `emit` fails only when nobody is subscribed. Publishers treat that as
//! benign and discard the error with `.ok()`. Subscribers see
//! `RecvError::Lagged(n)` when they fall behind and `RecvError::Closed` on
//! shutdown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Task lifecycle events
    Task(TaskEvent),
    /// Sync run progress events
    Sync(SyncEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Task(e) => e.payload.description(),
            CoreEvent::Sync(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Task(TaskEvent {
                phase: TaskPhase::Failure,
                ..
            }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Task(TaskEvent {
                phase: TaskPhase::Retry,
                ..
            }) => EventSeverity::Warning,
            CoreEvent::Task(TaskEvent {
                phase: TaskPhase::Success,
                ..
            }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Task Events
// ============================================================================

/// Lifecycle phase a task event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    Prerun,
    Success,
    Failure,
    Retry,
    Progress,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::Prerun => "prerun",
            TaskPhase::Success => "success",
            TaskPhase::Failure => "failure",
            TaskPhase::Retry => "retry",
            TaskPhase::Progress => "progress",
        }
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase-specific event data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TaskPayload {
    /// Attempt started (1-indexed).
    Started { attempt: u32 },
    /// Attempt returned a value.
    Succeeded { duration_ms: u64 },
    /// Attempt failed and will not be retried.
    Failed {
        error: String,
        error_kind: String,
        duration_ms: u64,
    },
    /// Attempt failed and another one is scheduled.
    Retrying {
        reason: String,
        attempt: u32,
        delay_ms: u64,
    },
    /// Structured progress report.
    Progress {
        current: u64,
        total: u64,
        percentage: u8,
        message: String,
    },
}

impl TaskPayload {
    pub fn phase(&self) -> TaskPhase {
        match self {
            TaskPayload::Started { .. } => TaskPhase::Prerun,
            TaskPayload::Succeeded { .. } => TaskPhase::Success,
            TaskPayload::Failed { .. } => TaskPhase::Failure,
            TaskPayload::Retrying { .. } => TaskPhase::Retry,
            TaskPayload::Progress { .. } => TaskPhase::Progress,
        }
    }

    fn description(&self) -> &str {
        match self {
            TaskPayload::Started { .. } => "Task started",
            TaskPayload::Succeeded { .. } => "Task succeeded",
            TaskPayload::Failed { .. } => "Task failed",
            TaskPayload::Retrying { .. } => "Task retrying",
            TaskPayload::Progress { .. } => "Task progress",
        }
    }
}

/// One lifecycle observation of a task execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskEvent {
    pub task_name: String,
    pub task_id: String,
    pub phase: TaskPhase,
    pub timestamp: DateTime<Utc>,
    pub payload: TaskPayload,
}

impl TaskEvent {
    /// Build an event stamped now; the phase is derived from the payload.
    pub fn new(
        task_name: impl Into<String>,
        task_id: impl Into<String>,
        payload: TaskPayload,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            task_id: task_id.into(),
            phase: payload.phase(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by the incremental sync workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Sync run initiated.
    Started {
        run_id: String,
        user_id: String,
        window_days: u32,
    },
    /// Stage transition with coarse progress.
    Progress {
        run_id: String,
        /// e.g. "initializing", "downloading", "processing", "completing"
        stage: String,
        percent: u8,
    },
    /// Sync finished (possibly with per-item failures).
    Completed {
        run_id: String,
        user_id: String,
        activities_processed: u64,
        health_files_processed: u64,
        existing_items_skipped: u64,
        duration_ms: u64,
    },
    /// Sync aborted.
    Failed {
        run_id: String,
        user_id: String,
        message: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Progress { .. } => "Sync in progress",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for core events.
///
/// Cheap to clone; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let task_events = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Task(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
