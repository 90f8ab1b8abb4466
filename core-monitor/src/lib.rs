//! # Lifecycle Monitor
//!
//! Per-process task counters, alerts and health reporting.
//!
//! ## Overview
//!
//! [`LifecycleMonitor`] subscribes to task events on the
//! [`EventBus`](core_runtime::events::EventBus) and keeps:
//! - monotonic counters per worker and per task name ([`TaskStats`])
//! - a bounded window of [`MetricSample`]s
//! - a bounded history of [`Alert`]s
//!
//! Health checks probe the worker pool through
//! [`WorkerProbe`](bridge_traits::workers::WorkerProbe) on demand, and the
//! counters can be scraped in the Prometheus text format.
//!
//! ## Usage
//!
//! ```ignore
//! use core_monitor::LifecycleMonitor;
//!
//! let monitor = Arc::new(LifecycleMonitor::new(config.monitor.clone(), probe));
//! monitor.start(&bus).await?;
//!
//! let (body, status) = monitor.health_check().await;
//! let (metrics, _) = monitor.metrics_endpoint().await;
//!
//! monitor.shutdown().await;
//! ```

pub mod alerts;
pub mod error;
pub mod health;
pub mod metrics;
pub mod monitor;

pub use alerts::{Alert, AlertLevel, AlertLog, AlertSummary};
pub use error::{MonitorError, Result};
pub use health::{
    HealthMetrics, HealthResponse, HealthSnapshot, HealthState, SystemHealth, WorkerStatus,
};
pub use metrics::{MetricSample, MetricWindow, TaskStats, TaskTypeStats};
pub use monitor::LifecycleMonitor;
