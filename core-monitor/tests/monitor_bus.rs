//! Monitor attached to a live event bus, fed by the real task runner.

use async_trait::async_trait;
use bridge_traits::workers::LocalWorkerProbe;
use core_monitor::{AlertLevel, LifecycleMonitor, MonitorError};
use core_runtime::config::{MonitorSettings, TaskLimits};
use core_runtime::events::EventBus;
use core_tasks::{Result, RetryPolicy, Runnable, TaskContext, TaskError, TaskRunner};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct FlakyTask {
    failures_left: AtomicU32,
    error: TaskError,
}

impl FlakyTask {
    fn new(failures: u32, error: TaskError) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            error,
        }
    }
}

#[async_trait]
impl Runnable for FlakyTask {
    type Input = ();
    type Output = ();

    fn name(&self) -> &str {
        "test.flaky"
    }

    async fn execute(&self, ctx: &TaskContext, _input: ()) -> Result<()> {
        ctx.update_progress(1, 2, "working");
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(self.error.clone());
        }
        Ok(())
    }
}

fn runner(bus: &EventBus) -> TaskRunner {
    TaskRunner::new(TaskLimits::new(30, 20, 0, 2))
        .with_retry_policy(
            RetryPolicy::default()
                .with_base_delay(Duration::from_millis(1))
                .with_jitter(false),
        )
        .with_event_bus(bus.clone())
}

async fn started_monitor(bus: &EventBus) -> Arc<LifecycleMonitor> {
    let monitor = Arc::new(LifecycleMonitor::new(
        MonitorSettings::default(),
        Arc::new(LocalWorkerProbe),
    ));
    monitor.start(bus).await.unwrap();
    monitor
}

#[tokio::test]
async fn test_counts_runner_lifecycle() {
    let bus = EventBus::new(64);
    let monitor = started_monitor(&bus).await;

    let flaky = FlakyTask::new(1, TaskError::Network("connection reset".to_string()));
    runner(&bus).run(&flaky, ()).await.unwrap();

    let invalid = FlakyTask::new(5, TaskError::Validation("bad date".to_string()));
    assert!(runner(&bus).run(&invalid, ()).await.is_err());

    monitor.shutdown().await;

    let stats = monitor.task_stats().await;
    assert_eq!(stats.task_types["test.flaky"].started, 3);
    assert_eq!(stats.retried_tasks, 1);
    assert_eq!(stats.successful_tasks, 1);
    assert_eq!(stats.failed_tasks, 1);
    assert_eq!(stats.total_tasks, 3);

    let alerts = monitor.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].level, AlertLevel::Error);
    assert!(alerts[0].message.starts_with("Task test.flaky ["));
    assert!(alerts[0].message.ends_with("failed: Validation error: bad date"));
}

#[tokio::test]
async fn test_events_after_shutdown_are_ignored() {
    let bus = EventBus::new(64);
    let monitor = started_monitor(&bus).await;
    monitor.shutdown().await;
    assert!(!monitor.is_running().await);

    let task = FlakyTask::new(0, TaskError::Other("unused".to_string()));
    runner(&bus).run(&task, ()).await.unwrap();

    assert_eq!(monitor.task_stats().await.total_tasks, 0);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let bus = EventBus::new(8);
    let monitor = started_monitor(&bus).await;

    assert!(matches!(
        monitor.start(&bus).await,
        Err(MonitorError::AlreadyRunning)
    ));

    monitor.shutdown().await;
    monitor.start(&bus).await.unwrap();
    monitor.shutdown().await;
}

#[tokio::test]
async fn test_closed_bus_fails_health_endpoint() {
    let bus = EventBus::new(8);
    let monitor = started_monitor(&bus).await;
    drop(bus);

    for _ in 0..100 {
        if !monitor.is_running().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (body, code) = monitor.health_check().await;
    assert_eq!(code, 500);
    assert!(body.error.unwrap().contains("event bus closed"));
}
