//! The lifecycle monitor service.
//!
//! One instance per worker process. It is constructed at startup, attached
//! to the [`EventBus`] with [`LifecycleMonitor::start`], and detached with
//! [`LifecycleMonitor::shutdown`]. Counters are local to the process.

use crate::alerts::{Alert, AlertLevel, AlertLog};
use crate::error::{MonitorError, Result};
use crate::health::{
    HealthMetrics, HealthResponse, HealthSnapshot, SystemHealth, WorkerStatus,
};
use crate::metrics::{MetricSample, MetricWindow, TaskStats};
use bridge_traits::time::{Clock, SystemClock};
use bridge_traits::workers::WorkerProbe;
use chrono::{DateTime, Utc};
use core_runtime::config::MonitorSettings;
use core_runtime::events::{
    CoreEvent, EventBus, EventStream, RecvError, TaskEvent, TaskPayload,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct MonitorState {
    stats: TaskStats,
    health: SystemHealth,
    metrics: MetricWindow,
    alerts: AlertLog,
    /// Set when the listener exits without being asked to.
    listener_error: Option<String>,
}

impl MonitorState {
    fn new(settings: &MonitorSettings) -> Self {
        Self {
            stats: TaskStats::default(),
            health: SystemHealth::default(),
            metrics: MetricWindow::new(settings.metrics_window),
            alerts: AlertLog::new(settings.alert_window),
            listener_error: None,
        }
    }
}

struct Listener {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct LifecycleMonitor {
    settings: MonitorSettings,
    probe: Arc<dyn WorkerProbe>,
    clock: Arc<dyn Clock>,
    state: RwLock<MonitorState>,
    listener: Mutex<Option<Listener>>,
}

impl LifecycleMonitor {
    pub fn new(settings: MonitorSettings, probe: Arc<dyn WorkerProbe>) -> Self {
        Self {
            state: RwLock::new(MonitorState::new(&settings)),
            settings,
            probe,
            clock: Arc::new(SystemClock),
            listener: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Subscribe to task events on `bus` and process them in the background.
    ///
    /// The subscription is taken before this returns, so every event emitted
    /// afterwards is observed.
    pub async fn start(self: &Arc<Self>, bus: &EventBus) -> Result<()> {
        let mut listener = self.listener.lock().await;
        if listener.as_ref().is_some_and(|l| !l.handle.is_finished()) {
            return Err(MonitorError::AlreadyRunning);
        }

        let stream =
            EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Task(_)));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        self.state.write().await.listener_error = None;

        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            monitor.listen(stream, shutdown_rx).await;
        });

        *listener = Some(Listener {
            shutdown_tx,
            handle,
        });

        info!("Lifecycle monitor listening for task events");
        Ok(())
    }

    /// Stop listening. Events already buffered are recorded first.
    pub async fn shutdown(&self) {
        let Some(listener) = self.listener.lock().await.take() else {
            return;
        };

        listener.shutdown_tx.send(()).ok();
        if let Err(err) = listener.handle.await {
            warn!(error = %err, "Monitor listener did not shut down cleanly");
        }

        info!("Lifecycle monitor stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .is_some_and(|l| !l.handle.is_finished())
    }

    async fn listen(&self, mut stream: EventStream, mut shutdown_rx: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    self.drain(&mut stream).await;
                    debug!("Monitor listener received shutdown");
                    break;
                }
                received = stream.recv() => match received {
                    Ok(CoreEvent::Task(event)) => self.record_event(&event).await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Monitor fell behind; task events were dropped");
                    }
                    Err(RecvError::Closed) => {
                        warn!("Event bus closed; monitor stops listening");
                        self.state.write().await.listener_error =
                            Some("event bus closed".to_string());
                        break;
                    }
                }
            }
        }
    }

    async fn drain(&self, stream: &mut EventStream) {
        loop {
            match stream.try_recv() {
                Some(Ok(CoreEvent::Task(event))) => self.record_event(&event).await,
                Some(Ok(_)) => {}
                Some(Err(RecvError::Lagged(skipped))) => {
                    warn!(skipped, "Monitor fell behind; task events were dropped");
                }
                Some(Err(RecvError::Closed)) | None => break,
            }
        }
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Fold one task lifecycle event into the counters.
    pub async fn record_event(&self, event: &TaskEvent) {
        let now = self.clock.now();
        let name = event.task_name.as_str();
        let id = event.task_id.as_str();
        let mut state = self.state.write().await;

        match &event.payload {
            TaskPayload::Started { attempt } => {
                state.stats.record_started(name);
                state.metrics.push(task_sample("task_started", name, id, now));
                debug!(task_name = name, task_id = id, attempt, "Task started");
            }
            TaskPayload::Succeeded { duration_ms } => {
                state.stats.record_success(name, *duration_ms);
                state.metrics.push(task_sample("task_success", name, id, now));
                debug!(task_name = name, task_id = id, duration_ms, "Task completed successfully");
            }
            TaskPayload::Failed {
                error,
                error_kind,
                duration_ms,
            } => {
                state.stats.record_failure(name, *duration_ms);
                state.metrics.push(
                    task_sample("task_failure", name, id, now)
                        .with_tag("exception_type", error_kind.as_str()),
                );
                state.alerts.push(
                    Alert::new(
                        AlertLevel::Error,
                        format!("Task {} [{}] failed: {}", name, id, error),
                        now,
                    )
                    .with_context("task_name", name)
                    .with_context("task_id", id)
                    .with_context("exception", error.as_str())
                    .with_context("exception_type", error_kind.as_str()),
                );
            }
            TaskPayload::Retrying { reason, attempt, .. } => {
                state.stats.record_retry(name);
                state.metrics.push(
                    task_sample("task_retry", name, id, now).with_tag("reason", reason.as_str()),
                );
                debug!(task_name = name, task_id = id, attempt, reason = %reason, "Task retry");
            }
            TaskPayload::Progress { .. } => {}
        }
    }

    pub async fn record_metric(&self, name: &str, value: f64, tags: BTreeMap<String, String>) {
        let mut sample = MetricSample::new(name, value, self.clock.now());
        sample.tags = tags;
        self.state.write().await.metrics.push(sample);
    }

    pub async fn create_alert(
        &self,
        level: AlertLevel,
        message: impl Into<String>,
        context: Map<String, Value>,
    ) {
        let mut alert = Alert::new(level, message, self.clock.now());
        alert.context = context;
        self.state.write().await.alerts.push(alert);
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Probe the worker pool and re-derive the error rate.
    ///
    /// Probe failures become an alert instead of an error.
    pub async fn check_system_health(&self) {
        let now = self.clock.now();

        if let Err(err) = self.refresh_health(now).await {
            self.state.write().await.alerts.push(
                Alert::new(AlertLevel::Error, format!("Health check failed: {}", err), now)
                    .with_context("exception", err.to_string()),
            );
        }
    }

    async fn refresh_health(&self, now: DateTime<Utc>) -> Result<()> {
        let workers = self.probe.active_workers().await?;
        let queue_depth = if workers > 0 {
            Some(self.probe.queue_depth().await?)
        } else {
            None
        };

        let mut state = self.state.write().await;

        match queue_depth {
            Some(depth) => {
                state.health.worker_status = WorkerStatus::Healthy;
                state
                    .metrics
                    .push(MetricSample::new("active_workers", workers as f64, now));
                state.health.queue_depth = depth;
                state
                    .metrics
                    .push(MetricSample::new("queue_depth", depth as f64, now));
            }
            None => {
                state.health.worker_status = WorkerStatus::Unhealthy;
                state.alerts.push(
                    Alert::new(AlertLevel::Critical, "No active workers detected", now)
                        .with_context("check_time", now.to_rfc3339()),
                );
            }
        }

        if let Some(rate) = state.stats.error_rate() {
            state.health.error_rate = rate;
            state.metrics.push(MetricSample::new("error_rate", rate, now));

            if rate > self.settings.error_rate_alert_threshold {
                let alert = Alert::new(
                    AlertLevel::Error,
                    format!("High error rate detected: {:.2}%", rate * 100.0),
                    now,
                )
                .with_context("error_rate", rate)
                .with_context("failed_tasks", state.stats.failed_tasks)
                .with_context("total_tasks", state.stats.total_tasks);
                state.alerts.push(alert);
            }
        }

        state.health.last_health_check = Some(now);
        Ok(())
    }

    /// Run a health check and return the resulting snapshot.
    ///
    /// Fails when the event listener has stopped on its own, since the
    /// counters would silently go stale.
    pub async fn get_health_status(&self) -> Result<HealthSnapshot> {
        if let Some(reason) = self.state.read().await.listener_error.clone() {
            return Err(MonitorError::ListenerStopped(reason));
        }

        self.check_system_health().await;

        let state = self.state.read().await;
        Ok(HealthSnapshot {
            status: state.health.worker_status,
            metrics: health_metrics(&state),
            last_check: state.health.last_health_check,
            recent_alerts: state
                .alerts
                .recent(self.settings.recent_alerts)
                .map(Alert::summary)
                .collect(),
        })
    }

    /// Load-balancer health probe: 200, 503 when degraded, 500 on error.
    pub async fn health_check(&self) -> (HealthResponse, u16) {
        let now = self.clock.now();

        match self.get_health_status().await {
            Ok(snapshot)
                if snapshot.status == WorkerStatus::Healthy
                    && snapshot.metrics.error_rate < self.settings.healthy_error_rate =>
            {
                (HealthResponse::healthy(now, snapshot.metrics), 200)
            }
            Ok(snapshot) => (
                HealthResponse::unhealthy(now, snapshot.metrics, snapshot.recent_alerts),
                503,
            ),
            Err(err) => {
                error!(error = %err, "Health check endpoint failed");
                (HealthResponse::error(now, err.to_string()), 500)
            }
        }
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Render counters and gauges in the Prometheus text format.
    pub async fn export_prometheus(&self) -> Result<String> {
        let state = self.state.read().await;
        let stats = &state.stats;
        let health = &state.health;
        let mut out = String::new();

        write_metric(
            &mut out,
            "peakflow_tasks_total",
            "Total number of tasks processed",
            "counter",
            stats.total_tasks,
        )?;
        write_metric(
            &mut out,
            "peakflow_tasks_successful",
            "Successful tasks",
            "counter",
            stats.successful_tasks,
        )?;
        write_metric(
            &mut out,
            "peakflow_tasks_failed",
            "Failed tasks",
            "counter",
            stats.failed_tasks,
        )?;
        write_metric(
            &mut out,
            "peakflow_tasks_error_rate",
            "Current error rate",
            "gauge",
            health.error_rate,
        )?;
        write_metric(
            &mut out,
            "peakflow_tasks_queue_depth",
            "Current queue depth",
            "gauge",
            health.queue_depth,
        )?;

        Ok(out)
    }

    /// Scrape endpoint body and status code.
    pub async fn metrics_endpoint(&self) -> (String, u16) {
        match self.export_prometheus().await {
            Ok(body) => (body, 200),
            Err(err) => (format!("# Error exporting metrics: {}", err), 500),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub async fn task_stats(&self) -> TaskStats {
        self.state.read().await.stats.clone()
    }

    pub async fn system_health(&self) -> SystemHealth {
        self.state.read().await.health.clone()
    }

    /// Alerts currently retained, oldest first.
    pub async fn alerts(&self) -> Vec<Alert> {
        self.state.read().await.alerts.iter().cloned().collect()
    }

    pub async fn metric_samples(&self) -> Vec<MetricSample> {
        self.state.read().await.metrics.iter().cloned().collect()
    }
}

fn task_sample(metric: &str, task_name: &str, task_id: &str, now: DateTime<Utc>) -> MetricSample {
    MetricSample::new(metric, 1.0, now)
        .with_tag("task_name", task_name)
        .with_tag("task_id", task_id)
}

fn health_metrics(state: &MonitorState) -> HealthMetrics {
    HealthMetrics {
        total_tasks: state.stats.total_tasks,
        success_rate: state.stats.success_rate(),
        error_rate: state.health.error_rate,
        queue_depth: state.health.queue_depth,
    }
}

fn write_metric(
    out: &mut String,
    name: &str,
    help: &str,
    kind: &str,
    value: impl fmt::Display,
) -> fmt::Result {
    if !out.is_empty() {
        out.push('\n');
    }
    writeln!(out, "# HELP {} {}", name, help)?;
    writeln!(out, "# TYPE {} {}", name, kind)?;
    write!(out, "{} {}", name, value)
}
