//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (credential table,
//! document store, upstream connector, file processors, filesystem, worker
//! probe) into the ingestion core. Hosts running on a regular OS enable the
//! `desktop-shims` feature, which supplies the `tokio::fs` filesystem from
//! `bridge-desktop`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_service::{CoreDependencies, CoreService};
//! use core_runtime::config::AppConfig;
//!
//! let deps = CoreDependencies::desktop(credential_store, storage, connector, activity, health);
//! let core = CoreService::new(AppConfig::from_env()?, deps)?;
//! core.start().await?;
//!
//! let result = core.sync_user(user_id, None).await?;
//! let (health, status) = core.health().await;
//!
//! core.shutdown().await;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{
    credentials::CredentialStore,
    processing::{ActivityProcessor, HealthProcessor},
    storage::{ActivityStorage, FileSystemAccess},
    upstream::{DownloadedFile, UpstreamConnector},
    workers::{LocalWorkerProbe, WorkerProbe},
};
use core_auth::{CredentialCipher, CredentialProvider, CredentialResolver};
use core_monitor::{HealthResponse, LifecycleMonitor};
use core_runtime::config::AppConfig;
use core_runtime::events::EventBus;
use core_runtime::logging::{init_logging, strip_path};
use core_sync::{
    BatchInput, BatchResult, DownloadInput, DownloadSummary, GarminDownloadTask,
    ProcessBatchTask, ProcessFileTask, ProcessingDispatcher, ProcessingOutcome,
    SyncOrchestrator, SyncRequest, SyncRunResult, SyncWorkflowTask, ValidateProcessedDataTask,
    ValidationInput, ValidationReport, BATCH_TASK_NAME, DOWNLOAD_TASK_NAME,
    VALIDATION_TASK_NAME,
};
use core_tasks::{Runnable, TaskRunner};
use tracing::{info, warn};

#[cfg(feature = "desktop-shims")]
use bridge_desktop::TokioFileSystem;

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub credential_store: Arc<dyn CredentialStore>,
    pub storage: Arc<dyn ActivityStorage>,
    pub connector: Arc<dyn UpstreamConnector>,
    pub activity_processor: Arc<dyn ActivityProcessor>,
    pub health_processor: Arc<dyn HealthProcessor>,
    pub filesystem: Arc<dyn FileSystemAccess>,
    pub worker_probe: Arc<dyn WorkerProbe>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    ///
    /// The worker probe defaults to a single in-process worker.
    pub fn new(
        credential_store: Arc<dyn CredentialStore>,
        storage: Arc<dyn ActivityStorage>,
        connector: Arc<dyn UpstreamConnector>,
        activity_processor: Arc<dyn ActivityProcessor>,
        health_processor: Arc<dyn HealthProcessor>,
        filesystem: Arc<dyn FileSystemAccess>,
    ) -> Self {
        Self {
            credential_store,
            storage,
            connector,
            activity_processor,
            health_processor,
            filesystem,
            worker_probe: Arc::new(LocalWorkerProbe),
        }
    }

    /// Same as [`CoreDependencies::new`] with the `tokio::fs` filesystem.
    #[cfg(feature = "desktop-shims")]
    pub fn desktop(
        credential_store: Arc<dyn CredentialStore>,
        storage: Arc<dyn ActivityStorage>,
        connector: Arc<dyn UpstreamConnector>,
        activity_processor: Arc<dyn ActivityProcessor>,
        health_processor: Arc<dyn HealthProcessor>,
    ) -> Self {
        Self::new(
            credential_store,
            storage,
            connector,
            activity_processor,
            health_processor,
            Arc::new(TokioFileSystem::new()),
        )
    }

    pub fn with_worker_probe(mut self, probe: Arc<dyn WorkerProbe>) -> Self {
        self.worker_probe = probe;
        self
    }
}

/// Result of a download followed by the processing it queued.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub summary: DownloadSummary,
    /// One entry per processing request that ran to completion.
    pub outcomes: Vec<ProcessingOutcome>,
    /// Requests whose processing task failed after its retries.
    pub errors: Vec<String>,
}

/// Primary façade exposed to worker hosts.
///
/// Built once at process start; clones share the same bus and monitor.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<AppConfig>,
    deps: Arc<CoreDependencies>,
    event_bus: EventBus,
    monitor: Arc<LifecycleMonitor>,
    dispatcher: ProcessingDispatcher,
    orchestrator: Arc<SyncOrchestrator>,
    download_task: Arc<GarminDownloadTask>,
}

impl CoreService {
    /// Validate `config` and wire every component.
    ///
    /// Fails when the configuration is invalid or the encryption key is
    /// missing or malformed.
    pub fn new(config: AppConfig, deps: CoreDependencies) -> Result<Self> {
        config.validate()?;

        let cipher = CredentialCipher::from_settings(&config.encryption)?;
        let credentials: Arc<dyn CredentialProvider> = Arc::new(CredentialResolver::new(
            Arc::clone(&deps.credential_store),
            cipher,
        ));

        let event_bus = EventBus::default();
        let monitor = Arc::new(LifecycleMonitor::new(
            config.monitor.clone(),
            Arc::clone(&deps.worker_probe),
        ));

        let dispatcher = ProcessingDispatcher::new(
            Arc::clone(&deps.filesystem),
            Arc::clone(&deps.activity_processor),
            Arc::clone(&deps.health_processor),
        );

        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&deps.storage),
            Arc::clone(&credentials),
            Arc::clone(&deps.connector),
            dispatcher.clone(),
            Arc::clone(&deps.filesystem),
            config.garmin.clone(),
        )
        .with_settings(config.sync.clone())
        .with_event_bus(event_bus.clone());

        let download_task = GarminDownloadTask::new(
            credentials,
            Arc::clone(&deps.storage),
            Arc::clone(&deps.connector),
            dispatcher.clone(),
            Arc::clone(&deps.filesystem),
            config.garmin.clone(),
        )
        .with_existing_ids_limit(config.sync.existing_ids_limit);

        Ok(Self {
            config: Arc::new(config),
            deps: Arc::new(deps),
            event_bus,
            monitor,
            dispatcher,
            orchestrator: Arc::new(orchestrator),
            download_task: Arc::new(download_task),
        })
    }

    /// Attach the lifecycle monitor to the event bus.
    pub async fn start(&self) -> Result<()> {
        self.monitor.start(&self.event_bus).await?;
        info!(
            queues = ?self.config.tasks.routes.include,
            "Core service started"
        );
        Ok(())
    }

    /// Detach the monitor. Events already published are still counted.
    pub async fn shutdown(&self) {
        self.monitor.shutdown().await;
        info!("Core service stopped");
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Run the incremental sync workflow for one user.
    ///
    /// `days` falls back to the configured default window.
    pub async fn sync_user(&self, user_id: &str, days: Option<u32>) -> Result<SyncRunResult> {
        let days = days.unwrap_or(self.config.sync.default_window_days);
        let task = SyncWorkflowTask::new(Arc::clone(&self.orchestrator));
        let runner =
            TaskRunner::new(self.config.workflow_limits()).with_event_bus(self.event_bus.clone());

        Ok(runner.run(&task, SyncRequest::new(user_id, days)).await?)
    }

    /// Download a window of daily data, then process every file it queued.
    ///
    /// Each queued request runs as its own processing task; one failing
    /// does not stop the others.
    pub async fn download(&self, input: DownloadInput) -> Result<DownloadReport> {
        let summary = self
            .runner_for(DOWNLOAD_TASK_NAME)
            .run(self.download_task.as_ref(), input)
            .await?;

        let mut outcomes = Vec::with_capacity(summary.requests.len());
        let mut errors = Vec::new();

        for request in &summary.requests {
            let task = ProcessFileTask::for_target(self.dispatcher.clone(), request.target);
            match self
                .runner_for(task.name())
                .run(&task, request.clone())
                .await
            {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    let file = request.file_path.to_string_lossy();
                    warn!(file = %strip_path(&file), error = %err, "Queued processing failed");
                    errors.push(format!("Processing failed for {}: {}", file, err));
                }
            }
        }

        info!(
            user_id = %summary.user_id,
            processed = outcomes.len(),
            failed = errors.len(),
            "Download and processing finished"
        );

        Ok(DownloadReport {
            summary,
            outcomes,
            errors,
        })
    }

    /// Process an explicit list of files as one batch task.
    pub async fn process_batch(
        &self,
        user_id: &str,
        files: Vec<DownloadedFile>,
    ) -> Result<BatchResult> {
        let task = ProcessBatchTask::new(self.dispatcher.clone());
        let input = BatchInput {
            user_id: user_id.to_string(),
            files,
        };

        Ok(self.runner_for(BATCH_TASK_NAME).run(&task, input).await?)
    }

    /// Check what was stored for one activity.
    pub async fn validate_activity(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<ValidationReport> {
        let task = ValidateProcessedDataTask::new(Arc::clone(&self.deps.storage));
        let input = ValidationInput {
            item_id: item_id.to_string(),
            user_id: user_id.to_string(),
        };

        Ok(self.runner_for(VALIDATION_TASK_NAME).run(&task, input).await?)
    }

    fn runner_for(&self, task_name: &str) -> TaskRunner {
        TaskRunner::new(self.config.tasks.limits_for(task_name))
            .with_event_bus(self.event_bus.clone())
    }

    // ========================================================================
    // Observability
    // ========================================================================

    /// Health endpoint body and status code.
    pub async fn health(&self) -> (HealthResponse, u16) {
        self.monitor.health_check().await
    }

    /// Prometheus scrape body and status code.
    pub async fn metrics(&self) -> (String, u16) {
        self.monitor.metrics_endpoint().await
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Queue a task name is routed to.
    pub fn queue_for(&self, task_name: &str) -> &str {
        self.config.tasks.routes.route(task_name)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn monitor(&self) -> Arc<LifecycleMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Access the bridge dependencies being used by the service.
    pub fn dependencies(&self) -> Arc<CoreDependencies> {
        Arc::clone(&self.deps)
    }
}

/// Read configuration from the environment, install logging and start the
/// service.
///
/// A logging subscriber installed earlier by the host is kept.
pub async fn bootstrap_from_env(deps: CoreDependencies) -> Result<CoreService> {
    let config = AppConfig::from_env()?;

    if let Err(err) = init_logging(config.logging.clone()) {
        warn!(error = %err, "Logging already initialized; keeping existing subscriber");
    }

    let core = CoreService::new(config, deps)?;
    core.start().await?;
    Ok(core)
}
