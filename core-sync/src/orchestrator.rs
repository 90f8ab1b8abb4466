//! # Sync Orchestrator
//!
//! Incremental Garmin sync for one user.
//!
//! ## Overview
//!
//! A run moves through a fixed sequence of states and stops at the first
//! run-level failure:
//!
//! ```text
//! Init -> StorageReady -> CredentialsResolved -> ExistingIdsFetched
//!      -> ClientAuthenticated -> FilesStreamed -> ClassifiedAndDispatched
//!      -> Aggregated -> Completed | Failed
//! ```
//!
//! - Storage, credential, authentication and download failures abort the
//!   run with a single [`SyncError::Workflow`].
//! - The existing-ids lookup is allowed to fail; the run then reprocesses
//!   the window instead of skipping known activities.
//! - Per-file failures never abort the run. They are collected into
//!   [`SyncRunResult::errors`] and the run still completes.
//!
//! Wellness data is not taken from the download stream alone: after the
//! activity batch, the user's `sleep/` and `monitoring/` directories are
//! scanned and every wellness file found is processed before the result is
//! assembled.
//!
//! ## Usage
//!
//! ```ignore
//! let orchestrator = SyncOrchestrator::new(
//!     storage, credentials, connector, dispatcher, fs, config.garmin.clone(),
//! )
//! .with_settings(config.sync.clone())
//! .with_event_bus(event_bus.clone());
//!
//! let result = orchestrator.run(user_id, 30).await?;
//! println!("{} activities", result.activities_processed);
//! ```

use crate::classifier::{classify, FileCategory};
use crate::dispatcher::{BuildOptions, ProcessingDispatcher, ProcessingTarget};
use crate::error::{Result, SyncError};
use crate::health_scan::find_health_files;
use bridge_traits::storage::{ActivityStorage, ExistingIdsQuery, FileSystemAccess};
use bridge_traits::time::{Clock, SystemClock};
use bridge_traits::upstream::{
    DownloadEntry, DownloadRequest, DownloadedFile, UpstreamClient, UpstreamConnector,
};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use core_auth::CredentialProvider;
use core_runtime::config::{GarminSettings, SyncSettings};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_runtime::logging::strip_path;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub const NO_NEW_DATA_MESSAGE: &str = "No new data to process";

// ============================================================================
// State and result types
// ============================================================================

/// Position of a run in the sync state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Init,
    StorageReady,
    CredentialsResolved,
    ExistingIdsFetched,
    ClientAuthenticated,
    FilesStreamed,
    ClassifiedAndDispatched,
    Aggregated,
    Completed,
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Init => "init",
            SyncState::StorageReady => "storage_ready",
            SyncState::CredentialsResolved => "credentials_resolved",
            SyncState::ExistingIdsFetched => "existing_ids_fetched",
            SyncState::ClientAuthenticated => "client_authenticated",
            SyncState::FilesStreamed => "files_streamed",
            SyncState::ClassifiedAndDispatched => "classified_and_dispatched",
            SyncState::Aggregated => "aggregated",
            SyncState::Completed => "completed",
            SyncState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Completed | SyncState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRunStatus {
    Completed,
    Failed,
}

/// Summary of one sync run. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRunResult {
    pub status: SyncRunStatus,
    pub user_id: String,
    pub window_days: u32,
    pub start_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub activities_processed: u64,
    pub health_files_processed: u64,
    pub existing_items_skipped: u64,
    /// Stream entries received, error entries included.
    pub total_files_downloaded: u64,
    pub errors: Vec<String>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl SyncRunResult {
    pub fn is_completed(&self) -> bool {
        self.status == SyncRunStatus::Completed
    }
}

/// Counters accumulated while dispatching.
#[derive(Debug, Default)]
struct RunTally {
    activities_processed: u64,
    health_files_processed: u64,
    existing_items_skipped: u64,
    errors: Vec<String>,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct SyncOrchestrator {
    storage: Arc<dyn ActivityStorage>,
    credentials: Arc<dyn CredentialProvider>,
    connector: Arc<dyn UpstreamConnector>,
    dispatcher: ProcessingDispatcher,
    fs: Arc<dyn FileSystemAccess>,
    garmin: GarminSettings,
    settings: SyncSettings,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
}

impl SyncOrchestrator {
    pub fn new(
        storage: Arc<dyn ActivityStorage>,
        credentials: Arc<dyn CredentialProvider>,
        connector: Arc<dyn UpstreamConnector>,
        dispatcher: ProcessingDispatcher,
        fs: Arc<dyn FileSystemAccess>,
        garmin: GarminSettings,
    ) -> Self {
        Self {
            storage,
            credentials,
            connector,
            dispatcher,
            fs,
            garmin,
            settings: SyncSettings::default(),
            clock: Arc::new(SystemClock),
            event_bus: None,
        }
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Run an incremental sync over the trailing `days`.
    pub async fn run(&self, user_id: &str, days: u32) -> Result<SyncRunResult> {
        self.run_with_id(&Uuid::new_v4().to_string(), user_id, days)
            .await
    }

    /// [`run`](Self::run) with a caller-chosen run id for event correlation.
    ///
    /// # Errors
    ///
    /// Only [`SyncError::Workflow`], whose message reads
    /// `"Garmin sync workflow failed for <user_id>: <cause>"`.
    #[instrument(skip_all, fields(run_id = %run_id, user_id = %user_id, days = days))]
    pub async fn run_with_id(
        &self,
        run_id: &str,
        user_id: &str,
        days: u32,
    ) -> Result<SyncRunResult> {
        let started_at = self.clock.now();
        let mut state = SyncState::Init;

        self.emit(SyncEvent::Started {
            run_id: run_id.to_string(),
            user_id: user_id.to_string(),
            window_days: days,
        });

        match self
            .run_inner(run_id, user_id, days, started_at, &mut state)
            .await
        {
            Ok(result) => {
                advance(&mut state, SyncState::Completed);
                info!(
                    activities = result.activities_processed,
                    health_files = result.health_files_processed,
                    skipped = result.existing_items_skipped,
                    errors = result.errors.len(),
                    "Garmin sync completed"
                );
                self.emit(SyncEvent::Completed {
                    run_id: run_id.to_string(),
                    user_id: user_id.to_string(),
                    activities_processed: result.activities_processed,
                    health_files_processed: result.health_files_processed,
                    existing_items_skipped: result.existing_items_skipped,
                    duration_ms: result.duration_ms,
                });
                Ok(result)
            }
            Err(cause) => {
                let failed_in = state;
                advance(&mut state, SyncState::Failed);
                let err = SyncError::workflow(user_id, &cause);
                error!(state = failed_in.as_str(), error = %err, "Garmin sync failed");
                self.emit(SyncEvent::Failed {
                    run_id: run_id.to_string(),
                    user_id: user_id.to_string(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn run_inner(
        &self,
        run_id: &str,
        user_id: &str,
        days: u32,
        started_at: DateTime<Utc>,
        state: &mut SyncState,
    ) -> Result<SyncRunResult> {
        self.progress(run_id, "initializing", 10);

        // Phase 1: Storage
        info!("Phase 1: Initializing storage");
        self.storage.initialize().await?;
        advance(state, SyncState::StorageReady);

        // Phase 2: Credentials
        info!("Phase 2: Resolving Garmin credentials");
        let credentials = self
            .credentials
            .resolve(user_id)
            .await
            .map_err(|e| client_error(SyncError::Auth(e)))?;
        advance(state, SyncState::CredentialsResolved);

        // Phase 3: Existing ids, non-fatal
        info!("Phase 3: Querying existing activities");
        let known = self.existing_ids(user_id, days).await;
        info!(count = known.len(), "Found existing activities to skip");
        advance(state, SyncState::ExistingIdsFetched);

        self.progress(run_id, "downloading", 20);

        // Phase 4: Authenticate
        info!("Phase 4: Authenticating Garmin client");
        let config_dir = self.garmin.user_config_dir(user_id);
        self.fs
            .create_dir_all(&config_dir)
            .await
            .map_err(|e| client_error(SyncError::Bridge(e)))?;
        let client = self
            .connector
            .connect(user_id, &credentials, &config_dir)
            .await
            .map_err(|e| client_error(SyncError::Bridge(e)))?;
        drop(credentials);
        advance(state, SyncState::ClientAuthenticated);

        // Phase 5: Download
        let start_date = (started_at - ChronoDuration::days(i64::from(days))).date_naive();
        info!(%start_date, "Phase 5: Downloading new data");
        let entries = self
            .download(client.as_ref(), user_id, start_date, days, &known)
            .await;
        if let Err(e) = client.close().await {
            warn!(error = %e, "Failed to close Garmin client");
        }
        let entries = entries?;
        advance(state, SyncState::FilesStreamed);

        if entries.is_empty() {
            info!("{}", NO_NEW_DATA_MESSAGE);
            advance(state, SyncState::Aggregated);
            return Ok(self.build_result(
                user_id,
                days,
                start_date,
                Some(NO_NEW_DATA_MESSAGE.to_string()),
                0,
                RunTally::default(),
                started_at,
            ));
        }

        self.progress(run_id, "processing", 50);

        // Phase 6: Classify and dispatch
        info!(entries = entries.len(), "Phase 6: Processing downloaded files");
        let mut tally = RunTally::default();
        let dispatched = self
            .dispatch_downloads(&entries, user_id, &known, &mut tally)
            .await;

        let user_data_dir = self.garmin.user_data_dir(user_id);
        self.process_health_files(&user_data_dir, user_id, &dispatched, &mut tally)
            .await;
        advance(state, SyncState::ClassifiedAndDispatched);

        self.progress(run_id, "completing", 90);

        // Phase 7: Aggregate
        advance(state, SyncState::Aggregated);
        Ok(self.build_result(
            user_id,
            days,
            start_date,
            None,
            entries.len() as u64,
            tally,
            started_at,
        ))
    }

    async fn existing_ids(&self, user_id: &str, days: u32) -> HashSet<String> {
        let end = self.clock.now();
        let query = ExistingIdsQuery {
            user_id: user_id.to_string(),
            start: end - ChronoDuration::days(i64::from(days)),
            end,
            limit: self.settings.existing_ids_limit,
        };

        self.storage
            .existing_activity_ids(&query)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to query existing activities, dedup disabled for this run");
                HashSet::new()
            })
    }

    async fn download(
        &self,
        client: &dyn UpstreamClient,
        user_id: &str,
        start_date: NaiveDate,
        days: u32,
        known: &HashSet<String>,
    ) -> Result<Vec<DownloadEntry>> {
        self.fs
            .create_dir_all(&self.garmin.user_data_dir(user_id))
            .await?;

        // The client nests files under <data_dir>/<user_id> itself.
        let request = DownloadRequest {
            output_dir: self.garmin.data_dir.clone(),
            start_date,
            days,
            overwrite: false,
            exclude_ids: known.clone(),
        };

        let stream = client.download_daily_data(request).await?;
        Ok(stream.collect().await)
    }

    /// Dispatch every new descriptor; returns the paths handed to processing.
    async fn dispatch_downloads(
        &self,
        entries: &[DownloadEntry],
        user_id: &str,
        known: &HashSet<String>,
        tally: &mut RunTally,
    ) -> HashSet<PathBuf> {
        let mut fresh: Vec<DownloadedFile> = Vec::new();

        for entry in entries {
            match entry {
                DownloadEntry::Error { message } => {
                    warn!(error = %message, "Download entry reported an error");
                    tally.errors.push(format!("Download error: {}", message));
                }
                DownloadEntry::File(file) => {
                    let is_known = file
                        .item_id
                        .as_ref()
                        .map(|id| known.contains(id))
                        .unwrap_or(false);
                    if is_known {
                        debug!(item_id = ?file.item_id, "Skipping already ingested activity");
                        tally.existing_items_skipped += 1;
                    } else {
                        fresh.push(file.clone());
                    }
                }
            }
        }

        let activity_files = fresh
            .iter()
            .filter(|f| classify(&f.file_path) == FileCategory::Activity)
            .count();
        debug!(
            new_files = fresh.len(),
            activity_files, "Dispatching downloaded files"
        );

        let batch = self.dispatcher.dispatch_batch(&fresh, user_id).await;

        for outcome in &batch.results {
            let counted = outcome.is_success() && outcome.successful_units > 0;
            match (outcome.target, counted) {
                (Some(ProcessingTarget::ActivityProcessing), true) => {
                    tally.activities_processed += 1
                }
                (Some(ProcessingTarget::HealthProcessing), true) => {
                    tally.health_files_processed += 1
                }
                _ => tally.errors.extend(outcome.errors.iter().cloned()),
            }
        }

        fresh.into_iter().map(|f| f.file_path).collect()
    }

    /// Scan for wellness files and process each one, awaiting all of them.
    async fn process_health_files(
        &self,
        user_data_dir: &std::path::Path,
        user_id: &str,
        already_dispatched: &HashSet<PathBuf>,
        tally: &mut RunTally,
    ) {
        let files = find_health_files(self.fs.as_ref(), user_data_dir)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Health directory scan failed");
                Vec::new()
            });

        for path in files
            .iter()
            .filter(|path| !already_dispatched.contains(*path))
        {
            let display = path.display();
            let result = match self
                .dispatcher
                .build_request(path, user_id, None, BuildOptions::default())
                .await
            {
                Ok(request) => self.dispatcher.execute(&request).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(outcome) if outcome.is_success() => {
                    tally.health_files_processed += 1;
                    info!(file = %strip_path(&path.to_string_lossy()), "Processed health file");
                }
                Ok(_) => {
                    tally
                        .errors
                        .push(format!("Health processing failed: {}", display));
                }
                Err(e) => {
                    let message = format!("Health processing failed for {}: {}", display, e);
                    error!(file = %strip_path(&path.to_string_lossy()), error = %e, "Health processing failed");
                    tally.errors.push(message);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_result(
        &self,
        user_id: &str,
        days: u32,
        start_date: NaiveDate,
        message: Option<String>,
        total_files_downloaded: u64,
        tally: RunTally,
        started_at: DateTime<Utc>,
    ) -> SyncRunResult {
        let completed_at = self.clock.now();
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;

        SyncRunResult {
            status: SyncRunStatus::Completed,
            user_id: user_id.to_string(),
            window_days: days,
            start_date,
            message,
            activities_processed: tally.activities_processed,
            health_files_processed: tally.health_files_processed,
            existing_items_skipped: tally.existing_items_skipped,
            total_files_downloaded,
            errors: tally.errors,
            duration_ms,
            completed_at,
        }
    }

    fn progress(&self, run_id: &str, stage: &str, percent: u8) {
        debug!(stage, percent, "Sync progress");
        self.emit(SyncEvent::Progress {
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            percent,
        });
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Sync(event)).ok();
        }
    }
}

fn advance(state: &mut SyncState, next: SyncState) {
    debug!(from = state.as_str(), to = next.as_str(), "Sync state transition");
    *state = next;
}

fn client_error(cause: SyncError) -> SyncError {
    SyncError::Workflow {
        message: format!("Failed to create Garmin client: {}", cause),
        cause: cause.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SyncState::Completed.is_terminal());
        assert!(SyncState::Failed.is_terminal());
        assert!(!SyncState::FilesStreamed.is_terminal());
        assert_eq!(SyncState::ExistingIdsFetched.as_str(), "existing_ids_fetched");
    }

    #[test]
    fn test_client_error_keeps_cause_kind() {
        let cause = SyncError::Bridge(bridge_traits::BridgeError::Timeout("sso".into()));
        let err = client_error(cause);
        assert!(err.to_string().starts_with("Failed to create Garmin client:"));
        assert_eq!(err.kind(), core_tasks::ErrorKind::Transient);
    }

    #[test]
    fn test_result_serializes_without_empty_message() {
        let result = SyncRunResult {
            status: SyncRunStatus::Completed,
            user_id: "u".into(),
            window_days: 7,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            message: None,
            activities_processed: 1,
            health_files_processed: 0,
            existing_items_skipped: 0,
            total_files_downloaded: 1,
            errors: vec![],
            duration_ms: 5,
            completed_at: Utc::now(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["start_date"], "2024-01-01");
        assert!(json.get("message").is_none());
    }
}
