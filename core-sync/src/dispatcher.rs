//! # Processing Dispatcher
//!
//! Binds a classified file to its processor and runs it.
//!
//! ## Overview
//!
//! [`ProcessingDispatcher::build_request`] validates a file and fixes the
//! processing target and arguments up front. [`ProcessingDispatcher::execute`]
//! runs one request to completion; [`ProcessingDispatcher::dispatch_batch`]
//! runs a list of downloaded files one after another and reports per-item
//! outcomes, so one broken file never takes its siblings down with it.
//!
//! ## Usage
//!
//! ```ignore
//! let dispatcher = ProcessingDispatcher::new(fs, activity_processor, health_processor);
//!
//! let request = dispatcher
//!     .build_request(&path, user_id, Some("12345"), BuildOptions::default())
//!     .await?;
//! let outcome = dispatcher.execute(&request).await?;
//!
//! let batch = dispatcher.dispatch_batch(&files, user_id).await;
//! assert_eq!(batch.processed, files.len());
//! ```

use crate::classifier::{classify, FileCategory};
use crate::error::{Result, SyncError};
use bridge_traits::processing::{ActivityProcessor, HealthProcessor, ProcessingStatus};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::upstream::DownloadedFile;
use core_runtime::logging::strip_path;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub const ACTIVITY_TASK_NAME: &str = "processing.process_activity_file";
pub const HEALTH_TASK_NAME: &str = "processing.process_health_file";

const ACTIVITY_ID_REQUIRED: &str = "Activity ID is required for activity FIT files";
const ACTIVITY_ID_REQUIRED_NO_DETECT: &str =
    "Activity ID is required when auto-detection is disabled";
const HEALTH_PROCESSING_FAILED: &str = "Health data processing failed";

// ============================================================================
// Requests
// ============================================================================

/// Processor a request is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingTarget {
    ActivityProcessing,
    HealthProcessing,
}

impl ProcessingTarget {
    /// Task name the request runs under.
    pub fn task_name(&self) -> &'static str {
        match self {
            ProcessingTarget::ActivityProcessing => ACTIVITY_TASK_NAME,
            ProcessingTarget::HealthProcessing => HEALTH_TASK_NAME,
        }
    }
}

/// A fully-bound unit of processing work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingRequest {
    pub target: ProcessingTarget,
    pub file_path: PathBuf,
    pub user_id: String,
    /// Always set for activity processing.
    pub item_id: Option<String>,
    /// Check the file without handing it to the processor.
    pub validate_only: bool,
}

/// Options for [`ProcessingDispatcher::build_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    pub validate_only: bool,
    /// Route by file name; when off every file is an activity.
    pub auto_detect: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            validate_only: false,
            auto_detect: true,
        }
    }
}

impl BuildOptions {
    pub fn with_validate_only(mut self, validate_only: bool) -> Self {
        self.validate_only = validate_only;
        self
    }

    pub fn with_auto_detect(mut self, auto_detect: bool) -> Self {
        self.auto_detect = auto_detect;
        self
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Completed,
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Completed => "completed",
            OutcomeStatus::Failed => "failed",
        }
    }
}

/// Result of processing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    pub item_id: Option<String>,
    pub file_path: PathBuf,
    pub target: Option<ProcessingTarget>,
    pub status: OutcomeStatus,
    pub successful_units: u64,
    pub failed_units: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ProcessingOutcome {
    /// Outcome for a file whose processing raised.
    pub fn failed(file: &DownloadedFile, error: impl Into<String>) -> Self {
        Self {
            item_id: file.item_id.clone(),
            file_path: file.file_path.clone(),
            target: None,
            status: OutcomeStatus::Failed,
            successful_units: 0,
            failed_units: 0,
            errors: vec![error.into()],
            warnings: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }
}

/// Aggregate of a batch dispatch.
///
/// `processed == successful + failed` and `processed <= total` always hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<ProcessingOutcome>,
}

impl BatchResult {
    fn with_total(total: usize) -> Self {
        Self {
            total,
            results: Vec::with_capacity(total),
            ..Default::default()
        }
    }

    fn push(&mut self, outcome: ProcessingOutcome) {
        if outcome.is_success() {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.processed += 1;
        self.results.push(outcome);
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes files to the activity or health processor.
#[derive(Clone)]
pub struct ProcessingDispatcher {
    fs: Arc<dyn FileSystemAccess>,
    activity: Arc<dyn ActivityProcessor>,
    health: Arc<dyn HealthProcessor>,
}

impl ProcessingDispatcher {
    pub fn new(
        fs: Arc<dyn FileSystemAccess>,
        activity: Arc<dyn ActivityProcessor>,
        health: Arc<dyn HealthProcessor>,
    ) -> Self {
        Self {
            fs,
            activity,
            health,
        }
    }

    /// Validate a file and bind it to a processing target.
    ///
    /// # Errors
    ///
    /// - [`SyncError::FileNotFound`] when the file does not exist
    /// - [`SyncError::MissingItemId`] when an activity file has no item id,
    ///   or auto-detection is off and no item id was given
    pub async fn build_request(
        &self,
        file_path: &Path,
        user_id: &str,
        item_id: Option<&str>,
        options: BuildOptions,
    ) -> Result<ProcessingRequest> {
        if !self.fs.exists(file_path).await? {
            return Err(SyncError::FileNotFound(file_path.to_path_buf()));
        }

        let item_id = item_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let target = if options.auto_detect {
            match classify(file_path) {
                FileCategory::Health => {
                    debug!(file = %strip_path(&file_path.to_string_lossy()), "Detected health file");
                    ProcessingTarget::HealthProcessing
                }
                FileCategory::Activity => {
                    debug!(file = %strip_path(&file_path.to_string_lossy()), "Detected activity file");
                    if item_id.is_none() {
                        return Err(SyncError::MissingItemId(ACTIVITY_ID_REQUIRED.to_string()));
                    }
                    ProcessingTarget::ActivityProcessing
                }
            }
        } else {
            if item_id.is_none() {
                return Err(SyncError::MissingItemId(
                    ACTIVITY_ID_REQUIRED_NO_DETECT.to_string(),
                ));
            }
            ProcessingTarget::ActivityProcessing
        };

        Ok(ProcessingRequest {
            target,
            file_path: file_path.to_path_buf(),
            user_id: user_id.to_string(),
            item_id,
            validate_only: options.validate_only,
        })
    }

    /// Run one request to completion.
    ///
    /// A processor error surfaces as [`SyncError::FitProcessing`]; a health
    /// processor that declines the file yields a `failed` outcome instead.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, target = request.target.task_name()))]
    pub async fn execute(&self, request: &ProcessingRequest) -> Result<ProcessingOutcome> {
        if !self.fs.exists(&request.file_path).await? {
            return Err(SyncError::FileNotFound(request.file_path.clone()));
        }

        let file = strip_path_owned(&request.file_path);

        let mut outcome = ProcessingOutcome {
            item_id: request.item_id.clone(),
            file_path: request.file_path.clone(),
            target: Some(request.target),
            status: OutcomeStatus::Completed,
            successful_units: 0,
            failed_units: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        if request.validate_only {
            debug!(file = %file, "Validate-only request; processor not invoked");
            outcome
                .warnings
                .push("Validation only, no data stored".to_string());
            return Ok(outcome);
        }

        match request.target {
            ProcessingTarget::ActivityProcessing => {
                let activity_id = request
                    .item_id
                    .as_deref()
                    .ok_or_else(|| SyncError::MissingItemId(ACTIVITY_ID_REQUIRED.to_string()))?;

                let report = self
                    .activity
                    .process(&request.file_path, &request.user_id, activity_id)
                    .await
                    .map_err(|e| {
                        error!(file = %file, error = %e, "FIT processing failed");
                        SyncError::FitProcessing(format!("Processing failed: {}", e))
                    })?;

                if report.status == ProcessingStatus::Failed {
                    outcome.status = OutcomeStatus::Failed;
                }
                outcome.successful_units = report.successful_records;
                outcome.failed_units = report.failed_records;
                outcome.errors = report.errors;
                outcome.warnings = report.warnings;

                info!(
                    file = %file,
                    activity_id,
                    records = outcome.successful_units,
                    status = report.status.as_str(),
                    "Processed activity file"
                );
            }
            ProcessingTarget::HealthProcessing => {
                let stored = self
                    .health
                    .process_fit_file(&request.file_path, &request.user_id)
                    .await
                    .map_err(|e| {
                        error!(file = %file, error = %e, "Health FIT processing failed");
                        SyncError::FitProcessing(format!("Health processing failed: {}", e))
                    })?;

                if stored {
                    outcome.successful_units = 1;
                    info!(file = %file, "Processed health file");
                } else {
                    outcome.status = OutcomeStatus::Failed;
                    outcome.failed_units = 1;
                    outcome.errors.push(HEALTH_PROCESSING_FAILED.to_string());
                    warn!(file = %file, "Health processor did not store file");
                }
            }
        }

        Ok(outcome)
    }

    /// Build and run a request per file, in order.
    ///
    /// Never fails: a file that cannot be built or processed becomes a
    /// `failed` outcome carrying its item id and error message.
    pub async fn dispatch_batch(&self, files: &[DownloadedFile], user_id: &str) -> BatchResult {
        self.dispatch_batch_with_progress(files, user_id, |_, _| {})
            .await
    }

    /// [`dispatch_batch`](Self::dispatch_batch) with a callback invoked
    /// before each item as `(index, total)`.
    #[instrument(skip(self, files, on_item), fields(user_id = %user_id, files = files.len()))]
    pub async fn dispatch_batch_with_progress<F>(
        &self,
        files: &[DownloadedFile],
        user_id: &str,
        mut on_item: F,
    ) -> BatchResult
    where
        F: FnMut(usize, usize) + Send,
    {
        let total = files.len();
        let mut batch = BatchResult::with_total(total);

        for (index, file) in files.iter().enumerate() {
            on_item(index, total);

            let outcome = match self.process_one(file, user_id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        file = %strip_path_owned(&file.file_path),
                        item_id = ?file.item_id,
                        error = %e,
                        "Failed to process file {}/{}",
                        index + 1,
                        total
                    );
                    ProcessingOutcome::failed(file, e.to_string())
                }
            };

            batch.push(outcome);
        }

        info!(
            successful = batch.successful,
            failed = batch.failed,
            "Batch processing completed"
        );

        batch
    }

    async fn process_one(&self, file: &DownloadedFile, user_id: &str) -> Result<ProcessingOutcome> {
        let request = self
            .build_request(
                &file.file_path,
                user_id,
                file.item_id.as_deref(),
                BuildOptions::default(),
            )
            .await?;
        self.execute(&request).await
    }
}

fn strip_path_owned(path: &Path) -> String {
    strip_path(&path.to_string_lossy()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::processing::ProcessingReport;
    use bridge_traits::storage::FileMetadata;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FakeFs {
        files: HashSet<PathBuf>,
    }

    #[async_trait]
    impl FileSystemAccess for FakeFs {
        async fn exists(&self, path: &Path) -> BridgeResult<bool> {
            Ok(self.files.contains(path))
        }

        async fn metadata(&self, _path: &Path) -> BridgeResult<FileMetadata> {
            Ok(FileMetadata {
                size: 0,
                created_at: None,
                modified_at: None,
                is_directory: false,
            })
        }

        async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn list_directory(&self, _path: &Path) -> BridgeResult<Vec<PathBuf>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct RecordingActivity {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ActivityProcessor for RecordingActivity {
        async fn process(
            &self,
            _file_path: &Path,
            _user_id: &str,
            activity_id: &str,
        ) -> BridgeResult<ProcessingReport> {
            self.calls.lock().unwrap().push(activity_id.to_string());
            if activity_id == "boom" {
                return Err(BridgeError::OperationFailed("corrupt header".to_string()));
            }
            Ok(ProcessingReport::completed(42))
        }
    }

    struct StaticHealth(bool);

    #[async_trait]
    impl HealthProcessor for StaticHealth {
        async fn process_fit_file(&self, _file_path: &Path, _user_id: &str) -> BridgeResult<bool> {
            Ok(self.0)
        }
    }

    fn dispatcher(files: &[&str], health_ok: bool) -> (ProcessingDispatcher, Arc<RecordingActivity>) {
        let fs = FakeFs {
            files: files.iter().map(PathBuf::from).collect(),
        };
        let activity = Arc::new(RecordingActivity::default());
        let dispatcher =
            ProcessingDispatcher::new(Arc::new(fs), activity.clone(), Arc::new(StaticHealth(health_ok)));
        (dispatcher, activity)
    }

    #[tokio::test]
    async fn test_build_request_routes_by_name() {
        let (d, _) = dispatcher(&["/d/1_ACTIVITY.fit", "/d/WELLNESS_1.fit"], true);

        let activity = d
            .build_request(Path::new("/d/1_ACTIVITY.fit"), "u", Some("1"), BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(activity.target, ProcessingTarget::ActivityProcessing);
        assert_eq!(activity.target.task_name(), "processing.process_activity_file");

        let health = d
            .build_request(Path::new("/d/WELLNESS_1.fit"), "u", None, BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(health.target, ProcessingTarget::HealthProcessing);
        assert!(health.item_id.is_none());
    }

    #[tokio::test]
    async fn test_build_request_missing_file() {
        let (d, _) = dispatcher(&[], true);
        let err = d
            .build_request(Path::new("/d/1.fit"), "u", Some("1"), BuildOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "FIT file not found: /d/1.fit");
    }

    #[tokio::test]
    async fn test_build_request_requires_item_id() {
        let (d, _) = dispatcher(&["/d/1_ACTIVITY.fit", "/d/sleep.fit"], true);

        let err = d
            .build_request(Path::new("/d/1_ACTIVITY.fit"), "u", Some("  "), BuildOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), ACTIVITY_ID_REQUIRED);

        let no_detect = BuildOptions::default().with_auto_detect(false);
        let err = d
            .build_request(Path::new("/d/sleep.fit"), "u", None, no_detect)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), ACTIVITY_ID_REQUIRED_NO_DETECT);

        let forced = d
            .build_request(Path::new("/d/sleep.fit"), "u", Some("9"), no_detect)
            .await
            .unwrap();
        assert_eq!(forced.target, ProcessingTarget::ActivityProcessing);
    }

    #[tokio::test]
    async fn test_execute_health_decline_is_failed_outcome() {
        let (d, _) = dispatcher(&["/d/sleep.fit"], false);
        let request = d
            .build_request(Path::new("/d/sleep.fit"), "u", None, BuildOptions::default())
            .await
            .unwrap();

        let outcome = d.execute(&request).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.failed_units, 1);
        assert_eq!(outcome.errors, vec![HEALTH_PROCESSING_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn test_execute_validate_only_skips_processor() {
        let (d, activity) = dispatcher(&["/d/1_ACTIVITY.fit"], true);
        let request = d
            .build_request(
                Path::new("/d/1_ACTIVITY.fit"),
                "u",
                Some("1"),
                BuildOptions::default().with_validate_only(true),
            )
            .await
            .unwrap();

        let outcome = d.execute(&request).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(activity.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let (d, activity) = dispatcher(&["/d/1_ACTIVITY.fit", "/d/2_ACTIVITY.fit"], true);
        let files = vec![
            DownloadedFile::new("/d/1_ACTIVITY.fit", Some("boom".to_string())),
            DownloadedFile::new("/d/missing_ACTIVITY.fit", Some("3".to_string())),
            DownloadedFile::new("/d/2_ACTIVITY.fit", Some("2".to_string())),
        ];

        let mut seen = Vec::new();
        let batch = d
            .dispatch_batch_with_progress(&files, "u", |i, n| seen.push((i, n)))
            .await;

        assert_eq!(batch.total, 3);
        assert_eq!(batch.processed, 3);
        assert_eq!(batch.successful, 1);
        assert_eq!(batch.failed, 2);
        assert_eq!(batch.results.len(), 3);
        assert_eq!(seen, vec![(0, 3), (1, 3), (2, 3)]);

        assert_eq!(batch.results[0].item_id.as_deref(), Some("boom"));
        assert!(batch.results[0].errors[0].starts_with("Processing failed:"));
        assert!(batch.results[1].errors[0].contains("FIT file not found"));
        assert_eq!(*activity.calls.lock().unwrap(), vec!["boom", "2"]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (d, _) = dispatcher(&[], true);
        let batch = d.dispatch_batch(&[], "u").await;
        assert_eq!(batch, BatchResult::default());
    }
}
