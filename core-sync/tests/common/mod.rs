//! Hand-written fakes for the bridge traits used by the sync tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::credentials::Credentials;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::processing::{ActivityProcessor, HealthProcessor, ProcessingReport};
use bridge_traits::storage::{ActivityStorage, DocumentKind, ExistingIdsQuery};
use bridge_traits::upstream::{
    DownloadEntry, DownloadRequest, DownloadStream, DownloadedFile, UpstreamClient,
    UpstreamConnector,
};
use core_auth::{AuthError, CredentialProvider};
use core_runtime::config::GarminSettings;
use core_sync::{ProcessingDispatcher, SyncOrchestrator};
use futures::stream;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const USER: &str = "5f0c6b8e-1d2a-4c3b-9e8f-7a6b5c4d3e2f";

// ============================================================================
// Storage
// ============================================================================

#[derive(Default)]
pub struct FakeStorage {
    pub fail_initialize: bool,
    pub fail_query: bool,
    pub existing: HashSet<String>,
    pub initialize_calls: AtomicUsize,
    pub queries: Mutex<Vec<ExistingIdsQuery>>,
}

impl FakeStorage {
    pub fn with_existing(ids: &[&str]) -> Self {
        Self {
            existing: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ActivityStorage for FakeStorage {
    async fn initialize(&self) -> BridgeResult<()> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize {
            return Err(BridgeError::Connection(
                "Elasticsearch connection refused".to_string(),
            ));
        }
        Ok(())
    }

    async fn existing_activity_ids(&self, query: &ExistingIdsQuery) -> BridgeResult<HashSet<String>> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail_query {
            return Err(BridgeError::DatabaseError("index_not_found".to_string()));
        }
        Ok(self.existing.clone())
    }

    async fn count_documents(
        &self,
        _kind: DocumentKind,
        _user_id: &str,
        _activity_id: &str,
        _limit: usize,
    ) -> BridgeResult<usize> {
        Ok(1)
    }
}

// ============================================================================
// Credentials
// ============================================================================

pub struct StubCredentials {
    pub known: bool,
    /// Fail every lookup as if the credential table were unreachable.
    pub unreachable: bool,
    pub calls: AtomicUsize,
}

impl StubCredentials {
    pub fn known() -> Self {
        Self {
            known: true,
            unreachable: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn missing() -> Self {
        Self {
            known: false,
            unreachable: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            known: false,
            unreachable: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CredentialProvider for StubCredentials {
    async fn resolve(&self, user_id: &str) -> core_auth::Result<Credentials> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(AuthError::Storage(BridgeError::Connection(
                "credential table unreachable".to_string(),
            )));
        }
        if self.known {
            Ok(Credentials::new("runner@example.com", "hunter2"))
        } else {
            Err(AuthError::CredentialsNotFound {
                user_id: user_id.to_string(),
            })
        }
    }
}

// ============================================================================
// Upstream
// ============================================================================

/// Connector whose clients replay a fixed list of entries.
#[derive(Default)]
pub struct FakeConnector {
    pub entries: Vec<DownloadEntry>,
    pub reject: bool,
    pub connects: AtomicUsize,
    /// `(user_id, config_dir)` for every connect call.
    pub sessions: Mutex<Vec<(String, PathBuf)>>,
    pub requests: Arc<Mutex<Vec<DownloadRequest>>>,
    pub closed: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn replaying(entries: Vec<DownloadEntry>) -> Self {
        Self {
            entries,
            ..Default::default()
        }
    }
}

struct FakeClient {
    entries: Vec<DownloadEntry>,
    requests: Arc<Mutex<Vec<DownloadRequest>>>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl UpstreamClient for FakeClient {
    async fn download_daily_data(&self, request: DownloadRequest) -> BridgeResult<DownloadStream> {
        self.requests.lock().unwrap().push(request);
        Ok(Box::pin(stream::iter(self.entries.clone())))
    }

    async fn close(&self) -> BridgeResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl UpstreamConnector for FakeConnector {
    async fn connect(
        &self,
        user_id: &str,
        credentials: &Credentials,
        config_dir: &Path,
    ) -> BridgeResult<Box<dyn UpstreamClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .unwrap()
            .push((user_id.to_string(), config_dir.to_path_buf()));
        if self.reject || !credentials.is_complete() {
            return Err(BridgeError::AuthenticationRejected(
                "Can't login to Garmin Connect".to_string(),
            ));
        }
        Ok(Box::new(FakeClient {
            entries: self.entries.clone(),
            requests: self.requests.clone(),
            closed: self.closed.clone(),
        }))
    }
}

// ============================================================================
// Processors
// ============================================================================

/// Records every activity id; ids starting with `fail` raise.
#[derive(Default)]
pub struct RecordingActivity {
    pub processed: Mutex<Vec<String>>,
}

#[async_trait]
impl ActivityProcessor for RecordingActivity {
    async fn process(
        &self,
        _file_path: &Path,
        _user_id: &str,
        activity_id: &str,
    ) -> BridgeResult<ProcessingReport> {
        self.processed.lock().unwrap().push(activity_id.to_string());
        if activity_id.starts_with("fail") {
            return Err(BridgeError::OperationFailed("Invalid FIT header".to_string()));
        }
        if activity_id.starts_with("empty") {
            return Ok(ProcessingReport {
                errors: vec!["No records decoded".to_string()],
                ..ProcessingReport::completed(0)
            });
        }
        Ok(ProcessingReport::completed(120))
    }
}

/// Stores every file except those whose name contains `broken`.
#[derive(Default)]
pub struct RecordingHealth {
    pub processed: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl HealthProcessor for RecordingHealth {
    async fn process_fit_file(&self, file_path: &Path, _user_id: &str) -> BridgeResult<bool> {
        self.processed.lock().unwrap().push(file_path.to_path_buf());
        Ok(!file_path.to_string_lossy().contains("broken"))
    }
}

// ============================================================================
// Fixture
// ============================================================================

/// Temp data root plus every fake wired into an orchestrator.
pub struct Harness {
    pub dir: TempDir,
    pub garmin: GarminSettings,
    pub storage: Arc<FakeStorage>,
    pub credentials: Arc<StubCredentials>,
    pub connector: Arc<FakeConnector>,
    pub activity: Arc<RecordingActivity>,
    pub health: Arc<RecordingHealth>,
}

impl Harness {
    pub fn new(storage: FakeStorage, credentials: StubCredentials, connector: FakeConnector) -> Self {
        let dir = TempDir::new().unwrap();
        let garmin = GarminSettings::default()
            .with_config_dir(dir.path().join("config"))
            .with_data_dir(dir.path().join("data"));
        Self {
            dir,
            garmin,
            storage: Arc::new(storage),
            credentials: Arc::new(credentials),
            connector: Arc::new(connector),
            activity: Arc::new(RecordingActivity::default()),
            health: Arc::new(RecordingHealth::default()),
        }
    }

    /// Replace the connector with one replaying `entries`.
    pub fn replay(&mut self, entries: Vec<DownloadEntry>) {
        self.connector = Arc::new(FakeConnector::replaying(entries));
    }

    pub fn user_dir(&self) -> PathBuf {
        self.garmin.user_data_dir(USER)
    }

    pub fn session_dirs(&self) -> Vec<(String, PathBuf)> {
        self.connector.sessions.lock().unwrap().clone()
    }

    pub fn dispatcher(&self) -> ProcessingDispatcher {
        ProcessingDispatcher::new(
            Arc::new(TokioFileSystem::new()),
            self.activity.clone(),
            self.health.clone(),
        )
    }

    pub fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::new(
            self.storage.clone(),
            self.credentials.clone(),
            self.connector.clone(),
            self.dispatcher(),
            Arc::new(TokioFileSystem::new()),
            self.garmin.clone(),
        )
    }

    pub fn activity_calls(&self) -> Vec<String> {
        self.activity.processed.lock().unwrap().clone()
    }

    pub fn health_calls(&self) -> Vec<PathBuf> {
        self.health.processed.lock().unwrap().clone()
    }
}

/// Create a FIT file on disk and return its path.
pub fn write_fit(path: &Path) -> PathBuf {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"\x0e\x10.FIT").unwrap();
    path.to_path_buf()
}

/// Activity descriptor for `<dir>/activities/<id>_ACTIVITY.fit`, written to disk.
pub fn activity_entry(dir: &Path, id: &str) -> DownloadEntry {
    let path = write_fit(&dir.join("activities").join(format!("{}_ACTIVITY.fit", id)));
    DownloadEntry::File(DownloadedFile::new(path, Some(id.to_string())).with_size(6))
}

pub fn error_entry(message: &str) -> DownloadEntry {
    DownloadEntry::Error {
        message: message.to_string(),
    }
}
