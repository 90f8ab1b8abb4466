//! # Core Configuration Module
//!
//! Typed configuration for the ingestion workers.
//!
//! ## Overview
//!
//! [`AppConfig`] aggregates one section per concern. Every section has a
//! `Default` matching production values, `with_*` builders for overrides and
//! a `validate()` that fails fast with [`Error::Config`]:
//!
//! - [`GarminSettings`] - upstream client config and download directories
//! - [`EncryptionSettings`] - symmetric key used to decrypt stored credentials
//! - [`SyncSettings`] - incremental sync window and workflow limits
//! - [`TaskSettings`] - queue routing and per-task time/retry limits
//! - [`MonitorSettings`] - lifecycle monitor windows and thresholds
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::AppConfig;
//!
//! // Reads GARMIN_* and LOG_* variables, validates, fails fast.
//! let config = AppConfig::from_env()?;
//! let limits = config.tasks.limits_for("garmin.download_daily_data");
//! assert_eq!(limits.max_retries, 3);
//! ```
//!
//! ## Environment
//!
//! | Variable                    | Section                         |
//! |-----------------------------|---------------------------------|
//! | `GARMIN_CONFIG_DIR`         | `garmin.config_dir`             |
//! | `GARMIN_DATA_DIR`           | `garmin.data_dir`               |
//! | `GARMIN_ENCRYPTION_KEY`     | `encryption.key_b64`            |
//! | `GARMIN_ENCRYPTION_VERSION` | `encryption.version` (default 1)|
//! | `LOG_LEVEL` / `LOG_FORMAT`  | `logging`                       |

use crate::error::{Error, Result};
use crate::logging::{LogFormat, LoggingConfig};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::time::LogLevel;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Length in bytes of the AES-256 credential key.
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// Queue used when no route pattern matches.
pub const DEFAULT_QUEUE: &str = "default";

/// Task name the sync workflow registers under.
pub const WORKFLOW_TASK_NAME: &str = "workflows.garmin_sync";

// ============================================================================
// Application Config
// ============================================================================

/// Complete worker configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub garmin: GarminSettings,
    pub encryption: EncryptionSettings,
    pub sync: SyncSettings,
    pub tasks: TaskSettings,
    pub monitor: MonitorSettings,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Build from process environment variables and validate.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup and validate.
    ///
    /// Missing variables fall back to defaults; present but malformed ones
    /// are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("GARMIN_CONFIG_DIR") {
            config.garmin.config_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("GARMIN_DATA_DIR") {
            config.garmin.data_dir = PathBuf::from(dir);
        }

        if let Some(key) = lookup("GARMIN_ENCRYPTION_KEY") {
            config.encryption.key_b64 = Some(key);
        }
        if let Some(version) = lookup("GARMIN_ENCRYPTION_VERSION") {
            config.encryption.version =
                version.trim().parse().map_err(|_| Error::InvalidEnv {
                    variable: "GARMIN_ENCRYPTION_VERSION",
                    value: version.clone(),
                    expected: "an unsigned integer",
                })?;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            let level = LogLevel::parse(&level).ok_or_else(|| Error::InvalidEnv {
                variable: "LOG_LEVEL",
                value: level.clone(),
                expected: "trace, debug, info, warning or error",
            })?;
            config.logging = config.logging.with_level(level);
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            let format = LogFormat::parse(&format).ok_or_else(|| Error::InvalidEnv {
                variable: "LOG_FORMAT",
                value: format.clone(),
                expected: "pretty, json or compact",
            })?;
            config.logging = config.logging.with_format(format);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_garmin(mut self, garmin: GarminSettings) -> Self {
        self.garmin = garmin;
        self
    }

    pub fn with_encryption(mut self, encryption: EncryptionSettings) -> Self {
        self.encryption = encryption;
        self
    }

    pub fn with_sync(mut self, sync: SyncSettings) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_tasks(mut self, tasks: TaskSettings) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_monitor(mut self, monitor: MonitorSettings) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Limits the runner applies to the sync workflow task.
    pub fn workflow_limits(&self) -> TaskLimits {
        let time_limit = self.sync.workflow_time_limit_secs;
        TaskLimits {
            time_limit_secs: time_limit,
            soft_time_limit_secs: time_limit.saturating_sub(300).max(1),
            retry_delay_secs: 60,
            max_retries: self.sync.workflow_max_retries,
        }
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.garmin.validate()?;
        self.encryption.validate()?;
        self.sync.validate()?;
        self.tasks.validate()?;
        self.monitor.validate()?;
        Ok(())
    }
}

// ============================================================================
// Garmin Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GarminSettings {
    /// Per-user upstream client configuration lives under `<config_dir>/<user_id>`.
    pub config_dir: PathBuf,
    /// Downloaded files land in `<data_dir>/<user_id>/downloads`.
    pub data_dir: PathBuf,
}

impl Default for GarminSettings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("storage/garmin"),
            data_dir: PathBuf::from("storage/garmin"),
        }
    }
}

impl GarminSettings {
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn user_config_dir(&self, user_id: &str) -> PathBuf {
        self.config_dir.join(user_id)
    }

    pub fn user_data_dir(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(user_id)
    }

    pub fn user_download_dir(&self, user_id: &str) -> PathBuf {
        self.user_data_dir(user_id).join("downloads")
    }

    pub fn validate(&self) -> Result<()> {
        if is_empty_path(&self.config_dir) {
            return Err(Error::Config(
                "Garmin config directory cannot be empty".to_string(),
            ));
        }
        if is_empty_path(&self.data_dir) {
            return Err(Error::Config(
                "Garmin data directory cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_empty_path(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

// ============================================================================
// Encryption Settings
// ============================================================================

/// Symmetric key material for stored credentials.
///
/// The key is optional at configuration time so that processes which never
/// resolve credentials (e.g. a metrics exporter) can start without it.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionSettings {
    /// Base64-encoded 32-byte key.
    pub key_b64: Option<String>,
    /// Version byte prefix written by the provisioning side.
    pub version: u32,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            key_b64: None,
            version: 1,
        }
    }
}

impl fmt::Debug for EncryptionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionSettings")
            .field("key_b64", &self.key_b64.as_ref().map(|_| "[REDACTED]"))
            .field("version", &self.version)
            .finish()
    }
}

impl EncryptionSettings {
    pub fn new(key_b64: impl Into<String>) -> Self {
        Self {
            key_b64: Some(key_b64.into()),
            version: 1,
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Decode the key, failing when it is missing or malformed.
    pub fn key_bytes(&self) -> Result<Vec<u8>> {
        let encoded = self.key_b64.as_deref().ok_or_else(|| Error::MissingSetting {
            setting: "GARMIN_ENCRYPTION_KEY",
            message: "Encryption key is required to decrypt stored Garmin credentials"
                .to_string(),
        })?;

        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| Error::Config("Encryption key is not valid base64".to_string()))?;

        if bytes.len() != ENCRYPTION_KEY_LEN {
            return Err(Error::Config(format!(
                "Encryption key must be {} bytes, got {}",
                ENCRYPTION_KEY_LEN,
                bytes.len()
            )));
        }

        Ok(bytes)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version == 0 {
            return Err(Error::Config(
                "Encryption version must be greater than 0".to_string(),
            ));
        }
        if self.key_b64.is_some() {
            self.key_bytes()?;
        }
        Ok(())
    }
}

// ============================================================================
// Sync Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Window used when the caller does not pass one.
    pub default_window_days: u32,
    /// Upper bound on the existing-ID query.
    pub existing_ids_limit: usize,
    pub workflow_time_limit_secs: u64,
    pub workflow_max_retries: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            default_window_days: 30,
            existing_ids_limit: 10_000,
            workflow_time_limit_secs: 3600,
            workflow_max_retries: 1,
        }
    }
}

impl SyncSettings {
    pub fn with_default_window_days(mut self, days: u32) -> Self {
        self.default_window_days = days;
        self
    }

    pub fn with_existing_ids_limit(mut self, limit: usize) -> Self {
        self.existing_ids_limit = limit;
        self
    }

    pub fn with_workflow_time_limit_secs(mut self, secs: u64) -> Self {
        self.workflow_time_limit_secs = secs;
        self
    }

    pub fn with_workflow_max_retries(mut self, retries: u32) -> Self {
        self.workflow_max_retries = retries;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_window_days == 0 {
            return Err(Error::Config(
                "Default sync window must be at least 1 day".to_string(),
            ));
        }
        if self.existing_ids_limit == 0 {
            return Err(Error::Config(
                "Existing ID query limit must be greater than 0".to_string(),
            ));
        }
        if self.workflow_time_limit_secs == 0 {
            return Err(Error::Config(
                "Workflow time limit must be greater than 0 seconds".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Task Settings
// ============================================================================

/// Wall-clock and retry limits for one task category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskLimits {
    /// Hard limit enforced by the runner.
    pub time_limit_secs: u64,
    /// Advisory limit; the runner logs a warning when exceeded.
    pub soft_time_limit_secs: u64,
    /// Base delay before the first retry.
    pub retry_delay_secs: u64,
    pub max_retries: u32,
}

impl TaskLimits {
    pub const fn new(
        time_limit_secs: u64,
        soft_time_limit_secs: u64,
        retry_delay_secs: u64,
        max_retries: u32,
    ) -> Self {
        Self {
            time_limit_secs,
            soft_time_limit_secs,
            retry_delay_secs,
            max_retries,
        }
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }

    pub fn soft_time_limit(&self) -> Duration {
        Duration::from_secs(self.soft_time_limit_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    fn validate(&self, task_name: &str) -> Result<()> {
        if self.time_limit_secs == 0 {
            return Err(Error::Config(format!(
                "Time limit for '{}' must be greater than 0 seconds",
                task_name
            )));
        }
        if self.soft_time_limit_secs > self.time_limit_secs {
            return Err(Error::Config(format!(
                "Soft time limit for '{}' exceeds its hard limit",
                task_name
            )));
        }
        Ok(())
    }
}

impl Default for TaskLimits {
    fn default() -> Self {
        Self::new(600, 300, 60, 3)
    }
}

/// Ordered task-name pattern to queue table.
///
/// Patterns are either exact task names or prefixes ending in `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRoutes {
    routes: Vec<(String, String)>,
    /// Task modules published to the worker runtime.
    pub include: Vec<String>,
}

impl Default for QueueRoutes {
    fn default() -> Self {
        Self {
            routes: vec![
                ("garmin.*".to_string(), "garmin".to_string()),
                ("processing.*".to_string(), "processing".to_string()),
                ("storage.*".to_string(), "storage".to_string()),
                ("workflows.*".to_string(), "workflows".to_string()),
            ],
            include: vec![
                "garmin".to_string(),
                "processing".to_string(),
                "storage".to_string(),
                "workflows".to_string(),
            ],
        }
    }
}

impl QueueRoutes {
    /// An empty table; every task routes to [`DEFAULT_QUEUE`].
    pub fn empty() -> Self {
        Self {
            routes: Vec::new(),
            include: Vec::new(),
        }
    }

    /// Append a route. Earlier routes win.
    pub fn with_route(mut self, pattern: impl Into<String>, queue: impl Into<String>) -> Self {
        self.routes.push((pattern.into(), queue.into()));
        self
    }

    /// Queue a task is published to.
    pub fn route(&self, task_name: &str) -> &str {
        self.routes
            .iter()
            .find(|(pattern, _)| pattern_matches(pattern, task_name))
            .map(|(_, queue)| queue.as_str())
            .unwrap_or(DEFAULT_QUEUE)
    }

    /// Whether the module prefix of `task_name` is published.
    pub fn is_included(&self, task_name: &str) -> bool {
        let module = task_name.split('.').next().unwrap_or(task_name);
        self.include.iter().any(|m| m == module)
    }
}

fn pattern_matches(pattern: &str, task_name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => task_name.starts_with(prefix),
        None => pattern == task_name,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    pub routes: QueueRoutes,
    pub limits: HashMap<String, TaskLimits>,
    /// Applied to tasks without an entry in `limits`.
    pub default_limits: TaskLimits,
}

impl Default for TaskSettings {
    fn default() -> Self {
        let limits = [
            ("garmin.download_daily_data", TaskLimits::new(1800, 1500, 60, 3)),
            ("processing.process_activity_file", TaskLimits::new(300, 240, 30, 2)),
            ("processing.process_health_file", TaskLimits::new(300, 240, 30, 2)),
            ("processing.process_file_batch", TaskLimits::new(1800, 1500, 60, 2)),
            ("processing.validate_processed_data", TaskLimits::new(120, 90, 15, 3)),
        ]
        .into_iter()
        .map(|(name, limits)| (name.to_string(), limits))
        .collect();

        Self {
            routes: QueueRoutes::default(),
            limits,
            default_limits: TaskLimits::default(),
        }
    }
}

impl TaskSettings {
    pub fn with_routes(mut self, routes: QueueRoutes) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_limits(mut self, task_name: impl Into<String>, limits: TaskLimits) -> Self {
        self.limits.insert(task_name.into(), limits);
        self
    }

    pub fn limits_for(&self, task_name: &str) -> TaskLimits {
        self.limits
            .get(task_name)
            .copied()
            .unwrap_or(self.default_limits)
    }

    pub fn validate(&self) -> Result<()> {
        self.default_limits.validate("default")?;
        for (name, limits) in &self.limits {
            limits.validate(name)?;
        }
        Ok(())
    }
}

// ============================================================================
// Monitor Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    /// Most recent metric samples kept.
    pub metrics_window: usize,
    /// Most recent alerts kept.
    pub alert_window: usize,
    /// Alerts included in a health snapshot.
    pub recent_alerts: usize,
    /// Error rate above which a health check raises an alert.
    pub error_rate_alert_threshold: f64,
    /// Error rate at or above which the health endpoint reports 503.
    pub healthy_error_rate: f64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            metrics_window: 1000,
            alert_window: 100,
            recent_alerts: 10,
            error_rate_alert_threshold: 0.1,
            healthy_error_rate: 0.2,
        }
    }
}

impl MonitorSettings {
    pub fn with_metrics_window(mut self, window: usize) -> Self {
        self.metrics_window = window;
        self
    }

    pub fn with_alert_window(mut self, window: usize) -> Self {
        self.alert_window = window;
        self
    }

    pub fn with_error_rate_alert_threshold(mut self, threshold: f64) -> Self {
        self.error_rate_alert_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.metrics_window == 0 || self.alert_window == 0 {
            return Err(Error::Config(
                "Monitor windows must hold at least one entry".to_string(),
            ));
        }
        for (name, rate) in [
            ("error_rate_alert_threshold", self.error_rate_alert_threshold),
            ("healthy_error_rate", self.healthy_error_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(Error::Config(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, rate
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> String {
        STANDARD.encode([7u8; ENCRYPTION_KEY_LEN])
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.default_window_days, 30);
        assert_eq!(config.sync.existing_ids_limit, 10_000);
        assert_eq!(config.monitor.metrics_window, 1000);
        assert_eq!(config.monitor.alert_window, 100);
    }

    #[test]
    fn test_from_lookup_reads_variables() {
        let key = test_key();
        let config = AppConfig::from_lookup(lookup_from(&[
            ("GARMIN_DATA_DIR", "/data/garmin"),
            ("GARMIN_ENCRYPTION_KEY", key.as_str()),
            ("GARMIN_ENCRYPTION_VERSION", "1"),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.garmin.data_dir, PathBuf::from("/data/garmin"));
        assert_eq!(
            config.garmin.user_download_dir("u-1"),
            PathBuf::from("/data/garmin/u-1/downloads")
        );
        assert_eq!(config.encryption.key_bytes().unwrap().len(), 32);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_bad_version_fails_fast() {
        let result = AppConfig::from_lookup(lookup_from(&[("GARMIN_ENCRYPTION_VERSION", "two")]));
        assert!(matches!(
            result,
            Err(Error::InvalidEnv {
                variable: "GARMIN_ENCRYPTION_VERSION",
                ..
            })
        ));
    }

    #[test]
    fn test_short_key_rejected() {
        let short = STANDARD.encode([1u8; 16]);
        let settings = EncryptionSettings::new(short);
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn test_missing_key_is_missing_setting() {
        let settings = EncryptionSettings::default();
        assert!(matches!(
            settings.key_bytes(),
            Err(Error::MissingSetting {
                setting: "GARMIN_ENCRYPTION_KEY",
                ..
            })
        ));
    }

    #[test]
    fn test_encryption_debug_redacts_key() {
        let settings = EncryptionSettings::new(test_key());
        let rendered = format!("{:?}", settings);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains(&test_key()));
    }

    #[test]
    fn test_queue_routing() {
        let routes = QueueRoutes::default();
        assert_eq!(routes.route("garmin.download_daily_data"), "garmin");
        assert_eq!(routes.route("processing.process_file_batch"), "processing");
        assert_eq!(routes.route("workflows.garmin_sync"), "workflows");
        assert_eq!(routes.route("maintenance.cleanup"), DEFAULT_QUEUE);

        let custom = QueueRoutes::empty()
            .with_route("garmin.download_daily_data", "slow")
            .with_route("garmin.*", "garmin");
        assert_eq!(custom.route("garmin.download_daily_data"), "slow");
        assert_eq!(custom.route("garmin.other"), "garmin");
    }

    #[test]
    fn test_included_modules() {
        let routes = QueueRoutes::default();
        assert!(routes.is_included("processing.process_health_file"));
        assert!(!routes.is_included("maintenance.cleanup"));
    }

    #[test]
    fn test_task_limits() {
        let tasks = TaskSettings::default();
        let download = tasks.limits_for("garmin.download_daily_data");
        assert_eq!(download, TaskLimits::new(1800, 1500, 60, 3));

        let validate = tasks.limits_for("processing.validate_processed_data");
        assert_eq!(validate.max_retries, 3);
        assert_eq!(validate.retry_delay(), Duration::from_secs(15));

        assert_eq!(tasks.limits_for("unknown.task"), TaskLimits::default());
    }

    #[test]
    fn test_soft_limit_above_hard_limit_rejected() {
        let tasks = TaskSettings::default().with_limits("x", TaskLimits::new(10, 20, 1, 1));
        assert!(tasks.validate().is_err());
    }

    #[test]
    fn test_workflow_limits() {
        let config = AppConfig::default();
        let limits = config.workflow_limits();
        assert_eq!(limits.time_limit_secs, 3600);
        assert_eq!(limits.max_retries, 1);
    }

    #[test]
    fn test_monitor_threshold_range() {
        let monitor = MonitorSettings::default().with_error_rate_alert_threshold(1.5);
        assert!(monitor.validate().is_err());
    }
}
