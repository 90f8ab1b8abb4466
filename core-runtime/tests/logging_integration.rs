//! Integration tests for logging initialization

use bridge_traits::time::LogLevel;
use core_runtime::config::AppConfig;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_runtime::Error;

// Only one global subscriber can be installed per process, so the whole
// initialization lifecycle lives in a single test.
#[test]
fn test_init_logging_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_thread_info(false);

    init_logging(config.clone()).unwrap();
    tracing::info!(user_id = "u-1", "Logging initialized");

    let second = init_logging(config);
    assert!(matches!(second, Err(Error::Logging(_))));
}

#[test]
fn test_logging_section_from_environment() {
    let config = AppConfig::from_lookup(|name| match name {
        "LOG_LEVEL" => Some("warning".to_string()),
        "LOG_FORMAT" => Some("json".to_string()),
        _ => None,
    })
    .unwrap();

    assert_eq!(config.logging.level, LogLevel::Warn);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_unknown_log_format_rejected() {
    let result = AppConfig::from_lookup(|name| {
        (name == "LOG_FORMAT").then(|| "yaml".to_string())
    });
    assert!(matches!(
        result,
        Err(Error::InvalidEnv {
            variable: "LOG_FORMAT",
            ..
        })
    ));
}
