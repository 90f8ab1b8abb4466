//! Errors raised while loading settings and installing the logging stack.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A settings section failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An environment variable was set but could not be parsed.
    #[error("Invalid {variable} '{value}': expected {expected}")]
    InvalidEnv {
        variable: &'static str,
        value: String,
        expected: &'static str,
    },

    /// A required setting is absent.
    #[error("Missing setting {setting}: {message}")]
    MissingSetting {
        setting: &'static str,
        message: String,
    },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
