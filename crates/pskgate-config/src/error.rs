use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating a tunnel configuration.
///
/// Every variant means the configuration is unusable; callers should report it
/// and give up rather than retry.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field must not be empty: {0}")]
    EmptyField(&'static str),

    #[error("Port {field} out of range: {value} (expected 1-65535)")]
    PortOutOfRange { field: &'static str, value: i64 },
}
