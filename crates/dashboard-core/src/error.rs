use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the dashboard core.
#[derive(Error, Debug)]
pub enum DashboardError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A calendar date string was not in `YYYY-MM-DD` form.
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// A month string was not in `YYYY-MM` form or the month was out of range.
    #[error("Invalid month: {0}")]
    InvalidMonth(String),

    /// A username does not match the Chess.com username rules.
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// A date range whose start lies after its end.
    #[error("Invalid range: {start} is after {end}")]
    InvalidRange { start: String, end: String },

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the dashboard crates.
pub type Result<T> = std::result::Result<T, DashboardError>;
