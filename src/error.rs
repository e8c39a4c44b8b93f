//! Error types for Sleepwave

use thiserror::Error;

/// Errors that can occur while analyzing sleep or talking to collaborators
#[derive(Debug, Error)]
pub enum SleepError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Event source error: {0}")]
    Source(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Sleep analysis already in progress")]
    AnalysisInProgress,
}

/// Manual episode entry rejections.
///
/// Each variant carries a fixed, user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Cannot select future dates or times")]
    FutureDateTime,

    #[error("End time cannot be before start time")]
    EndBeforeStart,

    #[error("Sleep period cannot be longer than 24 hours")]
    TooLong,

    #[error("Sleep period overlaps with existing period")]
    Overlap,
}

/// Settings rejected at the configuration boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be between 0 and 23, got {value}")]
    InvalidHour { field: &'static str, value: u32 },

    #[error("Needed sleep hours must be between 0 and 24, got {0}")]
    InvalidNeededSleep(f64),

    #[error("Tau must be positive, got {0}")]
    InvalidTau(f64),

    #[error("{0} must be greater than zero")]
    InvalidThreshold(&'static str),
}

/// Errors raised by episode storage
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Sleep episode {0} not found")]
    NotFound(i64),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Store serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
