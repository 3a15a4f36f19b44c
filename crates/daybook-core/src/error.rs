//! Core error types for daybook-core.
//!
//! This module defines the error hierarchy using thiserror. Sync-specific
//! errors live next to the sync types in `sync::types`.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for daybook-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Notification delivery errors
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Journal append did not reach disk; the owning mutation must fail
    #[error("Journal append failed: {0}")]
    JournalAppendFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Validation errors raised before data reaches the engines.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Recurrence interval must be at least 1
    #[error("Recurrence interval must be positive (got {0})")]
    ZeroInterval(u32),

    /// Count-terminated rules need at least one occurrence
    #[error("Occurrence count must be positive")]
    ZeroCount,

    /// End date must come after the series anchor
    #[error("Recurrence end date {until} is not after anchor {anchor}")]
    UntilBeforeAnchor {
        anchor: chrono::NaiveDate,
        until: chrono::NaiveDate,
    },

    /// Custom interval-set rules need at least one constraint
    #[error("Interval-set rule has no weekday or day-of-month constraints")]
    EmptyIntervalSet,

    /// Invalid time range
    #[error("Invalid time range: end ({end}) must be greater than start ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Notification scheduling errors.
///
/// These are degraded-mode failures: they are logged and surfaced as a
/// warning but never block sync or data edits.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The platform refused further scheduled notifications
    #[error("Notification quota exceeded ({limit} pending)")]
    QuotaExceeded { limit: usize },

    /// The platform rejected a schedule/cancel command
    #[error("Notification service error: {0}")]
    Service(String),
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(DatabaseError::from(err))
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CoreError::Custom(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
