//! Error types for the scheduling subsystem.

use thiserror::Error;

/// Errors that can occur in scheduling and engine operations.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Startup validation failure (fatal; the engine must not start)
    #[error("configuration error: {0}")]
    Config(String),

    /// Platform registry error
    #[error("platform error: {0}")]
    Platform(#[from] tradeveil_platform::PlatformError),

    /// Storage error
    #[error("database error: {0}")]
    Database(#[from] tradeveil_db::DatabaseError),

    /// Scan execution error
    #[error("scan error: {0}")]
    Scan(#[from] tradeveil_scanner::ScanError),

    /// Case management error
    #[error("case error: {0}")]
    Case(#[from] tradeveil_case::CaseError),

    /// Notification error
    #[error("notification error: {0}")]
    Notify(#[from] tradeveil_notify::NotifyError),

    /// Invalid identifier crossing the engine boundary
    #[error("validation error: {0}")]
    Validation(String),
}

/// Result type for scheduling operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;
