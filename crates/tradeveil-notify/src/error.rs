//! Error types for the notification subsystem.

use thiserror::Error;

/// Errors that can occur in notification operations.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Outbox storage error
    #[error("database error: {0}")]
    Database(#[from] tradeveil_db::DatabaseError),

    /// A sink rejected or failed to deliver an event
    #[error("sink delivery failed: {0}")]
    Delivery(String),
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
