//! Error types for the case management subsystem.

use crate::dispatch::DispatchError;
use thiserror::Error;

/// Errors that can occur in case management operations.
#[derive(Error, Debug)]
pub enum CaseError {
    /// Case storage error
    #[error("database error: {0}")]
    Database(#[from] tradeveil_db::DatabaseError),

    /// Takedown request dispatch error
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Case vanished between lookup and update
    #[error("case not found: {0}")]
    NotFound(String),
}

/// Result type for case management operations.
pub type Result<T> = std::result::Result<T, CaseError>;
