//! Error types for the persistence layer.

use thiserror::Error;

/// Errors that can occur in database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open the database
    #[error("failed to open database: {0}")]
    Open(String),

    /// Encryption layer failure (bad pragmas, pool init)
    #[error("database encryption error: {0}")]
    Encryption(String),

    /// Encryption key is missing, malformed or wrong
    #[error("invalid database encryption key")]
    InvalidKey,

    /// Migration failure
    #[error("database migration error: {0}")]
    Migration(String),

    /// Failed to decode a stored value
    #[error("failed to decode stored value: {0}")]
    Decode(String),

    /// Row not found
    #[error("not found: {0}")]
    NotFound(String),

    /// An open takedown case already exists for the (client, platform) pair
    #[error("open takedown case already exists for client {client_id} on {platform_id}")]
    OpenCaseExists {
        /// Client whose case collided
        client_id: String,
        /// Platform the case targets
        platform_id: String,
    },

    /// A case transition was rejected (disallowed or lost a race)
    #[error("invalid case transition for {case_id}: {from} -> {to}")]
    InvalidTransition {
        /// Case being transitioned
        case_id: String,
        /// Expected current state
        from: String,
        /// Requested next state
        to: String,
    },

    /// Underlying sqlx error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
