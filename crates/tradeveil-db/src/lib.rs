//! Tradeveil Persistence Layer
//!
//! `SQLite` storage with `SQLCipher` encryption for the schedule/case store —
//! the single source of truth the scheduler, executor and case manager all
//! mutate through the claim-then-update pattern.
//!
//! # Architecture
//!
//! - **Encryption**: client terms and evidence blobs are encrypted at rest
//!   (`SQLCipher`, `AES-256`), key zeroized on drop
//! - **Migrations**: SQL migrations are embedded and versioned using `SQLx`
//! - **Row modules**: one module per table family — [`schedules`],
//!   [`checks`], [`cases`], [`notifications`]
//! - **Reporting**: [`reporting`] holds the read-only dashboard projections
//!
//! # Example
//!
//! ```ignore
//! use tradeveil_db::Database;
//!
//! let key = vec![0u8; 32]; // In practice, from config/environment
//! let db = Database::open("tradeveil.db", key).await?;
//! db.run_migrations().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod cases;
pub mod checks;
pub mod connection;
pub mod error;
pub mod migrations;
pub mod notifications;
pub mod reporting;
pub mod schedules;

// Re-export commonly used types
pub use cases::{CaseState, CaseTransition, TakedownCase};
pub use checks::{AnonymityCheck, NewCheck};
pub use connection::StorePool;
pub use error::{DatabaseError, Result};
pub use notifications::NotificationRecord;
pub use schedules::{ScanSchedule, ScheduleStatus};

use std::path::Path;

/// High-level database interface with encryption and migrations.
///
/// Convenience wrapper around [`StorePool`] that handles initialization and
/// migration in one place.
#[derive(Debug)]
pub struct Database {
    pool: StorePool,
}

impl Database {
    /// Open the encrypted store at `path`.
    ///
    /// The encryption key must be exactly 32 bytes.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the store cannot be opened or the key is
    /// invalid.
    pub async fn open(path: impl AsRef<Path>, key: Vec<u8>) -> Result<Self> {
        let pool = StorePool::open(path, key).await?;
        Ok(Self { pool })
    }

    /// Run all pending database migrations.
    ///
    /// Call after opening to ensure the schema is up to date.
    ///
    /// # Errors
    /// Returns `DatabaseError::Migration` if any migration fails.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(self.pool.pool()).await
    }

    /// Get the current schema version (highest applied migration).
    ///
    /// # Errors
    /// Returns `DatabaseError` if the version cannot be queried.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(self.pool.pool()).await
    }

    /// Get a reference to the underlying connection pool.
    ///
    /// This allows direct access to the `SQLx` pool for queries.
    #[must_use]
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        self.pool.pool()
    }

    /// Verify that the store is readable with the provided key.
    ///
    /// # Errors
    /// Returns `DatabaseError::InvalidKey` if the key is incorrect.
    pub async fn verify_key(&self) -> Result<()> {
        self.pool.verify_key().await
    }

    /// Close the database connection gracefully.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
