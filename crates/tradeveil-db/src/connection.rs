//! Database connection management with `SQLCipher` encryption.
//!
//! The schedule/case store holds client identifying terms and raw evidence
//! blobs, so the file is encrypted at rest. The encryption key is zeroized
//! on drop.

use crate::error::{DatabaseError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Encrypted connection pool for the schedule/case store.
#[derive(Debug)]
pub struct StorePool {
    pool: Pool<Sqlite>,
    _key: Zeroizing<Vec<u8>>,
}

impl StorePool {
    /// Open (or create) the encrypted store at `path`.
    ///
    /// # Arguments
    /// * `path` - Path to the `SQLite` database file (or `:memory:` for tests)
    /// * `key` - 32-byte encryption key (zeroized on drop)
    ///
    /// # Errors
    /// Returns `DatabaseError` if the key has the wrong length, the file
    /// cannot be opened, or the `SQLCipher` pragmas fail.
    pub async fn open(path: impl AsRef<Path>, key: Vec<u8>) -> Result<Self> {
        if key.len() != 32 {
            return Err(DatabaseError::InvalidKey);
        }

        let key = Zeroizing::new(key);
        let path_str = path.as_ref().to_str().ok_or_else(|| {
            DatabaseError::Open("invalid database path: not valid UTF-8".to_string())
        })?;

        // SQLCipher expects hex keys wrapped as "x'..'"
        let key_hex = format!("\"x'{}'\"", hex::encode(&*key));
        let connect_options = SqliteConnectOptions::from_str(path_str)
            .map_err(|e| DatabaseError::Open(format!("invalid connection string: {e}")))?
            .pragma("key", key_hex)
            .pragma("cipher_page_size", "4096")
            .pragma("kdf_iter", "256000")
            .pragma("cipher_hmac_algorithm", "HMAC_SHA512")
            .pragma("cipher_kdf_algorithm", "PBKDF2_HMAC_SHA512")
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                DatabaseError::Encryption(format!("failed to initialize encrypted pool: {e}"))
            })?;

        tracing::info!("encrypted store opened at {}", path_str);

        Ok(Self { pool, _key: key })
    }

    /// Get a reference to the underlying `SQLx` pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Verify that the store is readable with the provided key.
    ///
    /// # Errors
    /// Returns `DatabaseError::InvalidKey` if the key is wrong or the file
    /// is corrupted.
    pub async fn verify_key(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|_| DatabaseError::InvalidKey)?;

        Ok(())
    }

    /// Close the connection pool gracefully.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("encrypted store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_pool_open() {
        let key = vec![0u8; 32];
        let pool = StorePool::open(":memory:", key)
            .await
            .expect("open store pool");

        pool.verify_key().await.expect("verify encryption key");
    }

    #[tokio::test]
    async fn test_invalid_key_length() {
        let short_key = vec![0u8; 16];
        let result = StorePool::open(":memory:", short_key).await;
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), DatabaseError::InvalidKey));
    }

    #[tokio::test]
    async fn test_pool_close() {
        let key = vec![0u8; 32];
        let pool = StorePool::open(":memory:", key)
            .await
            .expect("open store pool");

        pool.close().await; // Should not panic
    }
}
