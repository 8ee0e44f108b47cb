//! Error types for the scanning subsystem.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while running a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scan attempt exceeded its timeout
    #[error("scan of {platform_id} timed out after {timeout:?}")]
    Timeout {
        /// Platform being scanned
        platform_id: String,
        /// The per-attempt timeout that elapsed
        timeout: Duration,
    },

    /// The platform throttled the scan
    #[error("rate limited by {platform_id}")]
    RateLimited {
        /// Platform being scanned
        platform_id: String,
        /// Throttle hint from the platform, if it gave one
        retry_after: Option<Duration>,
    },

    /// The platform returned a server error or is unreachable
    #[error("platform {platform_id} unavailable (HTTP {http_status})")]
    PlatformUnavailable {
        /// Platform being scanned
        platform_id: String,
        /// HTTP status observed
        http_status: u16,
    },

    /// The adapter could not make sense of the platform's response.
    ///
    /// Distinct from "no exposure found": an ambiguous result must never be
    /// recorded as a clean scan.
    #[error("malformed response from {platform_id}: {reason}")]
    MalformedResponse {
        /// Platform being scanned
        platform_id: String,
        /// What the adapter couldn't parse
        reason: String,
    },

    /// No adapter registered for a platform's scanner reference
    #[error("no scanner adapter registered for '{scanner_ref}'")]
    MissingScanner {
        /// The unresolved scanner reference
        scanner_ref: String,
    },

    /// No identifying terms registered for a client
    #[error("no identifying terms registered for client {client_id}")]
    UnknownClient {
        /// Client without terms
        client_id: String,
    },

    /// Storage error
    #[error("database error: {0}")]
    Database(#[from] tradeveil_db::DatabaseError),

    /// Case handoff error
    #[error("case error: {0}")]
    Case(#[from] tradeveil_case::CaseError),
}

impl ScanError {
    /// Whether this failure is worth retrying with backoff.
    ///
    /// Timeouts, throttling, platform outages and contract violations are
    /// all transient: the platform may behave next time. Configuration and
    /// storage faults are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::RateLimited { .. }
                | Self::PlatformUnavailable { .. }
                | Self::MalformedResponse { .. }
        )
    }
}

/// Result type for scanning operations.
pub type Result<T> = std::result::Result<T, ScanError>;
