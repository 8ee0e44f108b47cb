//! Takedown request dispatch seam.
//!
//! Generating the actual removal request (templated legal notice, web form,
//! registered letter) is an external collaborator's job; the engine only
//! tracks that a request went out and under which reference.

use async_trait::async_trait;
use thiserror::Error;

/// Errors a dispatcher implementation can report.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The platform rejected the removal request outright
    #[error("removal request rejected by {platform_id}: {reason}")]
    Rejected {
        /// Platform that rejected the request
        platform_id: String,
        /// Rejection reason
        reason: String,
    },

    /// The dispatch channel is temporarily unavailable
    #[error("takedown dispatcher unavailable: {0}")]
    Unavailable(String),
}

/// Submits removal requests to platforms.
///
/// One implementation per delivery channel. `submit` returns the platform's
/// (or channel's) reference for the request, which the case records for
/// follow-up.
#[async_trait]
pub trait TakedownDispatcher: Send + Sync {
    /// Submit a removal request for a case.
    async fn submit(
        &self,
        case_id: &str,
        platform_id: &str,
        evidence_ref: &str,
    ) -> std::result::Result<String, DispatchError>;
}
