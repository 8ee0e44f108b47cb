//! Shared types used across the Tradeveil engine.
//!
//! This module defines common newtypes that provide type safety and clear
//! domain modeling at the engine's API boundaries. The storage layer keeps
//! plain strings; these types validate at the edges.

use crate::error::TradeveilError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Newtype for client identifiers with validation.
///
/// Client IDs must be valid UUIDs (v4 format).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    /// Create a new `ClientId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID is not a valid UUID v4.
    pub fn new(id: impl Into<String>) -> Result<Self, TradeveilError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Create a new random `ClientId` using UUID v4.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate that a string is a valid UUID v4.
    fn validate(id: &str) -> Result<(), TradeveilError> {
        static UUID_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = UUID_REGEX.get_or_init(|| {
            Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
                .expect("valid regex")
        });

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(TradeveilError::Validation(format!(
                "invalid client ID: must be a valid UUID v4, got '{id}'"
            )))
        }
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype for monitored platform identifiers with validation.
///
/// Platform IDs must be lowercase alphanumeric with hyphens, 3-50 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformId(String);

impl PlatformId {
    /// Create a new `PlatformId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID doesn't match the required format.
    pub fn new(id: impl Into<String>) -> Result<Self, TradeveilError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate platform ID format: lowercase alphanumeric with hyphens, 3-50 chars.
    fn validate(id: &str) -> Result<(), TradeveilError> {
        static PLATFORM_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = PLATFORM_REGEX
            .get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,48}[a-z0-9]$").expect("valid regex"));

        if id.len() < 3 || id.len() > 50 {
            return Err(TradeveilError::Validation(format!(
                "invalid platform ID: must be 3-50 characters, got {} characters",
                id.len()
            )));
        }

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(TradeveilError::Validation(format!(
                "invalid platform ID: must be lowercase alphanumeric with hyphens, got '{id}'"
            )))
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
