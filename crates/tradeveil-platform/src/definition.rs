//! Platform definition types and structures.
//!
//! This module defines the data structures for monitored-platform definitions
//! loaded from TOML files.

use crate::error::{PlatformError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tradeveil_core::PlatformId;

/// Complete platform definition loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformDefinition {
    /// Core platform metadata
    pub platform: PlatformMetadata,
}

impl PlatformDefinition {
    /// Get the platform ID.
    #[must_use]
    pub fn id(&self) -> &PlatformId {
        &self.platform.id
    }

    /// Get the platform name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.platform.name
    }

    /// Get the platform kind.
    #[must_use]
    pub fn kind(&self) -> PlatformKind {
        self.platform.kind
    }

    /// Get the platform risk tier.
    #[must_use]
    pub fn risk_tier(&self) -> RiskTier {
        self.platform.risk_tier
    }

    /// Get the scanner adapter reference.
    #[must_use]
    pub fn scanner(&self) -> &str {
        &self.platform.scanner
    }

    /// Scan cadence for this platform.
    ///
    /// The tier default (`RiskTier::cadence_days`) applies unless the
    /// definition carries a per-platform override.
    #[must_use]
    pub fn cadence(&self) -> Duration {
        let days = self
            .platform
            .cadence_override_days
            .unwrap_or_else(|| self.platform.risk_tier.cadence_days());
        Duration::days(i64::from(days))
    }

    /// Validate the platform definition for completeness and correctness.
    pub fn validate(&self) -> Result<()> {
        if self.platform.name.is_empty() {
            return Err(PlatformError::ValidationError {
                platform_id: self.platform.id.to_string(),
                reason: "platform name cannot be empty".to_string(),
            });
        }

        if self.platform.url.is_empty() {
            return Err(PlatformError::ValidationError {
                platform_id: self.platform.id.to_string(),
                reason: "platform URL cannot be empty".to_string(),
            });
        }

        // A definition without a scanner reference can never be checked;
        // that is a configuration error, caught at startup.
        if self.platform.scanner.is_empty() {
            return Err(PlatformError::ValidationError {
                platform_id: self.platform.id.to_string(),
                reason: "platform scanner reference cannot be empty".to_string(),
            });
        }

        if let Some(days) = self.platform.cadence_override_days {
            if days == 0 || days > 365 {
                return Err(PlatformError::ValidationError {
                    platform_id: self.platform.id.to_string(),
                    reason: format!("cadence_override_days must be 1-365, got {days}"),
                });
            }
        }

        Ok(())
    }
}

/// Core platform metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformMetadata {
    /// Unique platform identifier (e.g., "importgenius", "panjiva")
    pub id: PlatformId,

    /// Human-readable platform name
    pub name: String,

    /// Platform website URL
    pub url: String,

    /// Platform kind (who publishes the data)
    pub kind: PlatformKind,

    /// Risk tier, drives the default scan cadence
    pub risk_tier: RiskTier,

    /// Per-platform cadence override in days
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cadence_override_days: Option<u32>,

    /// Reference to the scanner adapter that checks this platform
    pub scanner: String,
}

/// Kind of monitored platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformKind {
    /// Government customs-record publications and mirrors
    Government,
    /// Commercial trade-intelligence aggregators
    Commercial,
}

impl PlatformKind {
    /// Get a human-readable display name.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Government => "Government",
            Self::Commercial => "Commercial",
        }
    }
}

/// Risk tier of a monitored platform.
///
/// Higher tiers expose more sensitive shipment detail, or refresh their data
/// faster, and are scanned more frequently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    /// Fast-refreshing aggregators with full manifest detail
    VeryHigh,
    /// Broad commercial aggregators
    High,
    /// Slower mirrors and secondary indexes
    Medium,
    /// Rarely-updated archives
    Low,
}

impl RiskTier {
    /// Default scan cadence in days for this tier.
    #[must_use]
    pub fn cadence_days(&self) -> u32 {
        match self {
            Self::VeryHigh => 7,
            Self::High => 14,
            Self::Medium => 30,
            Self::Low => 90,
        }
    }
}
