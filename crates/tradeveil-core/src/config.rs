//! Configuration management for Tradeveil.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main engine configuration.
///
/// This is loaded from `~/.config/tradeveil/config.toml` (or platform
/// equivalent). If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Scan scheduling settings
    pub scheduler: SchedulerConfig,
    /// Scan execution settings
    pub scan: ScanConfig,
    /// Takedown case lifecycle settings
    pub takedown: TakedownConfig,
    /// Notification delivery settings
    pub notifications: NotificationConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(&config_path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `TRADEVEIL_TICK_INTERVAL_SECS`: Override scheduler tick interval
    /// - `TRADEVEIL_SCAN_TIMEOUT_SECS`: Override per-attempt scan timeout
    /// - `TRADEVEIL_RESPONSE_TIMEOUT_DAYS`: Override takedown response window
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;

        if let Ok(val) = std::env::var("TRADEVEIL_TICK_INTERVAL_SECS") {
            if let Ok(secs) = val.parse() {
                config.scheduler.tick_interval_secs = secs;
                tracing::debug!("Override tick_interval_secs from env: {}", secs);
            }
        }

        if let Ok(val) = std::env::var("TRADEVEIL_SCAN_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.scan.attempt_timeout_secs = secs;
                tracing::debug!("Override attempt_timeout_secs from env: {}", secs);
            }
        }

        if let Ok(val) = std::env::var("TRADEVEIL_RESPONSE_TIMEOUT_DAYS") {
            if let Ok(days) = val.parse() {
                config.takedown.response_timeout_days = days;
                tracing::debug!("Override response_timeout_days from env: {}", days);
            }
        }

        Ok(config)
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/tradeveil/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "tradeveil", "tradeveil").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/tradeveil`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "tradeveil", "tradeveil").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

/// General settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Path to the schedule/case store (defaults to the XDG data dir)
    pub database_path: Option<PathBuf>,
    /// Directory holding platform definition TOML files
    pub platform_definitions_dir: Option<PathBuf>,
}

/// Scan scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks
    pub tick_interval_secs: u64,
    /// Global worker pool size (concurrent scans across all platforms)
    pub max_concurrent_scans: usize,
    /// Max in-flight scans against any single platform
    pub per_platform_inflight: usize,
    /// Minutes after which an unreleased claim is considered abandoned
    pub claim_lease_minutes: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            max_concurrent_scans: 4,
            per_platform_inflight: 2,
            claim_lease_minutes: 30,
        }
    }
}

/// Scan execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Per-attempt scan timeout in seconds
    pub attempt_timeout_secs: u64,
    /// Consecutive transient failures before a schedule flips to Alert
    pub failure_alert_threshold: u32,
    /// Cap on the backoff exponent (delay = cadence * 2^min(failures, cap))
    pub backoff_exponent_cap: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 30,
            failure_alert_threshold: 5,
            backoff_exponent_cap: 5,
        }
    }
}

/// Takedown case lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TakedownConfig {
    /// Days a case may sit in PendingResponse before escalating
    pub response_timeout_days: u32,
    /// Max removal-request submissions before a case fails permanently
    pub max_submission_attempts: u32,
}

impl Default for TakedownConfig {
    fn default() -> Self {
        Self {
            response_timeout_days: 30,
            max_submission_attempts: 3,
        }
    }
}

/// Notification delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Max delivery attempts before an outbox row stops being retried
    pub max_delivery_attempts: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_delivery_attempts: 5,
        }
    }
}
