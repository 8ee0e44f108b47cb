//! Tradeveil Core - Foundation crate for the Tradeveil monitoring engine.
//!
//! This crate provides shared types, error handling and configuration
//! management that all other Tradeveil crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes (`ClientId`, `PlatformId`)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, GeneralConfig, NotificationConfig, ScanConfig, SchedulerConfig, TakedownConfig,
};
pub use error::{ConfigError, ConfigResult, Result, TradeveilError};
pub use types::{ClientId, PlatformId};
