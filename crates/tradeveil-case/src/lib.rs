//! Tradeveil Case Manager
//!
//! Owns the takedown case lifecycle: cases open when a scan finds exposure,
//! removal requests go out through the [`dispatch::TakedownDispatcher`]
//! seam, stalled cases escalate instead of aging unnoticed, follow-up scans
//! verify removal, and submission retries are bounded. The state machine
//! itself (states, allowed transitions, history) lives with the rows in
//! `tradeveil-db::cases`; this crate drives it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod dispatch;
pub mod error;
pub mod manager;

pub use dispatch::{DispatchError, TakedownDispatcher};
pub use error::{CaseError, Result};
pub use manager::CaseManager;
