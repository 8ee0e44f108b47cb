//! Tradeveil Scheduler
//!
//! Turns the platform registry and per-pair schedules into dispatched scan
//! work. The scheduler computes which (client, platform) pairs are due,
//! claims each one optimistically so no pair is ever scanned twice
//! concurrently, and feeds a bounded worker pool. The engine runner wires
//! every component together on a periodic tick: stale-claim recovery, case
//! timeout sweeps, removal-request submission, escalation retries,
//! notification flushing, then scan dispatch.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod runner;
pub mod scheduler;

pub use error::{Result, SchedulerError};
pub use runner::{EngineRunner, TickSummary};
pub use scheduler::ScanScheduler;
