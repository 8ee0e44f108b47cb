//! Tradeveil Notifier
//!
//! Emits case lifecycle events (new exposure, escalation, terminal states)
//! to pluggable sinks. Delivery is at-least-once: the outbox row is written
//! before any delivery attempt, failures are retried on later flushes, and
//! a failing sink never blocks the case transition that produced the event.
//! Consumers must be idempotent on `(case_id, state)`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod notifier;
pub mod sink;

pub use error::{NotifyError, Result};
pub use notifier::{CaseEvent, Notifier};
pub use sink::{LogSink, MemorySink, NotificationSink};
