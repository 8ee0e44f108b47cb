//! Notification sink implementations.

use crate::error::{NotifyError, Result};
use crate::notifier::CaseEvent;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::info;

/// A delivery channel for case events.
///
/// One implementation per channel (log line, dashboard feed, email relay,
/// webhook). Implementations must tolerate duplicate deliveries of the same
/// `(case_id, state)` pair.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Human-readable sink name, used in delivery error messages.
    fn name(&self) -> &str;

    /// Deliver one event.
    async fn deliver(&self, event: &CaseEvent) -> Result<()>;
}

/// Sink that writes events to the tracing log.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &CaseEvent) -> Result<()> {
        info!(
            case_id = %event.case_id,
            client_id = %event.client_id,
            platform_id = %event.platform_id,
            state = %event.state,
            "takedown case event"
        );
        Ok(())
    }
}

/// Sink that buffers events in memory.
///
/// Backs in-process consumers (the dashboard's live event feed) and test
/// assertions.
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<CaseEvent>>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events delivered so far.
    #[must_use]
    pub fn events(&self) -> Vec<CaseEvent> {
        self.events.lock().expect("lock event buffer").clone()
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn deliver(&self, event: &CaseEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| NotifyError::Delivery("event buffer poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}
