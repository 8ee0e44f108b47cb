//! Outbox-backed event notifier.

use crate::error::Result;
use crate::sink::NotificationSink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use tradeveil_db::{notifications, CaseState, Database, NotificationRecord, TakedownCase};

/// A case lifecycle event as delivered to sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseEvent {
    /// Case that changed state
    pub case_id: String,
    /// Client the case belongs to
    pub client_id: String,
    /// Platform the case targets
    pub platform_id: String,
    /// Case state being announced
    pub state: CaseState,
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
}

impl From<&NotificationRecord> for CaseEvent {
    fn from(record: &NotificationRecord) -> Self {
        Self {
            case_id: record.case_id.clone(),
            client_id: record.client_id.clone(),
            platform_id: record.platform_id.clone(),
            state: record.state,
            timestamp: record.created_at,
        }
    }
}

/// Emits case events to the configured sinks through a persistent outbox.
///
/// The outbox row is authoritative; sink delivery is best-effort and never
/// fails the caller. Undelivered rows are retried by [`Notifier::flush_pending`]
/// on the scheduler tick.
pub struct Notifier {
    db: Arc<Database>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    max_delivery_attempts: u32,
}

impl Notifier {
    /// Create a notifier over the given sinks.
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        sinks: Vec<Arc<dyn NotificationSink>>,
        max_delivery_attempts: u32,
    ) -> Self {
        Self {
            db,
            sinks,
            max_delivery_attempts,
        }
    }

    /// Announce a case's current state.
    ///
    /// Writes the outbox row first, then attempts delivery. A duplicate
    /// `(case_id, state)` announcement is a no-op; a sink failure leaves the
    /// row pending for redelivery and still returns `Ok`.
    ///
    /// # Errors
    /// Returns error only if the outbox row cannot be written — the case
    /// record is authoritative, so a notification that cannot even be queued
    /// is a storage fault worth surfacing.
    pub async fn notify(&self, case: &TakedownCase) -> Result<()> {
        let record = notifications::enqueue(
            self.db.pool(),
            &case.id,
            &case.client_id,
            &case.platform_id,
            case.state,
            Utc::now(),
        )
        .await?;

        match record {
            Some(record) => {
                self.dispatch(&record).await;
            }
            None => {
                debug!(
                    case_id = %case.id,
                    state = %case.state,
                    "notification already queued for this case state"
                );
            }
        }

        Ok(())
    }

    /// Retry delivery of pending outbox rows, oldest first.
    ///
    /// Returns the number of rows delivered on this pass.
    ///
    /// # Errors
    /// Returns error if the outbox cannot be read.
    pub async fn flush_pending(&self) -> Result<u32> {
        let pending =
            notifications::undelivered(self.db.pool(), self.max_delivery_attempts, 50).await?;

        let mut delivered = 0;
        for record in &pending {
            if self.dispatch(record).await {
                delivered += 1;
            }
        }

        if delivered > 0 {
            debug!(delivered, "flushed pending notifications");
        }

        Ok(delivered)
    }

    /// Deliver one outbox row to every sink. Returns whether all sinks
    /// accepted the event.
    async fn dispatch(&self, record: &NotificationRecord) -> bool {
        let event = CaseEvent::from(record);
        let mut failures = Vec::new();

        for sink in &self.sinks {
            if let Err(e) = sink.deliver(&event).await {
                warn!(
                    sink = sink.name(),
                    case_id = %event.case_id,
                    state = %event.state,
                    error = %e,
                    "notification delivery failed"
                );
                failures.push(format!("{}: {e}", sink.name()));
            }
        }

        let outcome = if failures.is_empty() {
            notifications::mark_delivered(self.db.pool(), &record.id, Utc::now()).await
        } else {
            notifications::mark_failed(self.db.pool(), &record.id, &failures.join("; ")).await
        };

        // Delivery bookkeeping is itself best-effort; a pending row just
        // gets retried on the next flush.
        if let Err(e) = outcome {
            warn!(
                notification_id = %record.id,
                error = %e,
                "failed to update notification outbox"
            );
        }

        failures.is_empty()
    }
}
