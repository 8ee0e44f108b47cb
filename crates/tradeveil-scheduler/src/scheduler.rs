//! Due-item planning under concurrency budgets.

use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use tradeveil_db::{schedules, Database, ScanSchedule};

/// Computes the batch of schedules to dispatch on a tick.
///
/// The global worker pool bound lives with the runner; this type enforces
/// the per-platform in-flight cap — a politeness control so one platform is
/// never hit by many clients' scans at once, not an optimization.
pub struct ScanScheduler {
    db: Arc<Database>,
    per_platform_inflight: usize,
}

impl ScanScheduler {
    /// Create a scheduler with the given per-platform in-flight cap.
    #[must_use]
    pub fn new(db: Arc<Database>, per_platform_inflight: usize) -> Self {
        Self {
            db,
            per_platform_inflight,
        }
    }

    /// All schedules currently due, oldest-due first.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub async fn due_items(&self, now: DateTime<Utc>) -> Result<Vec<ScanSchedule>> {
        Ok(schedules::due_items(self.db.pool(), now, 500).await?)
    }

    /// Due schedules trimmed to the per-platform in-flight cap.
    ///
    /// Counts both claims already held by workers and items selected
    /// earlier in the same batch, so a single plan can never oversubscribe
    /// a platform.
    ///
    /// # Errors
    /// Returns error if a query fails.
    pub async fn plan(&self, now: DateTime<Utc>) -> Result<Vec<ScanSchedule>> {
        let mut per_platform: HashMap<String, i64> = schedules::inflight_counts(self.db.pool())
            .await?
            .into_iter()
            .collect();

        let cap = i64::try_from(self.per_platform_inflight).unwrap_or(i64::MAX);
        let due = self.due_items(now).await?;

        let mut planned = Vec::new();
        for item in due {
            let count = per_platform.entry(item.platform_id.clone()).or_insert(0);
            if *count >= cap {
                debug!(
                    platform_id = %item.platform_id,
                    client_id = %item.client_id,
                    "platform at in-flight capacity; deferring scan"
                );
                continue;
            }
            *count += 1;
            planned.push(item);
        }

        Ok(planned)
    }

    /// Claim one planned item. Returns whether this caller won the claim.
    ///
    /// # Errors
    /// Returns error if the update fails.
    pub async fn claim(&self, schedule: &ScanSchedule, now: DateTime<Utc>) -> Result<bool> {
        Ok(schedules::claim(self.db.pool(), schedule, now).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn setup_test_db() -> Arc<Database> {
        let key = vec![0u8; 32];
        let db = Database::open(":memory:", key)
            .await
            .expect("create test database");
        db.run_migrations().await.expect("run migrations");
        Arc::new(db)
    }

    const CLIENT_A: &str = "550e8400-e29b-41d4-a716-446655440000";
    const CLIENT_B: &str = "660e8400-e29b-41d4-a716-446655440000";
    const CLIENT_C: &str = "770e8400-e29b-41d4-a716-446655440000";

    #[tokio::test]
    async fn test_plan_respects_per_platform_cap() {
        let db = setup_test_db().await;
        let now = Utc::now();
        let past = now - Duration::hours(1);

        // Three clients due on the same platform, cap of two
        schedules::enroll(db.pool(), CLIENT_A, "importgenius", past)
            .await
            .expect("enroll a");
        schedules::enroll(db.pool(), CLIENT_B, "importgenius", past)
            .await
            .expect("enroll b");
        schedules::enroll(db.pool(), CLIENT_C, "importgenius", past)
            .await
            .expect("enroll c");

        let scheduler = ScanScheduler::new(db, 2);
        let planned = scheduler.plan(now).await.expect("plan");

        assert_eq!(planned.len(), 2);
        assert!(planned.iter().all(|s| s.platform_id == "importgenius"));
    }

    #[tokio::test]
    async fn test_plan_counts_existing_claims_against_cap() {
        let db = setup_test_db().await;
        let now = Utc::now();
        let past = now - Duration::hours(1);

        let first = schedules::enroll(db.pool(), CLIENT_A, "importgenius", past)
            .await
            .expect("enroll a");
        schedules::enroll(db.pool(), CLIENT_B, "importgenius", past)
            .await
            .expect("enroll b");

        // One claim already in flight
        assert!(schedules::claim(db.pool(), &first, now).await.expect("claim"));

        let scheduler = ScanScheduler::new(db, 1);
        let planned = scheduler.plan(now).await.expect("plan");

        // Cap of one is already consumed by the in-flight claim
        assert!(planned.is_empty());
    }

    #[tokio::test]
    async fn test_plan_spans_platforms_independently() {
        let db = setup_test_db().await;
        let now = Utc::now();
        let past = now - Duration::hours(1);

        schedules::enroll(db.pool(), CLIENT_A, "importgenius", past)
            .await
            .expect("enroll a/ig");
        schedules::enroll(db.pool(), CLIENT_B, "importgenius", past)
            .await
            .expect("enroll b/ig");
        schedules::enroll(db.pool(), CLIENT_A, "panjiva", past)
            .await
            .expect("enroll a/panjiva");

        let scheduler = ScanScheduler::new(db, 1);
        let planned = scheduler.plan(now).await.expect("plan");

        // One slot per platform
        assert_eq!(planned.len(), 2);
        let platforms: Vec<&str> = planned.iter().map(|s| s.platform_id.as_str()).collect();
        assert!(platforms.contains(&"importgenius"));
        assert!(platforms.contains(&"panjiva"));
    }
}
