//! Read-only projections for the dashboard.
//!
//! No business logic lives here: these queries never mutate schedules or
//! cases, they only shape persisted state for display. The dashboard's
//! status badges come from these rows, never from its own bookkeeping.

use crate::cases::{self, CaseState, TakedownCase};
use crate::checks::{self, AnonymityCheck};
use crate::error::Result;
use crate::schedules::{parse_timestamp, ScheduleStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};

/// One row of the per-client platform status list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformStatus {
    /// Platform being monitored
    pub platform_id: String,
    /// Schedule status for the pair
    pub status: ScheduleStatus,
    /// When the last successful scan completed
    pub last_scan_at: Option<DateTime<Utc>>,
    /// When the next scan is due
    pub next_due_at: DateTime<Utc>,
    /// Consecutive transient failures since the last success
    pub consecutive_failures: u32,
    /// State of the open takedown case for the pair, if one exists
    pub open_case_state: Option<CaseState>,
}

/// Platform status list for a client, one row per enrolled platform.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn platform_status(pool: &Pool<Sqlite>, client_id: &str) -> Result<Vec<PlatformStatus>> {
    let rows = sqlx::query(
        "SELECT s.platform_id, s.status, s.last_scan_at, s.next_due_at,
                s.consecutive_failures, c.state AS open_case_state
         FROM scan_schedules s
         LEFT JOIN takedown_cases c
                ON c.client_id = s.client_id
               AND c.platform_id = s.platform_id
               AND c.state NOT IN ('Resolved', 'Failed', 'Cancelled')
         WHERE s.client_id = ?
         ORDER BY s.platform_id ASC",
    )
    .bind(client_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<PlatformStatus> {
            let status_str: String = row.get("status");
            let next_due_str: String = row.get("next_due_at");
            let failures: i64 = row.get("consecutive_failures");

            let last_scan_at = row
                .try_get::<Option<String>, _>("last_scan_at")
                .ok()
                .flatten()
                .map(|s| parse_timestamp(&s))
                .transpose()?;

            let open_case_state = row
                .try_get::<Option<String>, _>("open_case_state")
                .ok()
                .flatten()
                .map(|s| CaseState::parse(&s))
                .transpose()?;

            Ok(PlatformStatus {
                platform_id: row.get("platform_id"),
                status: ScheduleStatus::parse(&status_str)?,
                last_scan_at,
                next_due_at: parse_timestamp(&next_due_str)?,
                consecutive_failures: u32::try_from(failures).unwrap_or(0),
                open_case_state,
            })
        })
        .collect()
}

/// Most recent scan checks for a client, newest first.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn recent_checks(
    pool: &Pool<Sqlite>,
    client_id: &str,
    limit: i64,
) -> Result<Vec<AnonymityCheck>> {
    checks::recent_for_client(pool, client_id, limit).await
}

/// Case list for a client, newest activity first.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn case_list(
    pool: &Pool<Sqlite>,
    client_id: &str,
    include_closed: bool,
) -> Result<Vec<TakedownCase>> {
    cases::cases_for_client(pool, client_id, include_closed).await
}

/// One entry in the per-client recent-activity feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Case that changed state
    pub case_id: String,
    /// Platform the case targets
    pub platform_id: String,
    /// State before the transition (None for case creation)
    pub from_state: Option<CaseState>,
    /// State after the transition
    pub to_state: CaseState,
    /// When the transition happened
    pub occurred_at: DateTime<Utc>,
}

/// Recent case transitions for a client, newest first.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn recent_activity(
    pool: &Pool<Sqlite>,
    client_id: &str,
    limit: i64,
) -> Result<Vec<ActivityEntry>> {
    let rows = sqlx::query(
        "SELECT t.case_id, c.platform_id, t.from_state, t.to_state, t.occurred_at
         FROM case_transitions t
         JOIN takedown_cases c ON c.id = t.case_id
         WHERE c.client_id = ?
         ORDER BY t.id DESC
         LIMIT ?",
    )
    .bind(client_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<ActivityEntry> {
            let from_state = row
                .try_get::<Option<String>, _>("from_state")
                .ok()
                .flatten()
                .map(|s| CaseState::parse(&s))
                .transpose()?;

            let to_state_str: String = row.get("to_state");
            let occurred_at_str: String = row.get("occurred_at");

            Ok(ActivityEntry {
                case_id: row.get("case_id"),
                platform_id: row.get("platform_id"),
                from_state,
                to_state: CaseState::parse(&to_state_str)?,
                occurred_at: parse_timestamp(&occurred_at_str)?,
            })
        })
        .collect()
}
