//! Scan schedule rows: one per enrolled (client, platform) pair.
//!
//! All mutation goes through the claim-then-update pattern. A schedule is
//! claimed optimistically on its `next_due_at` value, so two scheduler ticks
//! can never dispatch the same pair concurrently; every writer serializes
//! timestamps with `to_rfc3339`, which the claim guard relies on for its
//! equality match.

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};
use std::fmt;

/// Status of a scan schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScheduleStatus {
    /// Enrolled and idle, will be picked up when due
    Active,
    /// Claimed by a worker, scan in flight
    Scheduled,
    /// Client membership lapsed; never dispatched, never deleted
    Paused,
    /// Failure threshold reached; needs operator attention before retrying
    Alert,
}

impl ScheduleStatus {
    pub(crate) fn parse(s: &str) -> Result<Self> {
        match s {
            "Active" => Ok(Self::Active),
            "Scheduled" => Ok(Self::Scheduled),
            "Paused" => Ok(Self::Paused),
            "Alert" => Ok(Self::Alert),
            other => Err(DatabaseError::Decode(format!(
                "invalid schedule status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Scheduled => write!(f, "Scheduled"),
            Self::Paused => write!(f, "Paused"),
            Self::Alert => write!(f, "Alert"),
        }
    }
}

/// A scan schedule for one (client, platform) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSchedule {
    /// Client being monitored
    pub client_id: String,
    /// Platform being checked
    pub platform_id: String,
    /// Current schedule status
    pub status: ScheduleStatus,
    /// When the last successful scan completed
    pub last_scan_at: Option<DateTime<Utc>>,
    /// When the next scan is due
    pub next_due_at: DateTime<Utc>,
    /// Consecutive transient failures since the last success
    pub consecutive_failures: u32,
    /// When a worker claimed this schedule (None = unclaimed)
    pub claimed_at: Option<DateTime<Utc>>,
}

/// Enroll a client on a platform, creating the schedule row.
///
/// Idempotent: an existing row is left in place, except that a `Paused` row
/// is re-activated (re-enrollment after a lapsed membership).
///
/// # Errors
/// Returns `DatabaseError` if the insert fails.
pub async fn enroll(
    pool: &Pool<Sqlite>,
    client_id: &str,
    platform_id: &str,
    first_due: DateTime<Utc>,
) -> Result<ScanSchedule> {
    sqlx::query(
        "INSERT OR IGNORE INTO scan_schedules (client_id, platform_id, status, next_due_at, consecutive_failures)
         VALUES (?, ?, 'Active', ?, 0)",
    )
    .bind(client_id)
    .bind(platform_id)
    .bind(first_due.to_rfc3339())
    .execute(pool)
    .await?;

    sqlx::query(
        "UPDATE scan_schedules SET status = 'Active'
         WHERE client_id = ? AND platform_id = ? AND status = 'Paused'",
    )
    .bind(client_id)
    .bind(platform_id)
    .execute(pool)
    .await?;

    get(pool, client_id, platform_id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("schedule {client_id}/{platform_id}")))
}

/// Get the schedule for a (client, platform) pair.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn get(
    pool: &Pool<Sqlite>,
    client_id: &str,
    platform_id: &str,
) -> Result<Option<ScanSchedule>> {
    let row = sqlx::query(
        "SELECT client_id, platform_id, status, last_scan_at, next_due_at, consecutive_failures, claimed_at
         FROM scan_schedules WHERE client_id = ? AND platform_id = ?",
    )
    .bind(client_id)
    .bind(platform_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| parse_schedule_row(&r)).transpose()
}

/// Select the schedules due for a scan, oldest-due first.
///
/// `Paused` and `Alert` schedules and rows already claimed by a worker are
/// excluded. Ties on the due timestamp break by `client_id` for
/// deterministic dispatch order.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn due_items(
    pool: &Pool<Sqlite>,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<ScanSchedule>> {
    let rows = sqlx::query(
        "SELECT client_id, platform_id, status, last_scan_at, next_due_at, consecutive_failures, claimed_at
         FROM scan_schedules
         WHERE status NOT IN ('Paused', 'Alert')
           AND claimed_at IS NULL
           AND next_due_at <= ?
         ORDER BY next_due_at ASC, client_id ASC
         LIMIT ?",
    )
    .bind(now.to_rfc3339())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_schedule_row).collect()
}

/// Claim a due schedule for execution.
///
/// The claim is an optimistic lock on `next_due_at`: if another worker
/// already claimed or rescheduled the row, zero rows match and the claim
/// fails. Returns `true` if this caller won the claim.
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn claim(
    pool: &Pool<Sqlite>,
    schedule: &ScanSchedule,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE scan_schedules
         SET claimed_at = ?, status = 'Scheduled'
         WHERE client_id = ? AND platform_id = ?
           AND next_due_at = ?
           AND claimed_at IS NULL
           AND status NOT IN ('Paused', 'Alert')",
    )
    .bind(now.to_rfc3339())
    .bind(&schedule.client_id)
    .bind(&schedule.platform_id)
    .bind(schedule.next_due_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Release a claim without recording a result.
///
/// Used when a claimed item cannot be executed at all (e.g. its platform
/// vanished from the registry between claim and dispatch).
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn release_claim(pool: &Pool<Sqlite>, client_id: &str, platform_id: &str) -> Result<()> {
    sqlx::query(
        "UPDATE scan_schedules
         SET claimed_at = NULL,
             status = CASE status WHEN 'Scheduled' THEN 'Active' ELSE status END
         WHERE client_id = ? AND platform_id = ?",
    )
    .bind(client_id)
    .bind(platform_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a completed scan: reset the failure counter, advance the due
/// timestamp by one cadence, release the claim.
///
/// A schedule paused mid-flight stays paused; the scan result itself is
/// still recorded by the caller.
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn record_success(
    pool: &Pool<Sqlite>,
    client_id: &str,
    platform_id: &str,
    scanned_at: DateTime<Utc>,
    next_due: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE scan_schedules
         SET last_scan_at = ?, next_due_at = ?, consecutive_failures = 0, claimed_at = NULL,
             status = CASE status WHEN 'Paused' THEN 'Paused' ELSE 'Active' END
         WHERE client_id = ? AND platform_id = ?",
    )
    .bind(scanned_at.to_rfc3339())
    .bind(next_due.to_rfc3339())
    .bind(client_id)
    .bind(platform_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a transient scan failure: bump the failure counter, push the due
/// timestamp out by the caller-computed backoff, release the claim.
///
/// When the new failure count reaches `alert_threshold` the schedule flips
/// to `Alert` and leaves the auto-retry pool until manually reset.
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn record_failure(
    pool: &Pool<Sqlite>,
    schedule: &ScanSchedule,
    next_due: DateTime<Utc>,
    alert_threshold: u32,
) -> Result<ScheduleStatus> {
    let new_failures = schedule.consecutive_failures + 1;
    let new_status = if new_failures >= alert_threshold {
        ScheduleStatus::Alert
    } else {
        ScheduleStatus::Active
    };

    sqlx::query(
        "UPDATE scan_schedules
         SET next_due_at = ?, consecutive_failures = ?, claimed_at = NULL,
             status = CASE status WHEN 'Paused' THEN 'Paused' ELSE ? END
         WHERE client_id = ? AND platform_id = ?",
    )
    .bind(next_due.to_rfc3339())
    .bind(i64::from(new_failures))
    .bind(new_status.to_string())
    .bind(&schedule.client_id)
    .bind(&schedule.platform_id)
    .execute(pool)
    .await?;

    Ok(new_status)
}

/// Pause every schedule for a client (disenrollment).
///
/// In-flight claims are left in place so a running scan can finish and
/// release its own claim; the `Paused` status blocks any new dispatch.
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn pause_for_client(pool: &Pool<Sqlite>, client_id: &str) -> Result<u64> {
    let result = sqlx::query("UPDATE scan_schedules SET status = 'Paused' WHERE client_id = ?")
        .bind(client_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Manually re-arm a schedule stuck in `Alert`.
///
/// Returns `true` if the schedule was in `Alert` and is now `Active` with a
/// cleared failure counter and an immediate due timestamp.
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn reset_alert(
    pool: &Pool<Sqlite>,
    client_id: &str,
    platform_id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE scan_schedules
         SET status = 'Active', consecutive_failures = 0, next_due_at = ?, claimed_at = NULL
         WHERE client_id = ? AND platform_id = ? AND status = 'Alert'",
    )
    .bind(now.to_rfc3339())
    .bind(client_id)
    .bind(platform_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Count currently-claimed schedules per platform.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn inflight_counts(pool: &Pool<Sqlite>) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        "SELECT platform_id, COUNT(*) AS inflight
         FROM scan_schedules
         WHERE claimed_at IS NOT NULL
         GROUP BY platform_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("platform_id"), row.get("inflight")))
        .collect())
}

/// Release claims older than `cutoff` (worker crashed without releasing).
///
/// Returns the number of claims released.
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn release_stale_claims(pool: &Pool<Sqlite>, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE scan_schedules
         SET claimed_at = NULL,
             status = CASE status WHEN 'Scheduled' THEN 'Active' ELSE status END
         WHERE claimed_at IS NOT NULL AND claimed_at < ?",
    )
    .bind(cutoff.to_rfc3339())
    .execute(pool)
    .await?;

    let released = result.rows_affected();
    if released > 0 {
        tracing::warn!(released, "released stale scan claims");
    }

    Ok(released)
}

/// Parse a database row into a `ScanSchedule`.
fn parse_schedule_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScanSchedule> {
    let status_str: String = row.get("status");
    let status = ScheduleStatus::parse(&status_str)?;

    let next_due_str: String = row.get("next_due_at");
    let next_due_at = parse_timestamp(&next_due_str)?;

    let last_scan_at = row
        .try_get::<Option<String>, _>("last_scan_at")
        .ok()
        .flatten()
        .map(|s| parse_timestamp(&s))
        .transpose()?;

    let claimed_at = row
        .try_get::<Option<String>, _>("claimed_at")
        .ok()
        .flatten()
        .map(|s| parse_timestamp(&s))
        .transpose()?;

    let failures: i64 = row.get("consecutive_failures");

    Ok(ScanSchedule {
        client_id: row.get("client_id"),
        platform_id: row.get("platform_id"),
        status,
        last_scan_at,
        next_due_at,
        consecutive_failures: u32::try_from(failures)
            .map_err(|_| DatabaseError::Decode(format!("negative failure count {failures}")))?,
        claimed_at,
    })
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode(format!("invalid timestamp '{s}': {e}")))
}
