//! Notification outbox rows.
//!
//! The outbox row is written in the same breath as the case transition it
//! announces; delivery happens afterwards, best-effort, and is retried until
//! acknowledged. Dedupe on `(case_id, state)` matches the idempotence key
//! consumers are required to honor.

use crate::cases::CaseState;
use crate::error::{DatabaseError, Result};
use crate::schedules::parse_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

/// One queued (or delivered) case notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Unique identifier
    pub id: String,
    /// Case the notification announces
    pub case_id: String,
    /// Client the case belongs to
    pub client_id: String,
    /// Platform the case targets
    pub platform_id: String,
    /// Case state being announced
    pub state: CaseState,
    /// When the notification was enqueued
    pub created_at: DateTime<Utc>,
    /// When delivery was acknowledged (None = still pending)
    pub delivered_at: Option<DateTime<Utc>>,
    /// Delivery attempts so far
    pub attempts: u32,
    /// Last delivery error, if any
    pub last_error: Option<String>,
}

/// Enqueue a notification for a case state.
///
/// Returns `None` if a notification for the same `(case_id, state)` already
/// exists — the event was already announced (or is pending), and redelivery
/// is the outbox's job, not the caller's.
///
/// # Errors
/// Returns `DatabaseError` if the insert fails.
pub async fn enqueue(
    pool: &Pool<Sqlite>,
    case_id: &str,
    client_id: &str,
    platform_id: &str,
    state: CaseState,
    now: DateTime<Utc>,
) -> Result<Option<NotificationRecord>> {
    let id = Uuid::new_v4().to_string();

    let result = sqlx::query(
        "INSERT OR IGNORE INTO notifications
             (id, case_id, client_id, platform_id, state, created_at, attempts)
         VALUES (?, ?, ?, ?, ?, ?, 0)",
    )
    .bind(&id)
    .bind(case_id)
    .bind(client_id)
    .bind(platform_id)
    .bind(state.to_string())
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    Ok(Some(NotificationRecord {
        id,
        case_id: case_id.to_string(),
        client_id: client_id.to_string(),
        platform_id: platform_id.to_string(),
        state,
        created_at: now,
        delivered_at: None,
        attempts: 0,
        last_error: None,
    }))
}

/// Mark a notification as delivered.
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn mark_delivered(pool: &Pool<Sqlite>, id: &str, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE notifications SET delivered_at = ? WHERE id = ?")
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Record a failed delivery attempt.
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn mark_failed(pool: &Pool<Sqlite>, id: &str, error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE notifications SET attempts = attempts + 1, last_error = ? WHERE id = ?",
    )
    .bind(error)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Undelivered notifications with attempts below `max_attempts`, oldest
/// first (FIFO redelivery).
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn undelivered(
    pool: &Pool<Sqlite>,
    max_attempts: u32,
    limit: i64,
) -> Result<Vec<NotificationRecord>> {
    let rows = sqlx::query(
        "SELECT id, case_id, client_id, platform_id, state, created_at,
                delivered_at, attempts, last_error
         FROM notifications
         WHERE delivered_at IS NULL AND attempts < ?
         ORDER BY created_at ASC
         LIMIT ?",
    )
    .bind(i64::from(max_attempts))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_notification_row).collect()
}

/// Parse a database row into a `NotificationRecord`.
fn parse_notification_row(row: &sqlx::sqlite::SqliteRow) -> Result<NotificationRecord> {
    let state_str: String = row.get("state");
    let created_at_str: String = row.get("created_at");
    let attempts: i64 = row.get("attempts");

    let delivered_at = row
        .try_get::<Option<String>, _>("delivered_at")
        .ok()
        .flatten()
        .map(|s| parse_timestamp(&s))
        .transpose()?;

    Ok(NotificationRecord {
        id: row.get("id"),
        case_id: row.get("case_id"),
        client_id: row.get("client_id"),
        platform_id: row.get("platform_id"),
        state: CaseState::parse(&state_str)?,
        created_at: parse_timestamp(&created_at_str)?,
        delivered_at,
        attempts: u32::try_from(attempts)
            .map_err(|_| DatabaseError::Decode(format!("negative attempts {attempts}")))?,
        last_error: row.try_get("last_error").ok().flatten(),
    })
}
