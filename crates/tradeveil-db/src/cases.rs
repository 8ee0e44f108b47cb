//! Takedown case rows and their immutable transition history.
//!
//! A case moves through a bounded lifecycle:
//!
//! `Detected -> RequestSubmitted -> PendingResponse -> {Verified | Escalated}`
//! with `Verified -> Resolved`, `Escalated -> {RequestSubmitted | Failed}`,
//! and `Detected -> Cancelled` when a client disenrolls.
//!
//! Transitions are one-directional forward except the bounded
//! `Escalated -> RequestSubmitted` re-attempt. Each transition is a guarded
//! `UPDATE ... WHERE state = ?` plus an appended history row, so a lost race
//! surfaces as a rejected transition instead of silently overwriting state.

use crate::error::{DatabaseError, Result};
use crate::schedules::parse_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a takedown case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CaseState {
    /// Exposure found, no removal request sent yet
    Detected,
    /// A removal request has been dispatched to the platform
    RequestSubmitted,
    /// Waiting for the platform's response or a verifying scan
    PendingResponse,
    /// A follow-up scan confirmed the exposure is gone
    Verified,
    /// Response window elapsed; needs legal/manual intervention
    Escalated,
    /// Removal verified; terminal
    Resolved,
    /// Attempt budget exhausted; terminal, requires manual closure
    Failed,
    /// Client disenrolled before a request was sent; terminal
    Cancelled,
}

impl CaseState {
    /// Whether this state ends the case lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// No transition skips a state.
    #[must_use]
    pub fn can_transition_to(&self, next: CaseState) -> bool {
        matches!(
            (self, next),
            (Self::Detected, Self::RequestSubmitted | Self::Cancelled)
                | (Self::RequestSubmitted, Self::PendingResponse)
                | (Self::PendingResponse, Self::Verified | Self::Escalated)
                | (Self::Verified, Self::Resolved)
                | (Self::Escalated, Self::RequestSubmitted | Self::Failed)
        )
    }

    /// Parse a stored state string.
    pub(crate) fn parse(s: &str) -> Result<Self> {
        match s {
            "Detected" => Ok(Self::Detected),
            "RequestSubmitted" => Ok(Self::RequestSubmitted),
            "PendingResponse" => Ok(Self::PendingResponse),
            "Verified" => Ok(Self::Verified),
            "Escalated" => Ok(Self::Escalated),
            "Resolved" => Ok(Self::Resolved),
            "Failed" => Ok(Self::Failed),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(DatabaseError::Decode(format!(
                "invalid case state '{other}'"
            ))),
        }
    }
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Detected => "Detected",
            Self::RequestSubmitted => "RequestSubmitted",
            Self::PendingResponse => "PendingResponse",
            Self::Verified => "Verified",
            Self::Escalated => "Escalated",
            Self::Resolved => "Resolved",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

/// A takedown case for one exposure on one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakedownCase {
    /// Unique identifier
    pub id: String,
    /// Client whose data is exposed
    pub client_id: String,
    /// Platform carrying the exposure
    pub platform_id: String,
    /// Current lifecycle state
    pub state: CaseState,
    /// When the case was opened
    pub opened_at: DateTime<Utc>,
    /// When the case last changed state
    pub last_transition_at: DateTime<Utc>,
    /// Removal-request submissions so far
    pub attempts: u32,
    /// The `AnonymityCheck` that evidences the exposure
    pub evidence_ref: String,
    /// Request ID returned by the takedown dispatcher, if submitted
    pub request_id: Option<String>,
    /// Closing note for terminal states
    pub resolution_note: Option<String>,
}

/// One entry in a case's immutable transition history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseTransition {
    /// Row ID (monotonic per database)
    pub id: i64,
    /// Case this transition belongs to
    pub case_id: String,
    /// State before the transition (None for the opening entry)
    pub from_state: Option<CaseState>,
    /// State after the transition
    pub to_state: CaseState,
    /// When the transition happened
    pub occurred_at: DateTime<Utc>,
    /// Free-form annotation (verifying check, failure reason, ...)
    pub note: Option<String>,
}

/// Open a new case in `Detected`.
///
/// The partial unique index on open cases enforces the invariant that at
/// most one non-terminal case exists per (client, platform) pair; a
/// violation maps to [`DatabaseError::OpenCaseExists`] so callers can fall
/// back to the existing case.
///
/// # Errors
/// Returns `OpenCaseExists` if an open case already exists for the pair, or
/// `DatabaseError` for other storage failures.
pub async fn open_case(
    pool: &Pool<Sqlite>,
    client_id: &str,
    platform_id: &str,
    evidence_ref: &str,
    now: DateTime<Utc>,
) -> Result<TakedownCase> {
    let id = Uuid::new_v4().to_string();

    let result = sqlx::query(
        "INSERT INTO takedown_cases
             (id, client_id, platform_id, state, opened_at, last_transition_at, attempts, evidence_ref)
         VALUES (?, ?, ?, 'Detected', ?, ?, 0, ?)",
    )
    .bind(&id)
    .bind(client_id)
    .bind(platform_id)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .bind(evidence_ref)
    .execute(pool)
    .await;

    match result {
        Ok(_) => {}
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Err(DatabaseError::OpenCaseExists {
                client_id: client_id.to_string(),
                platform_id: platform_id.to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    }

    append_transition(pool, &id, None, CaseState::Detected, now, None).await?;

    Ok(TakedownCase {
        id,
        client_id: client_id.to_string(),
        platform_id: platform_id.to_string(),
        state: CaseState::Detected,
        opened_at: now,
        last_transition_at: now,
        attempts: 0,
        evidence_ref: evidence_ref.to_string(),
        request_id: None,
        resolution_note: None,
    })
}

/// Move a case from `from` to `to`, appending a history entry.
///
/// The update is guarded on the expected current state; if a concurrent
/// worker already moved the case, the guard matches zero rows and the
/// transition is rejected. Disallowed transitions are rejected before
/// touching the database.
///
/// # Errors
/// Returns `InvalidTransition` if the transition is disallowed or lost a
/// race, `NotFound` if the case doesn't exist.
#[allow(clippy::too_many_arguments)]
pub async fn transition(
    pool: &Pool<Sqlite>,
    case_id: &str,
    from: CaseState,
    to: CaseState,
    now: DateTime<Utc>,
    note: Option<String>,
    request_id: Option<String>,
    resolution_note: Option<String>,
    increment_attempts: bool,
) -> Result<TakedownCase> {
    if !from.can_transition_to(to) {
        return Err(DatabaseError::InvalidTransition {
            case_id: case_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let result = sqlx::query(
        "UPDATE takedown_cases
         SET state = ?, last_transition_at = ?,
             attempts = attempts + ?,
             request_id = COALESCE(?, request_id),
             resolution_note = COALESCE(?, resolution_note)
         WHERE id = ? AND state = ?",
    )
    .bind(to.to_string())
    .bind(now.to_rfc3339())
    .bind(i64::from(increment_attempts))
    .bind(request_id)
    .bind(resolution_note)
    .bind(case_id)
    .bind(from.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::InvalidTransition {
            case_id: case_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    append_transition(pool, case_id, Some(from), to, now, note).await?;

    tracing::info!(
        case_id = %case_id,
        from = %from,
        to = %to,
        "takedown case transitioned"
    );

    get_by_id(pool, case_id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("case {case_id}")))
}

/// Append a history row. History is append-only; nothing updates or deletes
/// these rows.
async fn append_transition(
    pool: &Pool<Sqlite>,
    case_id: &str,
    from: Option<CaseState>,
    to: CaseState,
    now: DateTime<Utc>,
    note: Option<String>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO case_transitions (case_id, from_state, to_state, occurred_at, note)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(case_id)
    .bind(from.map(|s| s.to_string()))
    .bind(to.to_string())
    .bind(now.to_rfc3339())
    .bind(note)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a case by its ID.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn get_by_id(pool: &Pool<Sqlite>, case_id: &str) -> Result<Option<TakedownCase>> {
    let row = sqlx::query(
        "SELECT id, client_id, platform_id, state, opened_at, last_transition_at,
                attempts, evidence_ref, request_id, resolution_note
         FROM takedown_cases WHERE id = ?",
    )
    .bind(case_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| parse_case_row(&r)).transpose()
}

/// Get the open (non-terminal) case for a (client, platform) pair, if any.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn get_open_case(
    pool: &Pool<Sqlite>,
    client_id: &str,
    platform_id: &str,
) -> Result<Option<TakedownCase>> {
    let row = sqlx::query(
        "SELECT id, client_id, platform_id, state, opened_at, last_transition_at,
                attempts, evidence_ref, request_id, resolution_note
         FROM takedown_cases
         WHERE client_id = ? AND platform_id = ?
           AND state NOT IN ('Resolved', 'Failed', 'Cancelled')",
    )
    .bind(client_id)
    .bind(platform_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| parse_case_row(&r)).transpose()
}

/// All cases currently in `state`, oldest transition first.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn cases_in_state(pool: &Pool<Sqlite>, state: CaseState) -> Result<Vec<TakedownCase>> {
    let rows = sqlx::query(
        "SELECT id, client_id, platform_id, state, opened_at, last_transition_at,
                attempts, evidence_ref, request_id, resolution_note
         FROM takedown_cases
         WHERE state = ?
         ORDER BY last_transition_at ASC",
    )
    .bind(state.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_case_row).collect()
}

/// `PendingResponse` cases whose last transition predates `cutoff`.
///
/// These are the cases that have waited past the response window and must
/// escalate rather than age unnoticed.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn pending_response_older_than(
    pool: &Pool<Sqlite>,
    cutoff: DateTime<Utc>,
) -> Result<Vec<TakedownCase>> {
    let rows = sqlx::query(
        "SELECT id, client_id, platform_id, state, opened_at, last_transition_at,
                attempts, evidence_ref, request_id, resolution_note
         FROM takedown_cases
         WHERE state = 'PendingResponse' AND last_transition_at < ?
         ORDER BY last_transition_at ASC",
    )
    .bind(cutoff.to_rfc3339())
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_case_row).collect()
}

/// Cases for a client, optionally including terminal ones, newest first.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn cases_for_client(
    pool: &Pool<Sqlite>,
    client_id: &str,
    include_closed: bool,
) -> Result<Vec<TakedownCase>> {
    let sql = if include_closed {
        "SELECT id, client_id, platform_id, state, opened_at, last_transition_at,
                attempts, evidence_ref, request_id, resolution_note
         FROM takedown_cases
         WHERE client_id = ?
         ORDER BY last_transition_at DESC"
    } else {
        "SELECT id, client_id, platform_id, state, opened_at, last_transition_at,
                attempts, evidence_ref, request_id, resolution_note
         FROM takedown_cases
         WHERE client_id = ? AND state NOT IN ('Resolved', 'Failed', 'Cancelled')
         ORDER BY last_transition_at DESC"
    };

    let rows = sqlx::query(sql).bind(client_id).fetch_all(pool).await?;

    rows.iter().map(parse_case_row).collect()
}

/// Full transition history for a case, oldest first.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn history(pool: &Pool<Sqlite>, case_id: &str) -> Result<Vec<CaseTransition>> {
    let rows = sqlx::query(
        "SELECT id, case_id, from_state, to_state, occurred_at, note
         FROM case_transitions
         WHERE case_id = ?
         ORDER BY id ASC",
    )
    .bind(case_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<CaseTransition> {
            let from_state = row
                .try_get::<Option<String>, _>("from_state")
                .ok()
                .flatten()
                .map(|s| CaseState::parse(&s))
                .transpose()?;

            let to_state_str: String = row.get("to_state");
            let occurred_at_str: String = row.get("occurred_at");

            Ok(CaseTransition {
                id: row.get("id"),
                case_id: row.get("case_id"),
                from_state,
                to_state: CaseState::parse(&to_state_str)?,
                occurred_at: parse_timestamp(&occurred_at_str)?,
                note: row.try_get("note").ok().flatten(),
            })
        })
        .collect()
}

/// Parse a database row into a `TakedownCase`.
pub(crate) fn parse_case_row(row: &sqlx::sqlite::SqliteRow) -> Result<TakedownCase> {
    let state_str: String = row.get("state");
    let opened_at_str: String = row.get("opened_at");
    let last_transition_str: String = row.get("last_transition_at");
    let attempts: i64 = row.get("attempts");

    Ok(TakedownCase {
        id: row.get("id"),
        client_id: row.get("client_id"),
        platform_id: row.get("platform_id"),
        state: CaseState::parse(&state_str)?,
        opened_at: parse_timestamp(&opened_at_str)?,
        last_transition_at: parse_timestamp(&last_transition_str)?,
        attempts: u32::try_from(attempts)
            .map_err(|_| DatabaseError::Decode(format!("negative attempts {attempts}")))?,
        evidence_ref: row.get("evidence_ref"),
        request_id: row.try_get("request_id").ok().flatten(),
        resolution_note: row.try_get("resolution_note").ok().flatten(),
    })
}
