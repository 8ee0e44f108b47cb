//! Append-only audit records of scan runs.
//!
//! An `AnonymityCheck` row is written once per completed scan and never
//! mutated afterwards; the table is the audit trail the dashboard and the
//! case lifecycle both hang off. There are deliberately no update or delete
//! operations in this module.

use crate::error::{DatabaseError, Result};
use crate::schedules::parse_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

/// Immutable record of one scan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymityCheck {
    /// Unique identifier
    pub id: String,
    /// Client that was checked
    pub client_id: String,
    /// Platform that was checked
    pub platform_id: String,
    /// Number of platforms covered by this record (1 for a single scan)
    pub platform_count: u32,
    /// Number of exposed records found (0 = clean scan)
    pub exposed_count: u32,
    /// Trading partner named in the exposed records, if any
    pub partner_company: Option<String>,
    /// Country of the named trading partner, if any
    pub partner_country: Option<String>,
    /// Opaque evidence blob captured by the scanner
    #[serde(skip_serializing)]
    pub evidence: Option<Vec<u8>>,
    /// SHA-256 hex digest of the evidence (log-safe reference)
    pub evidence_digest: Option<String>,
    /// When the scan completed
    pub created_at: DateTime<Utc>,
}

/// Fields for a new check record.
#[derive(Debug, Clone)]
pub struct NewCheck {
    /// Client that was checked
    pub client_id: String,
    /// Platform that was checked
    pub platform_id: String,
    /// Number of exposed records found
    pub exposed_count: u32,
    /// Trading partner named in the exposed records, if any
    pub partner_company: Option<String>,
    /// Country of the named trading partner, if any
    pub partner_country: Option<String>,
    /// Opaque evidence blob captured by the scanner
    pub evidence: Option<Vec<u8>>,
    /// SHA-256 hex digest of the evidence
    pub evidence_digest: Option<String>,
}

/// Insert a new check record.
///
/// # Errors
/// Returns `DatabaseError` if the insert fails.
pub async fn insert_check(pool: &Pool<Sqlite>, new: NewCheck) -> Result<AnonymityCheck> {
    let id = Uuid::new_v4().to_string();
    let created_at = Utc::now();

    sqlx::query(
        "INSERT INTO anonymity_checks
             (id, client_id, platform_id, platform_count, exposed_count,
              partner_company, partner_country, evidence, evidence_digest, created_at)
         VALUES (?, ?, ?, 1, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&new.client_id)
    .bind(&new.platform_id)
    .bind(i64::from(new.exposed_count))
    .bind(&new.partner_company)
    .bind(&new.partner_country)
    .bind(&new.evidence)
    .bind(&new.evidence_digest)
    .bind(created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(AnonymityCheck {
        id,
        client_id: new.client_id,
        platform_id: new.platform_id,
        platform_count: 1,
        exposed_count: new.exposed_count,
        partner_company: new.partner_company,
        partner_country: new.partner_country,
        evidence: new.evidence,
        evidence_digest: new.evidence_digest,
        created_at,
    })
}

/// Get a check by its ID.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn get_by_id(pool: &Pool<Sqlite>, id: &str) -> Result<Option<AnonymityCheck>> {
    let row = sqlx::query(
        "SELECT id, client_id, platform_id, platform_count, exposed_count,
                partner_company, partner_country, evidence, evidence_digest, created_at
         FROM anonymity_checks WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| parse_check_row(&r)).transpose()
}

/// Most recent checks for a client, newest first.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn recent_for_client(
    pool: &Pool<Sqlite>,
    client_id: &str,
    limit: i64,
) -> Result<Vec<AnonymityCheck>> {
    let rows = sqlx::query(
        "SELECT id, client_id, platform_id, platform_count, exposed_count,
                partner_company, partner_country, evidence, evidence_digest, created_at
         FROM anonymity_checks
         WHERE client_id = ?
         ORDER BY created_at DESC
         LIMIT ?",
    )
    .bind(client_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_check_row).collect()
}

/// Latest check for a (client, platform) pair.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn latest_for_pair(
    pool: &Pool<Sqlite>,
    client_id: &str,
    platform_id: &str,
) -> Result<Option<AnonymityCheck>> {
    let row = sqlx::query(
        "SELECT id, client_id, platform_id, platform_count, exposed_count,
                partner_company, partner_country, evidence, evidence_digest, created_at
         FROM anonymity_checks
         WHERE client_id = ? AND platform_id = ?
         ORDER BY created_at DESC
         LIMIT 1",
    )
    .bind(client_id)
    .bind(platform_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| parse_check_row(&r)).transpose()
}

/// Parse a database row into an `AnonymityCheck`.
fn parse_check_row(row: &sqlx::sqlite::SqliteRow) -> Result<AnonymityCheck> {
    let created_at_str: String = row.get("created_at");
    let created_at = parse_timestamp(&created_at_str)?;

    let platform_count: i64 = row.get("platform_count");
    let exposed_count: i64 = row.get("exposed_count");

    Ok(AnonymityCheck {
        id: row.get("id"),
        client_id: row.get("client_id"),
        platform_id: row.get("platform_id"),
        platform_count: u32::try_from(platform_count)
            .map_err(|_| DatabaseError::Decode(format!("bad platform_count {platform_count}")))?,
        exposed_count: u32::try_from(exposed_count)
            .map_err(|_| DatabaseError::Decode(format!("bad exposed_count {exposed_count}")))?,
        partner_company: row.try_get("partner_company").ok().flatten(),
        partner_country: row.try_get("partner_country").ok().flatten(),
        evidence: row.try_get("evidence").ok().flatten(),
        evidence_digest: row.try_get("evidence_digest").ok().flatten(),
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn setup_test_db() -> Database {
        let key = vec![0u8; 32];
        let db = Database::open(":memory:", key)
            .await
            .expect("create test database");
        db.run_migrations().await.expect("run migrations");
        db
    }

    fn new_check(client_id: &str, platform_id: &str, exposed: u32) -> NewCheck {
        NewCheck {
            client_id: client_id.to_string(),
            platform_id: platform_id.to_string(),
            exposed_count: exposed,
            partner_company: (exposed > 0).then(|| "Acme Freight GmbH".to_string()),
            partner_country: (exposed > 0).then(|| "DE".to_string()),
            evidence: (exposed > 0).then(|| b"<html>listing</html>".to_vec()),
            evidence_digest: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = setup_test_db().await;

        let check = insert_check(db.pool(), new_check("client-1", "importgenius", 2))
            .await
            .expect("insert check");

        assert_eq!(check.exposed_count, 2);
        assert_eq!(check.platform_count, 1);

        let fetched = get_by_id(db.pool(), &check.id)
            .await
            .expect("get by id")
            .expect("check exists");
        assert_eq!(fetched.id, check.id);
        assert_eq!(fetched.partner_company.as_deref(), Some("Acme Freight GmbH"));
        assert_eq!(fetched.evidence.as_deref(), Some(b"<html>listing</html>".as_slice()));
    }

    #[tokio::test]
    async fn test_recent_for_client_ordering() {
        let db = setup_test_db().await;

        insert_check(db.pool(), new_check("client-1", "importgenius", 0))
            .await
            .expect("insert 1");
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        insert_check(db.pool(), new_check("client-1", "panjiva", 1))
            .await
            .expect("insert 2");
        insert_check(db.pool(), new_check("client-2", "panjiva", 3))
            .await
            .expect("insert other client");

        let recent = recent_for_client(db.pool(), "client-1", 10)
            .await
            .expect("recent checks");

        assert_eq!(recent.len(), 2);
        // Newest first
        assert_eq!(recent[0].platform_id, "panjiva");
        assert_eq!(recent[1].platform_id, "importgenius");
    }

    #[tokio::test]
    async fn test_latest_for_pair() {
        let db = setup_test_db().await;

        insert_check(db.pool(), new_check("client-1", "importgenius", 1))
            .await
            .expect("insert 1");
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        insert_check(db.pool(), new_check("client-1", "importgenius", 0))
            .await
            .expect("insert 2");

        let latest = latest_for_pair(db.pool(), "client-1", "importgenius")
            .await
            .expect("latest for pair")
            .expect("check exists");
        assert_eq!(latest.exposed_count, 0);

        let none = latest_for_pair(db.pool(), "client-1", "panjiva")
            .await
            .expect("latest for pair");
        assert!(none.is_none());
    }
}
