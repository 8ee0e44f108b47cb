//! Scan execution: one claimed schedule in, one recorded outcome out.

use crate::adapter::{ScanReport, ScannerSet};
use crate::error::{Result, ScanError};
use crate::terms::ClientTerms;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use tradeveil_case::CaseManager;
use tradeveil_db::{checks, schedules, AnonymityCheck, Database, NewCheck, ScanSchedule, ScheduleStatus};
use tradeveil_platform::PlatformDefinition;

/// Result of executing one scan.
#[derive(Debug)]
pub struct ScanOutcome {
    /// The audit record, if the scan completed
    pub check: Option<AnonymityCheck>,
    /// Schedule status after bookkeeping
    pub schedule_status: ScheduleStatus,
    /// Transient failure description, if the scan did not complete
    pub error: Option<String>,
}

/// Runs one scan to completion and records exactly one outcome: an
/// `AnonymityCheck` row on success, or failure bookkeeping (backoff, alert
/// threshold) on a transient error.
pub struct ScanExecutor {
    db: Arc<Database>,
    scanners: Arc<ScannerSet>,
    cases: Arc<CaseManager>,
    attempt_timeout: std::time::Duration,
    alert_threshold: u32,
    backoff_exponent_cap: u32,
}

impl ScanExecutor {
    /// Create an executor.
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        scanners: Arc<ScannerSet>,
        cases: Arc<CaseManager>,
        attempt_timeout: std::time::Duration,
        alert_threshold: u32,
        backoff_exponent_cap: u32,
    ) -> Self {
        Self {
            db,
            scanners,
            cases,
            attempt_timeout,
            alert_threshold,
            backoff_exponent_cap,
        }
    }

    /// Execute one claimed schedule.
    ///
    /// Success persists the check, resets the failure counter, advances
    /// `next_due_at` by one cadence and hands the result to the case
    /// manager. A transient failure extends `next_due_at` by the current
    /// backoff and may flip the schedule to `Alert`. Either way the claim is
    /// released. Non-transient faults (missing adapter, storage errors)
    /// propagate after releasing the claim.
    pub async fn execute(
        &self,
        schedule: &ScanSchedule,
        platform: &PlatformDefinition,
        terms: &ClientTerms,
    ) -> Result<ScanOutcome> {
        let scanner = self
            .scanners
            .get(platform.scanner())
            .ok_or_else(|| ScanError::MissingScanner {
                scanner_ref: platform.scanner().to_string(),
            });

        let scanner = match scanner {
            Ok(scanner) => scanner,
            Err(e) => {
                schedules::release_claim(self.db.pool(), &schedule.client_id, &schedule.platform_id)
                    .await?;
                return Err(e);
            }
        };

        let result = match tokio::time::timeout(self.attempt_timeout, scanner.scan(platform, terms))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ScanError::Timeout {
                platform_id: schedule.platform_id.clone(),
                timeout: self.attempt_timeout,
            }),
        };

        match result {
            Ok(report) => self.complete(schedule, platform, report).await,
            Err(e) if e.is_transient() => self.record_transient_failure(schedule, platform, &e).await,
            Err(e) => {
                schedules::release_claim(self.db.pool(), &schedule.client_id, &schedule.platform_id)
                    .await?;
                Err(e)
            }
        }
    }

    /// Persist a completed scan and hand off to the case manager.
    async fn complete(
        &self,
        schedule: &ScanSchedule,
        platform: &PlatformDefinition,
        report: ScanReport,
    ) -> Result<ScanOutcome> {
        let digest = report.evidence.as_deref().map(evidence_digest);

        let check = checks::insert_check(
            self.db.pool(),
            NewCheck {
                client_id: schedule.client_id.clone(),
                platform_id: schedule.platform_id.clone(),
                exposed_count: report.exposed_count,
                partner_company: report.partner_company,
                partner_country: report.partner_country,
                evidence: report.evidence,
                evidence_digest: digest,
            },
        )
        .await?;

        let now = Utc::now();
        let next_due = now + platform.cadence();
        schedules::record_success(
            self.db.pool(),
            &schedule.client_id,
            &schedule.platform_id,
            now,
            next_due,
        )
        .await?;

        info!(
            client_id = %check.client_id,
            platform_id = %check.platform_id,
            exposed_count = check.exposed_count,
            evidence_digest = check.evidence_digest.as_deref().unwrap_or("-"),
            "scan completed"
        );

        if check.exposed_count > 0 {
            self.cases.record_exposure(&check).await?;
        } else {
            self.cases.record_clear(&check).await?;
        }

        Ok(ScanOutcome {
            check: Some(check),
            schedule_status: ScheduleStatus::Active,
            error: None,
        })
    }

    /// Record a transient failure: backoff, counter, possible alert.
    async fn record_transient_failure(
        &self,
        schedule: &ScanSchedule,
        platform: &PlatformDefinition,
        error: &ScanError,
    ) -> Result<ScanOutcome> {
        let delay = backoff_delay(
            platform.cadence(),
            schedule.consecutive_failures,
            self.backoff_exponent_cap,
        );
        let next_due = Utc::now() + delay;

        let status =
            schedules::record_failure(self.db.pool(), schedule, next_due, self.alert_threshold)
                .await?;

        if status == ScheduleStatus::Alert {
            warn!(
                client_id = %schedule.client_id,
                platform_id = %schedule.platform_id,
                failures = schedule.consecutive_failures + 1,
                error = %error,
                "scan failure threshold reached; schedule needs operator attention"
            );
        } else {
            warn!(
                client_id = %schedule.client_id,
                platform_id = %schedule.platform_id,
                failures = schedule.consecutive_failures + 1,
                retry_at = %next_due.to_rfc3339(),
                error = %error,
                "scan failed; retrying with backoff"
            );
        }

        Ok(ScanOutcome {
            check: None,
            schedule_status: status,
            error: Some(error.to_string()),
        })
    }
}

/// Backoff delay after a transient failure.
///
/// `failures_before` is the consecutive-failure count prior to this
/// failure, so the first retry waits one cadence, then doubles each time,
/// capped at `2^cap` cadences.
#[must_use]
pub fn backoff_delay(cadence: Duration, failures_before: u32, cap: u32) -> Duration {
    let exponent = failures_before.min(cap);
    cadence * 2_i32.pow(exponent)
}

/// SHA-256 hex of an evidence blob (for logging — never log the blob itself).
#[must_use]
pub fn evidence_digest(evidence: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(evidence);
    hex::encode(hasher.finalize())
}
