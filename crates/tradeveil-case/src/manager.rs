//! Case lifecycle orchestration.

use crate::dispatch::TakedownDispatcher;
use crate::error::{CaseError, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tradeveil_db::{cases, AnonymityCheck, CaseState, Database, DatabaseError, TakedownCase};
use tradeveil_notify::Notifier;

/// Drives takedown cases through their lifecycle.
///
/// Within a (client, platform) pair every operation is serialized by the
/// one-open-case invariant and the guarded state transitions; across pairs
/// the manager is freely concurrent.
pub struct CaseManager {
    db: Arc<Database>,
    notifier: Arc<Notifier>,
    max_submission_attempts: u32,
    response_timeout: Duration,
}

impl CaseManager {
    /// Create a case manager.
    ///
    /// `response_timeout` bounds how long a case may sit in
    /// `PendingResponse`; `max_submission_attempts` bounds removal-request
    /// submissions before a case fails permanently.
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        notifier: Arc<Notifier>,
        max_submission_attempts: u32,
        response_timeout: Duration,
    ) -> Self {
        Self {
            db,
            notifier,
            max_submission_attempts,
            response_timeout,
        }
    }

    /// Handle a scan that found exposure.
    ///
    /// Opens a case in `Detected` unless one is already open for the
    /// (client, platform) pair — replaying the same check, or a second
    /// exposed scan before resolution, returns the existing case untouched.
    pub async fn record_exposure(&self, check: &AnonymityCheck) -> Result<TakedownCase> {
        if let Some(open) = cases::get_open_case(self.db.pool(), &check.client_id, &check.platform_id)
            .await?
        {
            debug!(
                case_id = %open.id,
                client_id = %check.client_id,
                platform_id = %check.platform_id,
                "exposure already tracked by open case"
            );
            return Ok(open);
        }

        match cases::open_case(
            self.db.pool(),
            &check.client_id,
            &check.platform_id,
            &check.id,
            Utc::now(),
        )
        .await
        {
            Ok(case) => {
                info!(
                    case_id = %case.id,
                    client_id = %case.client_id,
                    platform_id = %case.platform_id,
                    exposed_count = check.exposed_count,
                    "opened takedown case"
                );
                self.announce(&case).await;
                Ok(case)
            }
            // Lost the open race to a concurrent worker: their case wins.
            Err(DatabaseError::OpenCaseExists { .. }) => {
                cases::get_open_case(self.db.pool(), &check.client_id, &check.platform_id)
                    .await?
                    .ok_or_else(|| {
                        CaseError::NotFound(format!(
                            "open case for {}/{}",
                            check.client_id, check.platform_id
                        ))
                    })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Handle a scan that found no exposure.
    ///
    /// A case waiting in `PendingResponse` is verified and resolved by the
    /// clean scan. A clean scan against a case in any other state is
    /// ignored: verification is only meaningful once a removal request is
    /// out and awaiting its effect.
    pub async fn record_clear(&self, check: &AnonymityCheck) -> Result<Option<TakedownCase>> {
        let Some(open) =
            cases::get_open_case(self.db.pool(), &check.client_id, &check.platform_id).await?
        else {
            return Ok(None);
        };

        if open.state != CaseState::PendingResponse {
            debug!(
                case_id = %open.id,
                state = %open.state,
                "clean scan while case not pending verification; ignoring"
            );
            return Ok(None);
        }

        let now = Utc::now();
        let verified = match cases::transition(
            self.db.pool(),
            &open.id,
            CaseState::PendingResponse,
            CaseState::Verified,
            now,
            Some(format!("verified by check {}", check.id)),
            None,
            None,
            false,
        )
        .await
        {
            Ok(case) => case,
            Err(DatabaseError::InvalidTransition { .. }) => {
                debug!(case_id = %open.id, "case moved on before verification; ignoring");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let resolved = cases::transition(
            self.db.pool(),
            &verified.id,
            CaseState::Verified,
            CaseState::Resolved,
            now,
            None,
            None,
            Some("removal verified by follow-up scan".to_string()),
            false,
        )
        .await?;

        info!(
            case_id = %resolved.id,
            client_id = %resolved.client_id,
            platform_id = %resolved.platform_id,
            "takedown case resolved"
        );
        self.announce(&resolved).await;

        Ok(Some(resolved))
    }

    /// Submit removal requests for all cases still in `Detected`.
    ///
    /// Dispatch failures are logged and left for the next sweep; a case only
    /// advances once the dispatcher hands back a request reference. Returns
    /// the number of cases submitted.
    pub async fn submit_pending(&self, dispatcher: &dyn TakedownDispatcher) -> Result<u32> {
        let detected = cases::cases_in_state(self.db.pool(), CaseState::Detected).await?;

        let mut submitted = 0;
        for case in detected {
            match self.submit_one(dispatcher, &case).await {
                Ok(true) => submitted += 1,
                Ok(false) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(submitted)
    }

    /// Escalate `PendingResponse` cases whose response window has elapsed.
    ///
    /// Returns the number of cases escalated.
    pub async fn sweep_timeouts(&self, now: DateTime<Utc>) -> Result<u32> {
        let cutoff = now - self.response_timeout;
        let overdue = cases::pending_response_older_than(self.db.pool(), cutoff).await?;

        let mut escalated = 0;
        for case in overdue {
            match cases::transition(
                self.db.pool(),
                &case.id,
                CaseState::PendingResponse,
                CaseState::Escalated,
                now,
                Some(format!(
                    "no resolution within {} days",
                    self.response_timeout.num_days()
                )),
                None,
                None,
                false,
            )
            .await
            {
                Ok(escalated_case) => {
                    warn!(
                        case_id = %escalated_case.id,
                        client_id = %escalated_case.client_id,
                        platform_id = %escalated_case.platform_id,
                        "takedown case escalated after response timeout"
                    );
                    self.announce(&escalated_case).await;
                    escalated += 1;
                }
                Err(DatabaseError::InvalidTransition { .. }) => {
                    debug!(case_id = %case.id, "case moved on before escalation; skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(escalated)
    }

    /// Re-attempt or permanently fail `Escalated` cases.
    ///
    /// Cases below the submission bound are re-submitted; cases at the bound
    /// become `Failed` (terminal, manual closure). Returns
    /// `(resubmitted, failed)` counts.
    pub async fn retry_escalated(&self, dispatcher: &dyn TakedownDispatcher) -> Result<(u32, u32)> {
        let escalated = cases::cases_in_state(self.db.pool(), CaseState::Escalated).await?;

        let mut resubmitted = 0;
        let mut failed = 0;
        for case in escalated {
            if case.attempts >= self.max_submission_attempts {
                let failed_case = cases::transition(
                    self.db.pool(),
                    &case.id,
                    CaseState::Escalated,
                    CaseState::Failed,
                    Utc::now(),
                    Some("submission attempts exhausted".to_string()),
                    None,
                    Some(format!(
                        "failed after {} removal-request submissions",
                        case.attempts
                    )),
                    false,
                )
                .await?;

                warn!(
                    case_id = %failed_case.id,
                    attempts = case.attempts,
                    "takedown case failed permanently"
                );
                self.announce(&failed_case).await;
                failed += 1;
            } else if self.submit_one(dispatcher, &case).await? {
                resubmitted += 1;
            }
        }

        Ok((resubmitted, failed))
    }

    /// Cancel a disenrolled client's cases that never left `Detected`.
    ///
    /// Cases further along stay open: a removal request already sent is
    /// still worth tracking to its end. Returns the number of cases
    /// cancelled.
    pub async fn cancel_for_client(&self, client_id: &str) -> Result<u32> {
        let open = cases::cases_for_client(self.db.pool(), client_id, false).await?;

        let mut cancelled = 0;
        for case in open {
            if case.state != CaseState::Detected {
                continue;
            }

            match cases::transition(
                self.db.pool(),
                &case.id,
                CaseState::Detected,
                CaseState::Cancelled,
                Utc::now(),
                Some("client disenrolled".to_string()),
                None,
                Some("cancelled on disenrollment".to_string()),
                false,
            )
            .await
            {
                Ok(cancelled_case) => {
                    self.announce(&cancelled_case).await;
                    cancelled += 1;
                }
                Err(DatabaseError::InvalidTransition { .. }) => {
                    debug!(case_id = %case.id, "case moved on before cancellation; skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(cancelled)
    }

    /// Dispatch one removal request and advance the case to
    /// `PendingResponse`. Returns whether the submission happened.
    async fn submit_one(
        &self,
        dispatcher: &dyn TakedownDispatcher,
        case: &TakedownCase,
    ) -> Result<bool> {
        let request_id = match dispatcher
            .submit(&case.id, &case.platform_id, &case.evidence_ref)
            .await
        {
            Ok(request_id) => request_id,
            Err(e) => {
                warn!(
                    case_id = %case.id,
                    platform_id = %case.platform_id,
                    error = %e,
                    "removal request dispatch failed; will retry next sweep"
                );
                return Ok(false);
            }
        };

        let now = Utc::now();
        let submitted = match cases::transition(
            self.db.pool(),
            &case.id,
            case.state,
            CaseState::RequestSubmitted,
            now,
            None,
            Some(request_id.clone()),
            None,
            true,
        )
        .await
        {
            Ok(case) => case,
            Err(DatabaseError::InvalidTransition { .. }) => {
                debug!(case_id = %case.id, "case moved on before submission was recorded");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        cases::transition(
            self.db.pool(),
            &submitted.id,
            CaseState::RequestSubmitted,
            CaseState::PendingResponse,
            now,
            None,
            None,
            None,
            false,
        )
        .await?;

        info!(
            case_id = %case.id,
            platform_id = %case.platform_id,
            request_id = %request_id,
            attempt = submitted.attempts,
            "removal request submitted"
        );

        Ok(true)
    }

    /// Fire a notification for a case state, never blocking the transition.
    async fn announce(&self, case: &TakedownCase) {
        if let Err(e) = self.notifier.notify(case).await {
            warn!(
                case_id = %case.id,
                state = %case.state,
                error = %e,
                "failed to queue case notification"
            );
        }
    }
}
