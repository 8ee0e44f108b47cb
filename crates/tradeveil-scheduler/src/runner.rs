//! Engine runner: the periodic tick that drives everything.

use crate::error::{Result, SchedulerError};
use crate::scheduler::ScanScheduler;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tradeveil_case::{CaseManager, TakedownDispatcher};
use tradeveil_core::{AppConfig, ClientId, PlatformId};
use tradeveil_db::{schedules, Database, ScanSchedule};
use tradeveil_notify::Notifier;
use tradeveil_platform::PlatformRegistry;
use tradeveil_scanner::{ScanExecutor, ScanOutcome, ScannerSet, TermsSource};

/// Counters from one scheduler tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    /// Stale claims released (crashed workers)
    pub stale_claims_released: u64,
    /// Cases escalated after the response timeout
    pub cases_escalated: u32,
    /// Removal requests submitted for detected cases
    pub requests_submitted: u32,
    /// Escalated cases re-submitted
    pub requests_resubmitted: u32,
    /// Cases failed permanently (attempt budget exhausted)
    pub cases_failed: u32,
    /// Pending notifications delivered
    pub notifications_delivered: u32,
    /// Scans claimed and dispatched this tick
    pub scans_dispatched: u32,
    /// Dispatched scans that completed with a recorded check
    pub scans_completed: u32,
    /// Dispatched scans that failed (transient or hard)
    pub scans_failed: u32,
}

/// Wires registry, scheduler, executor, case manager and notifier into one
/// periodically-ticking engine.
pub struct EngineRunner {
    db: Arc<Database>,
    registry: PlatformRegistry,
    scanners: Arc<ScannerSet>,
    scheduler: ScanScheduler,
    executor: Arc<ScanExecutor>,
    cases: Arc<CaseManager>,
    notifier: Arc<Notifier>,
    dispatcher: Arc<dyn TakedownDispatcher>,
    terms: Arc<dyn TermsSource>,
    tick_interval: std::time::Duration,
    max_concurrent_scans: usize,
    claim_lease: Duration,
    shutdown: CancellationToken,
}

impl EngineRunner {
    /// Assemble the engine from its components and configuration.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        registry: PlatformRegistry,
        scanners: Arc<ScannerSet>,
        executor: Arc<ScanExecutor>,
        cases: Arc<CaseManager>,
        notifier: Arc<Notifier>,
        dispatcher: Arc<dyn TakedownDispatcher>,
        terms: Arc<dyn TermsSource>,
        config: &AppConfig,
    ) -> Self {
        let scheduler = ScanScheduler::new(db.clone(), config.scheduler.per_platform_inflight);

        Self {
            db,
            registry,
            scanners,
            scheduler,
            executor,
            cases,
            notifier,
            dispatcher,
            terms,
            tick_interval: std::time::Duration::from_secs(config.scheduler.tick_interval_secs),
            max_concurrent_scans: config.scheduler.max_concurrent_scans.max(1),
            claim_lease: Duration::minutes(i64::from(config.scheduler.claim_lease_minutes)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Startup validation: every registry platform must resolve a scanner.
    ///
    /// A platform nobody can scan is a configuration error; the engine must
    /// refuse to start rather than silently skip it.
    ///
    /// # Errors
    /// Returns `SchedulerError::Config` naming the first unresolved ref.
    pub fn validate(&self) -> Result<()> {
        for definition in self.registry.get_all() {
            if !self.scanners.contains(definition.scanner()) {
                return Err(SchedulerError::Config(format!(
                    "platform '{}' references unknown scanner '{}'",
                    definition.id(),
                    definition.scanner()
                )));
            }
        }
        Ok(())
    }

    /// Token that stops [`EngineRunner::run`] when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Enroll a client on a platform for monitoring.
    ///
    /// The first scan is due immediately; the pair then follows the
    /// platform's cadence.
    ///
    /// # Errors
    /// Returns error if the platform is not in the registry or the insert
    /// fails.
    pub async fn enroll(
        &self,
        client: &ClientId,
        platform: &PlatformId,
        now: DateTime<Utc>,
    ) -> Result<ScanSchedule> {
        // Fail enrollment early rather than creating a row nobody can scan
        self.registry.get(platform)?;

        let schedule =
            schedules::enroll(self.db.pool(), client.as_str(), platform.as_str(), now).await?;

        info!(
            client_id = %client,
            platform_id = %platform,
            "client enrolled for platform monitoring"
        );

        Ok(schedule)
    }

    /// Disenroll a client: pause all schedules, cancel cases still in
    /// `Detected`. In-flight scans finish; no new ones are dispatched.
    ///
    /// Returns `(schedules_paused, cases_cancelled)`.
    ///
    /// # Errors
    /// Returns error if a storage operation fails.
    pub async fn disenroll(&self, client: &ClientId) -> Result<(u64, u32)> {
        let paused = schedules::pause_for_client(self.db.pool(), client.as_str()).await?;
        let cancelled = self.cases.cancel_for_client(client.as_str()).await?;

        info!(
            client_id = %client,
            paused,
            cancelled,
            "client disenrolled"
        );

        Ok((paused, cancelled))
    }

    /// Run the engine until the shutdown token fires.
    ///
    /// Cadences are measured in days, so a repeating tick (rather than a
    /// wait queue) is plenty; a small random jitter keeps multiple engine
    /// processes from ticking in lockstep.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tick_interval_secs = self.tick_interval.as_secs(),
            max_concurrent_scans = self.max_concurrent_scans,
            "engine runner started"
        );

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("engine runner shutting down");
                    break;
                }
                _ = interval.tick() => {}
            }

            let jitter_ms = { rand::thread_rng().gen_range(0..250) };
            tokio::time::sleep(std::time::Duration::from_millis(jitter_ms)).await;

            match self.tick(Utc::now()).await {
                Ok(summary) => debug!(?summary, "scheduler tick complete"),
                Err(e) => error!(error = %e, "scheduler tick failed"),
            }
        }
    }

    /// One full engine tick.
    ///
    /// Order matters: case housekeeping (timeouts, submissions, retries,
    /// notification flushing) runs before scan dispatch so the tick's scans
    /// see settled case state.
    ///
    /// # Errors
    /// Returns error on storage faults; individual scan failures are
    /// tallied, not propagated.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        let mut summary = TickSummary {
            stale_claims_released: schedules::release_stale_claims(
                self.db.pool(),
                now - self.claim_lease,
            )
            .await?,
            ..TickSummary::default()
        };

        summary.cases_escalated = self.cases.sweep_timeouts(now).await?;
        summary.requests_submitted = self.cases.submit_pending(self.dispatcher.as_ref()).await?;
        let (resubmitted, failed) = self.cases.retry_escalated(self.dispatcher.as_ref()).await?;
        summary.requests_resubmitted = resubmitted;
        summary.cases_failed = failed;
        summary.notifications_delivered = self.notifier.flush_pending().await?;

        let planned = self.scheduler.plan(now).await?;

        let mut futures = FuturesUnordered::new();
        for item in planned {
            // Another tick (or another engine process) may have won the
            // claim between planning and here; losing is normal.
            if !self.scheduler.claim(&item, now).await? {
                continue;
            }
            summary.scans_dispatched += 1;
            futures.push(self.run_one(item));

            while futures.len() >= self.max_concurrent_scans {
                if let Some(result) = futures.next().await {
                    Self::tally(&mut summary, result);
                }
            }
        }

        while let Some(result) = futures.next().await {
            Self::tally(&mut summary, result);
        }

        Ok(summary)
    }

    /// Execute one claimed schedule through the executor.
    async fn run_one(&self, schedule: ScanSchedule) -> Result<ScanOutcome> {
        let platform_id = PlatformId::new(schedule.platform_id.as_str())
            .map_err(|e| SchedulerError::Validation(e.to_string()))?;

        let definition = match self.registry.get(&platform_id) {
            Ok(definition) => definition,
            Err(e) => {
                // Platform left the registry after the schedule was created;
                // release the claim so the pair isn't wedged.
                schedules::release_claim(self.db.pool(), &schedule.client_id, &schedule.platform_id)
                    .await?;
                return Err(e.into());
            }
        };

        let terms = match self.terms.terms_for(&schedule.client_id).await {
            Ok(terms) => terms,
            Err(e) => {
                schedules::release_claim(self.db.pool(), &schedule.client_id, &schedule.platform_id)
                    .await?;
                return Err(e.into());
            }
        };

        Ok(self.executor.execute(&schedule, &definition, &terms).await?)
    }

    fn tally(summary: &mut TickSummary, result: Result<ScanOutcome>) {
        match result {
            Ok(outcome) if outcome.error.is_none() => summary.scans_completed += 1,
            Ok(_) => summary.scans_failed += 1,
            Err(e) => {
                error!(error = %e, "scan task failed");
                summary.scans_failed += 1;
            }
        }
    }
}
