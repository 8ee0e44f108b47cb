use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tradeveil_case::{CaseManager, DispatchError, TakedownDispatcher};
use tradeveil_core::{AppConfig, ClientId, PlatformId};
use tradeveil_db::cases::get_open_case;
use tradeveil_db::{reporting, schedules, CaseState, Database, ScheduleStatus};
use tradeveil_notify::{MemorySink, Notifier};
use tradeveil_platform::{
    PlatformDefinition, PlatformKind, PlatformMetadata, PlatformRegistry, RiskTier,
};
use tradeveil_scanner::{
    ClientTerms, ScanExecutor, ScanReport, ScannerAdapter, ScannerSet, StaticTermsSource,
};
use tradeveil_scheduler::{EngineRunner, SchedulerError};

const CLIENT: &str = "550e8400-e29b-41d4-a716-446655440000";
const OTHER_CLIENT: &str = "660e8400-e29b-41d4-a716-446655440000";

/// Adapter whose reported exposure count can be flipped mid-test.
struct SwitchableScanner {
    exposed: Arc<AtomicU32>,
    scans: Arc<AtomicU32>,
}

#[async_trait]
impl ScannerAdapter for SwitchableScanner {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn scan(
        &self,
        _platform: &PlatformDefinition,
        _terms: &ClientTerms,
    ) -> tradeveil_scanner::Result<ScanReport> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let exposed = self.exposed.load(Ordering::SeqCst);
        Ok(ScanReport {
            exposed_count: exposed,
            partner_company: (exposed > 0).then(|| "Harbor Line SA".to_string()),
            partner_country: (exposed > 0).then(|| "PA".to_string()),
            evidence: (exposed > 0).then(|| b"manifest rows".to_vec()),
        })
    }
}

struct CountingDispatcher {
    submissions: AtomicU32,
}

#[async_trait]
impl TakedownDispatcher for CountingDispatcher {
    async fn submit(
        &self,
        _case_id: &str,
        platform_id: &str,
        _evidence_ref: &str,
    ) -> Result<String, DispatchError> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("req-{platform_id}-{n}"))
    }
}

fn platform_definition(id: &str) -> PlatformDefinition {
    PlatformDefinition {
        platform: PlatformMetadata {
            id: PlatformId::new(id).expect("valid platform ID"),
            name: format!("Test {id}"),
            url: format!("https://{id}.example.com"),
            kind: PlatformKind::Commercial,
            risk_tier: RiskTier::VeryHigh,
            cadence_override_days: None,
            scanner: "fixture".to_string(),
        },
    }
}

struct TestEngine {
    db: Arc<Database>,
    runner: EngineRunner,
    sink: MemorySink,
    exposed: Arc<AtomicU32>,
    scans: Arc<AtomicU32>,
}

async fn setup(platforms: &[&str], config: AppConfig) -> TestEngine {
    let key = vec![0u8; 32];
    let db = Arc::new(
        Database::open(":memory:", key)
            .await
            .expect("open database"),
    );
    db.run_migrations().await.expect("run migrations");

    let registry = PlatformRegistry::new();
    for id in platforms {
        registry
            .insert(platform_definition(id))
            .expect("insert platform");
    }

    let exposed = Arc::new(AtomicU32::new(0));
    let scans = Arc::new(AtomicU32::new(0));
    let mut scanners = ScannerSet::new();
    scanners.register(Arc::new(SwitchableScanner {
        exposed: exposed.clone(),
        scans: scans.clone(),
    }));
    let scanners = Arc::new(scanners);

    let sink = MemorySink::new();
    let notifier = Arc::new(Notifier::new(
        db.clone(),
        vec![Arc::new(sink.clone())],
        config.notifications.max_delivery_attempts,
    ));

    let cases = Arc::new(CaseManager::new(
        db.clone(),
        notifier.clone(),
        config.takedown.max_submission_attempts,
        Duration::days(i64::from(config.takedown.response_timeout_days)),
    ));

    let executor = Arc::new(ScanExecutor::new(
        db.clone(),
        scanners.clone(),
        cases.clone(),
        std::time::Duration::from_secs(config.scan.attempt_timeout_secs),
        config.scan.failure_alert_threshold,
        config.scan.backoff_exponent_cap,
    ));

    let mut terms = StaticTermsSource::new();
    terms.insert(CLIENT, ClientTerms::for_company("Meridian Exports Ltd"));
    terms.insert(OTHER_CLIENT, ClientTerms::for_company("Baltic Freight OU"));

    let dispatcher = Arc::new(CountingDispatcher {
        submissions: AtomicU32::new(0),
    });

    let runner = EngineRunner::new(
        db.clone(),
        registry,
        scanners,
        executor,
        cases,
        notifier,
        dispatcher,
        Arc::new(terms),
        &config,
    );

    TestEngine {
        db,
        runner,
        sink,
        exposed,
        scans,
    }
}

fn client_id(s: &str) -> ClientId {
    ClientId::new(s).expect("valid client ID")
}

fn platform_id(s: &str) -> PlatformId {
    PlatformId::new(s).expect("valid platform ID")
}

/// Force a pair's next_due_at into the past so the next tick rescans it.
async fn make_due(db: &Database, client: &str, platform: &str) {
    sqlx::query(
        "UPDATE scan_schedules SET next_due_at = ? WHERE client_id = ? AND platform_id = ?",
    )
    .bind((Utc::now() - Duration::hours(1)).to_rfc3339())
    .bind(client)
    .bind(platform)
    .execute(db.pool())
    .await
    .expect("rewind next_due_at");
}

#[tokio::test]
async fn validate_accepts_resolved_scanner_refs() {
    let engine = setup(&["importgenius", "panjiva"], AppConfig::default()).await;
    engine.runner.validate().expect("fixture scanner resolves");
}

#[tokio::test]
async fn validate_fails_for_missing_scanner() {
    let key = vec![0u8; 32];
    let db = Arc::new(
        Database::open(":memory:", key)
            .await
            .expect("open database"),
    );
    db.run_migrations().await.expect("run migrations");

    let registry = PlatformRegistry::new();
    let mut definition = platform_definition("panjiva");
    definition.platform.scanner = "nonexistent".to_string();
    registry.insert(definition).expect("insert platform");

    let scanners = Arc::new(ScannerSet::new());
    let config = AppConfig::default();
    let sink = MemorySink::new();
    let notifier = Arc::new(Notifier::new(db.clone(), vec![Arc::new(sink)], 5));
    let cases = Arc::new(CaseManager::new(
        db.clone(),
        notifier.clone(),
        3,
        Duration::days(30),
    ));
    let executor = Arc::new(ScanExecutor::new(
        db.clone(),
        scanners.clone(),
        cases.clone(),
        std::time::Duration::from_secs(30),
        5,
        5,
    ));
    let dispatcher = Arc::new(CountingDispatcher {
        submissions: AtomicU32::new(0),
    });
    let runner = EngineRunner::new(
        db,
        registry,
        scanners,
        executor,
        cases,
        notifier,
        dispatcher,
        Arc::new(StaticTermsSource::new()),
        &config,
    );

    let result = runner.validate();
    assert!(matches!(result.unwrap_err(), SchedulerError::Config(_)));
}

#[tokio::test]
async fn tick_scans_due_pairs_and_opens_cases() {
    let engine = setup(&["importgenius", "panjiva"], AppConfig::default()).await;
    engine.exposed.store(2, Ordering::SeqCst);

    let now = Utc::now();
    engine
        .runner
        .enroll(&client_id(CLIENT), &platform_id("importgenius"), now)
        .await
        .expect("enroll ig");
    engine
        .runner
        .enroll(&client_id(CLIENT), &platform_id("panjiva"), now)
        .await
        .expect("enroll panjiva");

    let summary = engine.runner.tick(now).await.expect("tick");

    assert_eq!(summary.scans_dispatched, 2);
    assert_eq!(summary.scans_completed, 2);
    assert_eq!(summary.scans_failed, 0);
    assert_eq!(engine.scans.load(Ordering::SeqCst), 2);

    // Both pairs now carry open cases in Detected
    for platform in ["importgenius", "panjiva"] {
        let case = get_open_case(engine.db.pool(), CLIENT, platform)
            .await
            .expect("get open case")
            .expect("case opened");
        assert_eq!(case.state, CaseState::Detected);
    }

    // Nothing is due anymore: cadence advanced a week out
    let summary = engine.runner.tick(Utc::now()).await.expect("second tick");
    assert_eq!(summary.scans_dispatched, 0);
    // The second tick submitted the removal requests opened by the first
    assert_eq!(summary.requests_submitted, 2);
}

#[tokio::test]
async fn tick_respects_per_platform_inflight_cap() {
    let mut config = AppConfig::default();
    config.scheduler.per_platform_inflight = 1;
    let engine = setup(&["importgenius"], config).await;

    let now = Utc::now();
    engine
        .runner
        .enroll(&client_id(CLIENT), &platform_id("importgenius"), now)
        .await
        .expect("enroll client 1");
    engine
        .runner
        .enroll(&client_id(OTHER_CLIENT), &platform_id("importgenius"), now)
        .await
        .expect("enroll client 2");

    let summary = engine.runner.tick(now).await.expect("tick");

    // Only one of the two clients goes out this tick
    assert_eq!(summary.scans_dispatched, 1);

    // The deferred client is picked up on the next tick
    let summary = engine.runner.tick(Utc::now()).await.expect("second tick");
    assert_eq!(summary.scans_dispatched, 1);
    assert_eq!(engine.scans.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn disenrolled_client_is_not_scanned() {
    let engine = setup(&["importgenius"], AppConfig::default()).await;

    let now = Utc::now();
    engine
        .runner
        .enroll(&client_id(CLIENT), &platform_id("importgenius"), now)
        .await
        .expect("enroll");

    let (paused, cancelled) = engine
        .runner
        .disenroll(&client_id(CLIENT))
        .await
        .expect("disenroll");
    assert_eq!(paused, 1);
    assert_eq!(cancelled, 0);

    let summary = engine.runner.tick(now).await.expect("tick");
    assert_eq!(summary.scans_dispatched, 0);
    assert_eq!(engine.scans.load(Ordering::SeqCst), 0);

    let schedule = schedules::get(engine.db.pool(), CLIENT, "importgenius")
        .await
        .expect("get")
        .expect("schedule kept, not deleted");
    assert_eq!(schedule.status, ScheduleStatus::Paused);
}

#[tokio::test]
async fn disenrollment_cancels_detected_case() {
    let engine = setup(&["importgenius"], AppConfig::default()).await;
    engine.exposed.store(1, Ordering::SeqCst);

    let now = Utc::now();
    engine
        .runner
        .enroll(&client_id(CLIENT), &platform_id("importgenius"), now)
        .await
        .expect("enroll");
    engine.runner.tick(now).await.expect("tick");

    let (paused, cancelled) = engine
        .runner
        .disenroll(&client_id(CLIENT))
        .await
        .expect("disenroll");
    assert_eq!(paused, 1);
    assert_eq!(cancelled, 1);

    assert!(get_open_case(engine.db.pool(), CLIENT, "importgenius")
        .await
        .expect("get open case")
        .is_none());
}

#[tokio::test]
async fn enroll_rejects_unknown_platform() {
    let engine = setup(&["importgenius"], AppConfig::default()).await;

    let result = engine
        .runner
        .enroll(&client_id(CLIENT), &platform_id("unknown-platform"), Utc::now())
        .await;

    assert!(matches!(result.unwrap_err(), SchedulerError::Platform(_)));
}

#[tokio::test]
async fn exposure_to_resolution_across_ticks() {
    let engine = setup(&["importgenius"], AppConfig::default()).await;
    engine.exposed.store(1, Ordering::SeqCst);

    let now = Utc::now();
    engine
        .runner
        .enroll(&client_id(CLIENT), &platform_id("importgenius"), now)
        .await
        .expect("enroll");

    // Tick 1: scan finds exposure, case opens in Detected
    engine.runner.tick(now).await.expect("tick 1");
    let case = get_open_case(engine.db.pool(), CLIENT, "importgenius")
        .await
        .expect("get open case")
        .expect("case opened");
    assert_eq!(case.state, CaseState::Detected);

    // Tick 2: removal request goes out, case waits for a response
    let summary = engine.runner.tick(Utc::now()).await.expect("tick 2");
    assert_eq!(summary.requests_submitted, 1);
    let case = get_open_case(engine.db.pool(), CLIENT, "importgenius")
        .await
        .expect("get open case")
        .expect("case open");
    assert_eq!(case.state, CaseState::PendingResponse);

    // The platform takes the listing down; the next scan verifies it
    engine.exposed.store(0, Ordering::SeqCst);
    make_due(&engine.db, CLIENT, "importgenius").await;

    let summary = engine.runner.tick(Utc::now()).await.expect("tick 3");
    assert_eq!(summary.scans_completed, 1);

    assert!(get_open_case(engine.db.pool(), CLIENT, "importgenius")
        .await
        .expect("get open case")
        .is_none());

    // Notifications covered Detected and Resolved
    let states: Vec<CaseState> = engine.sink.events().iter().map(|e| e.state).collect();
    assert!(states.contains(&CaseState::Detected));
    assert!(states.contains(&CaseState::Resolved));

    // The dashboard projection reflects engine state, not its own logic
    let status = reporting::platform_status(engine.db.pool(), CLIENT)
        .await
        .expect("platform status");
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].status, ScheduleStatus::Active);
    assert!(status[0].open_case_state.is_none());

    let cases = reporting::case_list(engine.db.pool(), CLIENT, true)
        .await
        .expect("case list");
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].state, CaseState::Resolved);
}

#[tokio::test]
async fn overdue_case_escalates_on_tick() {
    let mut config = AppConfig::default();
    config.takedown.response_timeout_days = 30;
    let engine = setup(&["importgenius"], config).await;
    engine.exposed.store(1, Ordering::SeqCst);

    let now = Utc::now();
    engine
        .runner
        .enroll(&client_id(CLIENT), &platform_id("importgenius"), now)
        .await
        .expect("enroll");
    engine.runner.tick(now).await.expect("tick 1");
    engine.runner.tick(Utc::now()).await.expect("tick 2");

    // 31 days of silence from the platform
    let summary = engine
        .runner
        .tick(Utc::now() + Duration::days(31))
        .await
        .expect("tick 3");
    assert_eq!(summary.cases_escalated, 1);
    // The same tick immediately re-submits the escalated case
    assert_eq!(summary.requests_resubmitted, 1);

    assert!(engine
        .sink
        .events()
        .iter()
        .any(|e| e.state == CaseState::Escalated));
}
