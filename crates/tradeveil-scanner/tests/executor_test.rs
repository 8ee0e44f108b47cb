use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tradeveil_case::CaseManager;
use tradeveil_db::cases::get_open_case;
use tradeveil_db::{checks, schedules, CaseState, Database, ScheduleStatus};
use tradeveil_notify::{LogSink, Notifier};
use tradeveil_platform::{PlatformDefinition, PlatformKind, PlatformMetadata, RiskTier};
use tradeveil_scanner::{
    ClientTerms, Result, ScanError, ScanExecutor, ScanReport, ScannerAdapter, ScannerSet,
};
use tradeveil_core::PlatformId;

const CLIENT: &str = "550e8400-e29b-41d4-a716-446655440000";

/// Adapter that always reports the configured exposure count.
struct FixedScanner {
    name: String,
    exposed_count: u32,
}

#[async_trait]
impl ScannerAdapter for FixedScanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, _platform: &PlatformDefinition, _terms: &ClientTerms) -> Result<ScanReport> {
        Ok(ScanReport {
            exposed_count: self.exposed_count,
            partner_company: (self.exposed_count > 0).then(|| "Harbor Line SA".to_string()),
            partner_country: (self.exposed_count > 0).then(|| "PA".to_string()),
            evidence: (self.exposed_count > 0).then(|| b"bill-of-lading rows".to_vec()),
        })
    }
}

/// Adapter that always fails with the configured error.
struct BrokenScanner {
    name: String,
    mode: BrokenMode,
}

enum BrokenMode {
    RateLimited,
    Malformed,
    Hang,
}

#[async_trait]
impl ScannerAdapter for BrokenScanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, platform: &PlatformDefinition, _terms: &ClientTerms) -> Result<ScanReport> {
        match self.mode {
            BrokenMode::RateLimited => Err(ScanError::RateLimited {
                platform_id: platform.id().to_string(),
                retry_after: None,
            }),
            BrokenMode::Malformed => Err(ScanError::MalformedResponse {
                platform_id: platform.id().to_string(),
                reason: "search results table missing".to_string(),
            }),
            BrokenMode::Hang => {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok(ScanReport::clear())
            }
        }
    }
}

fn platform(id: &str, tier: RiskTier, scanner: &str) -> PlatformDefinition {
    PlatformDefinition {
        platform: PlatformMetadata {
            id: PlatformId::new(id).expect("valid platform ID"),
            name: format!("Test {id}"),
            url: format!("https://{id}.example.com"),
            kind: PlatformKind::Commercial,
            risk_tier: tier,
            cadence_override_days: None,
            scanner: scanner.to_string(),
        },
    }
}

struct TestHarness {
    db: Arc<Database>,
    executor: ScanExecutor,
}

async fn setup(scanners: ScannerSet, alert_threshold: u32) -> TestHarness {
    setup_with_timeout(scanners, alert_threshold, std::time::Duration::from_secs(30)).await
}

async fn setup_with_timeout(
    scanners: ScannerSet,
    alert_threshold: u32,
    attempt_timeout: std::time::Duration,
) -> TestHarness {
    let key = vec![0u8; 32];
    let db = Arc::new(
        Database::open(":memory:", key)
            .await
            .expect("open database"),
    );
    db.run_migrations().await.expect("run migrations");

    let notifier = Arc::new(Notifier::new(db.clone(), vec![Arc::new(LogSink)], 5));
    let cases = Arc::new(CaseManager::new(
        db.clone(),
        notifier,
        3,
        Duration::days(30),
    ));

    let executor = ScanExecutor::new(
        db.clone(),
        Arc::new(scanners),
        cases,
        attempt_timeout,
        alert_threshold,
        5,
    );

    TestHarness { db, executor }
}

#[tokio::test]
async fn successful_scan_advances_due_by_one_cadence() {
    // Scenario: VeryHigh tier, 7-day cadence; success at day 0 -> due day 7
    let mut scanners = ScannerSet::new();
    scanners.register(Arc::new(FixedScanner {
        name: "fixture".to_string(),
        exposed_count: 0,
    }));
    let harness = setup(scanners, 5).await;

    let def = platform("importgenius", RiskTier::VeryHigh, "fixture");
    let schedule = schedules::enroll(harness.db.pool(), CLIENT, "importgenius", Utc::now())
        .await
        .expect("enroll");

    let before = Utc::now();
    let outcome = harness
        .executor
        .execute(&schedule, &def, &ClientTerms::for_company("Meridian Exports Ltd"))
        .await
        .expect("execute");

    assert!(outcome.check.is_some());
    assert!(outcome.error.is_none());

    let updated = schedules::get(harness.db.pool(), CLIENT, "importgenius")
        .await
        .expect("get")
        .expect("schedule exists");
    assert_eq!(updated.status, ScheduleStatus::Active);
    assert_eq!(updated.consecutive_failures, 0);
    assert!(updated.claimed_at.is_none());

    let expected_due = before + Duration::days(7);
    let drift = (updated.next_due_at - expected_due).num_seconds().abs();
    assert!(drift < 5, "next_due_at drifted {drift}s from day 7");

    // next_due_at >= last_scan_at + cadence
    let last_scan = updated.last_scan_at.expect("last_scan_at");
    assert!(updated.next_due_at >= last_scan + Duration::days(7));
}

#[tokio::test]
async fn exposed_scan_records_check_and_opens_case() {
    let mut scanners = ScannerSet::new();
    scanners.register(Arc::new(FixedScanner {
        name: "fixture".to_string(),
        exposed_count: 3,
    }));
    let harness = setup(scanners, 5).await;

    let def = platform("importgenius", RiskTier::High, "fixture");
    let schedule = schedules::enroll(harness.db.pool(), CLIENT, "importgenius", Utc::now())
        .await
        .expect("enroll");

    let outcome = harness
        .executor
        .execute(&schedule, &def, &ClientTerms::for_company("Meridian Exports Ltd"))
        .await
        .expect("execute");

    let check = outcome.check.expect("check recorded");
    assert_eq!(check.exposed_count, 3);
    assert_eq!(check.partner_company.as_deref(), Some("Harbor Line SA"));
    assert!(check.evidence_digest.is_some());

    let case = get_open_case(harness.db.pool(), CLIENT, "importgenius")
        .await
        .expect("get open case")
        .expect("case opened");
    assert_eq!(case.state, CaseState::Detected);
    assert_eq!(case.evidence_ref, check.id);
}

#[tokio::test]
async fn clean_scan_records_check_without_case() {
    let mut scanners = ScannerSet::new();
    scanners.register(Arc::new(FixedScanner {
        name: "fixture".to_string(),
        exposed_count: 0,
    }));
    let harness = setup(scanners, 5).await;

    let def = platform("importgenius", RiskTier::High, "fixture");
    let schedule = schedules::enroll(harness.db.pool(), CLIENT, "importgenius", Utc::now())
        .await
        .expect("enroll");

    let outcome = harness
        .executor
        .execute(&schedule, &def, &ClientTerms::for_company("Meridian Exports Ltd"))
        .await
        .expect("execute");

    assert_eq!(outcome.check.expect("check recorded").exposed_count, 0);
    assert!(get_open_case(harness.db.pool(), CLIENT, "importgenius")
        .await
        .expect("get open case")
        .is_none());
}

#[tokio::test]
async fn transient_failures_back_off_exponentially() {
    // Scenario: 7-day cadence, 3 consecutive failures -> due at roughly
    // day 14, day 28, day 56 (delays of 7, 14, 28 days from each failure)
    let mut scanners = ScannerSet::new();
    scanners.register(Arc::new(BrokenScanner {
        name: "fixture".to_string(),
        mode: BrokenMode::RateLimited,
    }));
    let harness = setup(scanners, 5).await;

    let def = platform("importgenius", RiskTier::VeryHigh, "fixture");
    schedules::enroll(harness.db.pool(), CLIENT, "importgenius", Utc::now())
        .await
        .expect("enroll");

    let expected_delays = [7i64, 14, 28];
    for (i, expected_days) in expected_delays.iter().enumerate() {
        let schedule = schedules::get(harness.db.pool(), CLIENT, "importgenius")
            .await
            .expect("get")
            .expect("schedule exists");

        let before = Utc::now();
        let outcome = harness
            .executor
            .execute(&schedule, &def, &ClientTerms::for_company("Meridian Exports Ltd"))
            .await
            .expect("execute");

        assert!(outcome.check.is_none());
        assert!(outcome.error.is_some());

        let updated = schedules::get(harness.db.pool(), CLIENT, "importgenius")
            .await
            .expect("get")
            .expect("schedule exists");
        let failures = u32::try_from(i).expect("small index") + 1;
        assert_eq!(updated.consecutive_failures, failures);

        let expected_due = before + Duration::days(*expected_days);
        let drift = (updated.next_due_at - expected_due).num_seconds().abs();
        assert!(
            drift < 5,
            "failure {failures}: next_due_at drifted {drift}s from +{expected_days}d"
        );

        // Monotonic backoff: strictly later than a plain cadence advance
        if failures > 1 {
            assert!(updated.next_due_at > before + Duration::days(7));
        }
    }

    // No check rows were written for failed scans
    let recent = checks::recent_for_client(harness.db.pool(), CLIENT, 10)
        .await
        .expect("recent checks");
    assert!(recent.is_empty());
}

#[tokio::test]
async fn malformed_response_is_not_a_clean_scan() {
    let mut scanners = ScannerSet::new();
    scanners.register(Arc::new(BrokenScanner {
        name: "fixture".to_string(),
        mode: BrokenMode::Malformed,
    }));
    let harness = setup(scanners, 5).await;

    let def = platform("importgenius", RiskTier::High, "fixture");
    let schedule = schedules::enroll(harness.db.pool(), CLIENT, "importgenius", Utc::now())
        .await
        .expect("enroll");

    let outcome = harness
        .executor
        .execute(&schedule, &def, &ClientTerms::for_company("Meridian Exports Ltd"))
        .await
        .expect("execute");

    // Treated as a transient failure, never recorded as a result
    assert!(outcome.check.is_none());
    assert!(outcome.error.expect("error recorded").contains("malformed"));

    let recent = checks::recent_for_client(harness.db.pool(), CLIENT, 10)
        .await
        .expect("recent checks");
    assert!(recent.is_empty());

    let updated = schedules::get(harness.db.pool(), CLIENT, "importgenius")
        .await
        .expect("get")
        .expect("schedule exists");
    assert_eq!(updated.consecutive_failures, 1);
}

#[tokio::test]
async fn hung_adapter_times_out_as_transient_failure() {
    let mut scanners = ScannerSet::new();
    scanners.register(Arc::new(BrokenScanner {
        name: "fixture".to_string(),
        mode: BrokenMode::Hang,
    }));
    let harness =
        setup_with_timeout(scanners, 5, std::time::Duration::from_millis(50)).await;

    let def = platform("importgenius", RiskTier::High, "fixture");
    let schedule = schedules::enroll(harness.db.pool(), CLIENT, "importgenius", Utc::now())
        .await
        .expect("enroll");

    let outcome = harness
        .executor
        .execute(&schedule, &def, &ClientTerms::for_company("Meridian Exports Ltd"))
        .await
        .expect("execute");

    assert!(outcome.check.is_none());
    assert!(outcome.error.expect("error recorded").contains("timed out"));
}

#[tokio::test]
async fn failure_threshold_moves_schedule_to_alert() {
    let mut scanners = ScannerSet::new();
    scanners.register(Arc::new(BrokenScanner {
        name: "fixture".to_string(),
        mode: BrokenMode::RateLimited,
    }));
    let harness = setup(scanners, 3).await;

    let def = platform("importgenius", RiskTier::High, "fixture");
    schedules::enroll(harness.db.pool(), CLIENT, "importgenius", Utc::now())
        .await
        .expect("enroll");

    for _ in 0..3 {
        let schedule = schedules::get(harness.db.pool(), CLIENT, "importgenius")
            .await
            .expect("get")
            .expect("schedule exists");
        harness
            .executor
            .execute(&schedule, &def, &ClientTerms::for_company("Meridian Exports Ltd"))
            .await
            .expect("execute");
    }

    let updated = schedules::get(harness.db.pool(), CLIENT, "importgenius")
        .await
        .expect("get")
        .expect("schedule exists");
    assert_eq!(updated.status, ScheduleStatus::Alert);
    assert_eq!(updated.consecutive_failures, 3);

    // Alert schedules get no further auto-retry, however overdue
    let due = schedules::due_items(harness.db.pool(), Utc::now() + Duration::days(365), 100)
        .await
        .expect("due items");
    assert!(due.is_empty());

    // Until an operator resets the pair
    assert!(
        schedules::reset_alert(harness.db.pool(), CLIENT, "importgenius", Utc::now())
            .await
            .expect("reset alert")
    );
    let due = schedules::due_items(harness.db.pool(), Utc::now() + Duration::seconds(1), 100)
        .await
        .expect("due items");
    assert_eq!(due.len(), 1);
}

#[tokio::test]
async fn missing_scanner_is_a_hard_error() {
    let scanners = ScannerSet::new();
    let harness = setup(scanners, 5).await;

    let def = platform("importgenius", RiskTier::High, "unregistered");
    let schedule = schedules::enroll(harness.db.pool(), CLIENT, "importgenius", Utc::now())
        .await
        .expect("enroll");

    let result = harness
        .executor
        .execute(&schedule, &def, &ClientTerms::for_company("Meridian Exports Ltd"))
        .await;

    assert!(matches!(
        result.unwrap_err(),
        ScanError::MissingScanner { .. }
    ));

    // The claim is not left dangling
    let updated = schedules::get(harness.db.pool(), CLIENT, "importgenius")
        .await
        .expect("get")
        .expect("schedule exists");
    assert!(updated.claimed_at.is_none());
}
