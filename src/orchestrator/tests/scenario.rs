use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::HarnessConfig;
use crate::orchestrator::load::LoadPlan;
use crate::orchestrator::scenario::{ScenarioRunner, SCENARIOS};
use crate::orchestrator::tests::support::{test_topology, MockBackend, ScriptedHealth};

// Base URL points at a closed port so the HTTP side (cleanup, load) fails
// fast; scenarios that do not assert on HTTP traffic must still pass.
fn test_config() -> HarnessConfig {
    HarnessConfig {
        base_url: Url::parse("http://127.0.0.1:9").unwrap(),
        pool_size: 3,
        sla: Duration::from_millis(300),
        load: LoadPlan {
            duration: Duration::from_millis(300),
            concurrency: 2,
            rate_limit: 100,
            think_time_min: Duration::from_millis(1),
            think_time_max: Duration::from_millis(3),
        },
        chaos_offset: Duration::from_millis(50),
        chaos_downtime: Duration::from_millis(10),
        scenario_deadline: Duration::from_secs(5),
        health_poll_interval: Duration::from_millis(5),
        report_dir: "reports".to_string(),
        docker_settle: Duration::ZERO,
    }
}

fn runner_with(backend: Arc<MockBackend>, endpoint: ScriptedHealth) -> ScenarioRunner {
    ScenarioRunner::new(
        test_config(),
        test_topology(),
        backend,
        Arc::new(endpoint),
    )
    .unwrap()
}

#[tokio::test]
async fn test_pool_exhaustion_scenario_passes() {
    let runner = runner_with(
        Arc::new(MockBackend::new()),
        ScriptedHealth::always_healthy(),
    );

    let report = runner.run("pool-exhaustion").await;
    assert!(report.passed, "error: {:?}", report.error);
    assert!(report.error.is_none());
}

#[tokio::test]
async fn test_recovery_by_kill_scenario_passes() {
    let backend = Arc::new(MockBackend::new());
    let runner = runner_with(backend.clone(), ScriptedHealth::always_healthy());

    let report = runner.run("recovery-by-kill").await;
    assert!(report.passed, "error: {:?}", report.error);

    let recovery = report.recovery.unwrap();
    assert!(recovery.recovered);
    assert_eq!(recovery.classification.as_deref(), Some("full"));
    assert_eq!(recovery.target, "database");

    // The kill fired once and teardown restarted whatever was down
    assert_eq!(backend.count_of("kill"), 1);
    assert!(backend.count_of("start") >= 1);
}

#[tokio::test]
async fn test_recovery_by_restart_scenario_passes() {
    let runner = runner_with(
        Arc::new(MockBackend::new()),
        ScriptedHealth::always_healthy(),
    );

    let report = runner.run("recovery-by-restart").await;
    assert!(report.passed, "error: {:?}", report.error);

    let recovery = report.recovery.unwrap();
    assert!(recovery.recovered);
    assert_eq!(recovery.target, "api");
    assert_eq!(recovery.kind, "restart");
}

#[tokio::test]
async fn test_unknown_scenario_reports_failure() {
    let runner = runner_with(
        Arc::new(MockBackend::new()),
        ScriptedHealth::always_healthy(),
    );

    let report = runner.run("split-brain").await;
    assert!(!report.passed);
    assert!(report.error.unwrap().contains("unknown scenario"));
}

#[tokio::test]
async fn test_backend_failure_fails_scenario_but_not_run() {
    let backend = Arc::new(MockBackend::new());
    backend.fail_next_op();
    let runner = runner_with(backend, ScriptedHealth::always_healthy());

    let report = runner.run("recovery-by-kill").await;
    assert!(!report.passed);
    assert!(report.error.is_some());
}

#[tokio::test]
async fn test_deadline_expiry_cancels_pending_injection_and_load() {
    let backend = Arc::new(MockBackend::new());
    let mut config = test_config();
    // Deadline expires while the injection is still armed and the load
    // window is still open.
    config.scenario_deadline = Duration::from_millis(80);
    config.chaos_offset = Duration::from_millis(150);
    config.load.duration = Duration::from_millis(400);

    let runner = ScenarioRunner::new(
        config,
        test_topology(),
        backend.clone(),
        Arc::new(ScriptedHealth::always_healthy()),
    )
    .unwrap();

    let report = runner.run("chaos-under-load").await;
    assert!(!report.passed);
    assert!(report.error.unwrap().contains("deadline"));

    // The armed injection must not fire after teardown
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(backend.count_of("kill"), 0);
}

#[tokio::test]
async fn test_run_all_covers_every_scenario() {
    let runner = runner_with(
        Arc::new(MockBackend::new()),
        ScriptedHealth::always_healthy(),
    );

    let report = runner.run_all(&[]).await;
    assert_eq!(report.scenarios.len(), SCENARIOS.len());
    for (scenario, name) in report.scenarios.iter().zip(SCENARIOS) {
        assert_eq!(&scenario.name, name);
    }
    assert!(report.finished_at >= report.started_at);
}

#[tokio::test]
async fn test_run_all_with_explicit_selection() {
    let runner = runner_with(
        Arc::new(MockBackend::new()),
        ScriptedHealth::always_healthy(),
    );

    let report = runner
        .run_all(&["pool-exhaustion".to_string()])
        .await;
    assert_eq!(report.scenarios.len(), 1);
    assert!(report.all_passed());
}
