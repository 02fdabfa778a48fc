use std::sync::Arc;
use std::time::Duration;

use crate::orchestrator::chaos::ChaosScheduler;
use crate::orchestrator::controller::ServiceController;
use crate::orchestrator::health::HealthProbe;
use crate::orchestrator::tests::support::{test_topology, MockBackend, ScriptedHealth};
use crate::orchestrator::types::FailureKind;

fn scheduler_with(backend: Arc<MockBackend>) -> ChaosScheduler {
    let probe = HealthProbe::new(Arc::new(ScriptedHealth::always_healthy()));
    let controller = Arc::new(
        ServiceController::new(&test_topology(), backend, probe)
            .with_poll_interval(Duration::from_millis(5)),
    );
    ChaosScheduler::new(controller)
}

#[tokio::test]
async fn test_injection_fires_exactly_once_at_offset() {
    let backend = Arc::new(MockBackend::new());
    let scheduler = scheduler_with(backend.clone());

    let injection = scheduler.schedule(
        Duration::from_millis(30),
        "database",
        FailureKind::Kill,
    );

    let event = injection.outcome().await.unwrap().unwrap();
    assert_eq!(event.target, "database");
    assert_eq!(event.kind, FailureKind::Kill);
    assert_eq!(backend.count_of("kill"), 1);

    // No delayed second firing
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(backend.count_of("kill"), 1);
}

#[tokio::test]
async fn test_cancelled_injection_never_fires() {
    let backend = Arc::new(MockBackend::new());
    let scheduler = scheduler_with(backend.clone());

    let injection = scheduler.schedule(
        Duration::from_millis(50),
        "database",
        FailureKind::Kill,
    );
    tokio::time::sleep(Duration::from_millis(10)).await;
    injection.cancel();

    assert!(injection.outcome().await.unwrap().is_none());

    // Even after the offset has long elapsed
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(backend.ops().is_empty());
}

#[tokio::test]
async fn test_dropped_injection_never_fires() {
    let backend = Arc::new(MockBackend::new());
    let scheduler = scheduler_with(backend.clone());

    let injection = scheduler.schedule(
        Duration::from_millis(40),
        "database",
        FailureKind::Kill,
    );
    drop(injection);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        backend.ops().is_empty(),
        "injection fired after its handle was dropped: {:?}",
        backend.ops()
    );
}

#[tokio::test]
async fn test_restart_injection_issues_stop_then_start() {
    let backend = Arc::new(MockBackend::new());
    let scheduler = scheduler_with(backend.clone());

    let injection = scheduler.schedule(Duration::ZERO, "api", FailureKind::Restart);
    let event = injection.outcome().await.unwrap().unwrap();

    assert_eq!(event.kind, FailureKind::Restart);
    assert_eq!(
        backend.ops(),
        vec![
            ("stop".to_string(), "recovery_fastapi".to_string()),
            ("start".to_string(), "recovery_fastapi".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_injected_at_precedes_outcome_observation() {
    let backend = Arc::new(MockBackend::new());
    let scheduler = scheduler_with(backend);

    let injection = scheduler.schedule(Duration::from_millis(10), "api", FailureKind::Kill);
    let event = injection.outcome().await.unwrap().unwrap();

    assert!(event.injected_at <= tokio::time::Instant::now());
}

#[tokio::test]
async fn test_failed_lifecycle_operation_surfaces_as_error() {
    let backend = Arc::new(MockBackend::new());
    backend.fail_next_op();
    let scheduler = scheduler_with(backend);

    let injection = scheduler.schedule(Duration::ZERO, "database", FailureKind::Kill);
    assert!(injection.outcome().await.is_err());
}
