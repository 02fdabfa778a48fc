use std::sync::Arc;
use std::time::Duration;

use crate::orchestrator::controller::ServiceController;
use crate::orchestrator::error::HarnessError;
use crate::orchestrator::health::HealthProbe;
use crate::orchestrator::tests::support::{degraded, test_topology, MockBackend, ScriptedHealth};
use crate::orchestrator::types::ServiceState;

fn controller_with(
    backend: Arc<MockBackend>,
    endpoint: Arc<ScriptedHealth>,
) -> ServiceController {
    let probe = HealthProbe::new(endpoint);
    ServiceController::new(&test_topology(), backend, probe)
        .with_poll_interval(Duration::from_millis(5))
}

#[tokio::test]
async fn test_kill_marks_service_stopped() {
    let backend = Arc::new(MockBackend::new());
    let controller = controller_with(backend.clone(), Arc::new(ScriptedHealth::always_healthy()));

    controller.kill("database").await.unwrap();

    assert_eq!(controller.state("database").unwrap(), ServiceState::Stopped);
    assert_eq!(
        backend.ops(),
        vec![("kill".to_string(), "recovery_postgres".to_string())]
    );
}

#[tokio::test]
async fn test_restart_on_stopped_degrades_to_start() {
    let backend = Arc::new(MockBackend::new());
    let controller = controller_with(backend.clone(), Arc::new(ScriptedHealth::always_healthy()));

    controller.stop("api").await.unwrap();
    assert_eq!(controller.state("api").unwrap(), ServiceState::Stopped);

    controller.restart("api").await.unwrap();

    // One stop, one start: the restart must not stop an already-stopped
    // instance a second time.
    assert_eq!(backend.count_of("stop"), 1);
    assert_eq!(backend.count_of("start"), 1);
    assert_eq!(
        controller.state("api").unwrap(),
        ServiceState::Restarting
    );
}

#[tokio::test]
async fn test_restart_running_instance_stops_then_starts() {
    let backend = Arc::new(MockBackend::new());
    let controller = controller_with(backend.clone(), Arc::new(ScriptedHealth::always_healthy()));

    controller.restart("api").await.unwrap();

    assert_eq!(
        backend.ops(),
        vec![
            ("stop".to_string(), "recovery_fastapi".to_string()),
            ("start".to_string(), "recovery_fastapi".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_concurrent_operations_on_same_instance_rejected() {
    let backend = Arc::new(MockBackend::new().with_op_delay(Duration::from_millis(50)));
    let controller = Arc::new(controller_with(
        backend,
        Arc::new(ScriptedHealth::always_healthy()),
    ));

    let slow = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.stop("api").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = controller.start("api").await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::OperationInProgress { ref service } if service == "api"
    ));

    slow.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_operations_on_different_instances_proceed() {
    let backend = Arc::new(MockBackend::new().with_op_delay(Duration::from_millis(50)));
    let controller = Arc::new(controller_with(
        backend,
        Arc::new(ScriptedHealth::always_healthy()),
    ));

    let slow = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.stop("api").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    controller.stop("database").await.unwrap();
    slow.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_wait_healthy_timeout_marks_unhealthy() {
    let controller = controller_with(
        Arc::new(MockBackend::new()),
        Arc::new(ScriptedHealth::always(degraded())),
    );

    let err = controller
        .wait_healthy("api", Duration::from_millis(30))
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::InfrastructureTimeout { .. }));
    assert_eq!(controller.state("api").unwrap(), ServiceState::Unhealthy);
}

#[tokio::test]
async fn test_wait_healthy_recovers_after_transient_failures() {
    let endpoint = ScriptedHealth::with_responses(
        vec![Ok(degraded()), Err(eyre::eyre!("connection refused"))],
        crate::orchestrator::health::HealthPayload::ok(),
    );
    let controller = controller_with(Arc::new(MockBackend::new()), Arc::new(endpoint));

    let status = controller
        .wait_healthy("api", Duration::from_millis(500))
        .await
        .unwrap();

    assert!(status.healthy);
    assert_eq!(controller.state("api").unwrap(), ServiceState::Running);
}

#[tokio::test]
async fn test_backend_failure_propagates() {
    let backend = Arc::new(MockBackend::new());
    backend.fail_next_op();
    let controller = controller_with(backend, Arc::new(ScriptedHealth::always_healthy()));

    let err = controller.start("api").await.unwrap_err();
    assert!(matches!(err, HarnessError::Infrastructure { .. }));
}

#[tokio::test]
async fn test_unknown_service_rejected() {
    let controller = controller_with(
        Arc::new(MockBackend::new()),
        Arc::new(ScriptedHealth::always_healthy()),
    );

    let err = controller.start("ghost").await.unwrap_err();
    assert!(matches!(err, HarnessError::UnknownService(ref name) if name == "ghost"));
}
