use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::orchestrator::backend::LifecycleBackend;
use crate::orchestrator::error::{HarnessError, Result};
use crate::orchestrator::health::{HealthEndpoint, HealthPayload};
use crate::topology::{ServiceSpec, Topology};

pub fn test_topology() -> Topology {
    Topology::default_local("http://127.0.0.1:9")
}

pub fn degraded() -> HealthPayload {
    HealthPayload {
        status: "degraded".to_string(),
        database_reachable: false,
    }
}

/// Lifecycle backend that records operations instead of touching docker
#[derive(Default)]
pub struct MockBackend {
    ops: Mutex<Vec<(String, String)>>,
    op_delay: Mutex<Option<Duration>>,
    fail_next: Mutex<bool>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_op_delay(self, delay: Duration) -> Self {
        *self.op_delay.lock() = Some(delay);
        self
    }

    pub fn fail_next_op(&self) {
        *self.fail_next.lock() = true;
    }

    pub fn ops(&self) -> Vec<(String, String)> {
        self.ops.lock().clone()
    }

    pub fn count_of(&self, op: &str) -> usize {
        self.ops.lock().iter().filter(|(o, _)| o == op).count()
    }

    async fn record(&self, op: &str, container: &str) -> Result<()> {
        let delay = *self.op_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if std::mem::take(&mut *self.fail_next.lock()) {
            return Err(HarnessError::Infrastructure {
                service: container.to_string(),
                reason: format!("scripted {op} failure"),
            });
        }
        self.ops
            .lock()
            .push((op.to_string(), container.to_string()));
        Ok(())
    }
}

#[async_trait]
impl LifecycleBackend for MockBackend {
    async fn start(&self, container: &str) -> Result<()> {
        self.record("start", container).await
    }

    async fn stop(&self, container: &str) -> Result<()> {
        self.record("stop", container).await
    }

    async fn kill(&self, container: &str) -> Result<()> {
        self.record("kill", container).await
    }

    async fn is_running(&self, _container: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Health endpoint that replays a scripted response sequence, then settles
/// on a fallback payload forever
pub struct ScriptedHealth {
    responses: Mutex<VecDeque<eyre::Result<HealthPayload>>>,
    fallback: HealthPayload,
}

impl ScriptedHealth {
    pub fn always_healthy() -> Self {
        Self::always(HealthPayload::ok())
    }

    pub fn always(fallback: HealthPayload) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback,
        }
    }

    pub fn with_responses(
        responses: Vec<eyre::Result<HealthPayload>>,
        fallback: HealthPayload,
    ) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback,
        }
    }
}

#[async_trait]
impl HealthEndpoint for ScriptedHealth {
    async fn fetch(&self, _spec: &ServiceSpec) -> eyre::Result<HealthPayload> {
        match self.responses.lock().pop_front() {
            Some(response) => response,
            None => Ok(self.fallback.clone()),
        }
    }
}
