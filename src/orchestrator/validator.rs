use futures::{StreamExt, pin_mut};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::orchestrator::error::{HarnessError, Result};
use crate::orchestrator::health::{HealthProbe, healthy};
use crate::orchestrator::pool::ConnectionPoolManager;
use crate::orchestrator::types::{FailureEvent, RecoveryClass, RecoveryOutcome};
use crate::topology::{ServiceKind, Topology};

/// Drives the health probe after a failure event and records a recovery
/// outcome with duration and full/partial classification.
pub struct RecoveryValidator {
    probe: HealthProbe,
    topology: Topology,
    poll_interval: Duration,
    pool: Option<Arc<ConnectionPoolManager>>,
}

impl RecoveryValidator {
    pub fn new(probe: HealthProbe, topology: Topology) -> Self {
        Self {
            probe,
            topology,
            poll_interval: Duration::from_secs(1),
            pool: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Attach the connection pool to be disposed when the observed failure
    /// targets the database.
    pub fn with_pool(mut self, pool: Arc<ConnectionPoolManager>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Observe recovery from a failure event, polling until the target is
    /// healthy or `sla` elapses (measured from the injection).
    ///
    /// SLA expiry is a result, not an error: the outcome is emitted with
    /// `recovered_at` absent so the scenario can report a clear failure
    /// without crashing the harness.
    pub async fn observe(&self, event: &FailureEvent, sla: Duration) -> Result<RecoveryOutcome> {
        let spec = self
            .topology
            .get(&event.target)
            .ok_or_else(|| HarnessError::UnknownService(event.target.clone()))?;

        // An externally killed or restarted database invalidates every
        // pooled connection even though keep-alive checks still pass, so
        // disposal is forced up front instead of waiting for a ping to
        // notice.
        if spec.kind == ServiceKind::Database {
            if let Some(pool) = &self.pool {
                pool.on_upstream_failure_detected(event.kind);
            }
        }

        let deadline = event.injected_at + sla;
        let timeout = deadline.saturating_duration_since(Instant::now());

        let mut detected_unhealthy_at = None;
        let mut recovered_at = None;
        {
            let stream = self
                .probe
                .poll_until(spec, &healthy, self.poll_interval, timeout);
            pin_mut!(stream);
            while let Some(status) = stream.next().await {
                if !status.healthy && detected_unhealthy_at.is_none() {
                    detected_unhealthy_at = Some(status.observed_at);
                    tracing::info!(
                        target = %event.target,
                        after_ms = status
                            .observed_at
                            .saturating_duration_since(event.injected_at)
                            .as_millis() as u64,
                        "Target observed unhealthy after injection"
                    );
                }
                if status.healthy {
                    recovered_at = Some(status.observed_at);
                }
            }
        }

        let classification = match recovered_at {
            Some(at) => {
                let class = self.classify(&event.target, deadline).await;
                tracing::info!(
                    target = %event.target,
                    duration_ms = at.saturating_duration_since(event.injected_at).as_millis() as u64,
                    classification = %class,
                    "Recovery confirmed"
                );
                Some(class)
            }
            None => {
                tracing::warn!(
                    target = %event.target,
                    sla_ms = sla.as_millis() as u64,
                    "Recovery not confirmed within SLA"
                );
                None
            }
        };

        Ok(RecoveryOutcome {
            target: event.target.clone(),
            kind: event.kind,
            injected_at: event.injected_at,
            detected_unhealthy_at,
            recovered_at,
            classification,
        })
    }

    /// Full when every dependency of the target is also healthy before the
    /// SLA deadline; partial when the target recovered but a dependency
    /// did not.
    async fn classify(&self, target: &str, deadline: Instant) -> RecoveryClass {
        for dep in self.topology.dependencies_of(target) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = self
                .probe
                .wait_until(dep, healthy, self.poll_interval, remaining)
                .await;
            if outcome.timed_out {
                tracing::warn!(
                    target = %target,
                    dependency = %dep.name,
                    "Dependency did not recover within SLA; classifying partial"
                );
                return RecoveryClass::Partial;
            }
        }
        RecoveryClass::Full
    }
}
