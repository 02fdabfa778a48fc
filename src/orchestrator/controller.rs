use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::orchestrator::backend::LifecycleBackend;
use crate::orchestrator::error::{HarnessError, Result};
use crate::orchestrator::health::{HealthProbe, healthy};
use crate::orchestrator::types::{HealthStatus, ServiceState};
use crate::topology::{ServiceSpec, Topology};

struct InstanceSlot {
    spec: ServiceSpec,
    /// Serializes lifecycle operations per named instance
    op_lock: tokio::sync::Mutex<()>,
    state: parking_lot::Mutex<ServiceState>,
}

impl InstanceSlot {
    fn set_state(&self, new_state: ServiceState) {
        let mut state = self.state.lock();
        tracing::debug!(
            service = %self.spec.name,
            old_state = %*state,
            new_state = %new_state,
            "Service state transition"
        );
        *state = new_state;
    }
}

/// Starts, stops, abruptly kills and restarts named service instances,
/// blocking callers until an operation completes or times out.
///
/// Operations on the same instance are serialized; a second call while one
/// is in flight fails with `OperationInProgress`. Operations on different
/// instances proceed concurrently.
pub struct ServiceController {
    backend: Arc<dyn LifecycleBackend>,
    probe: HealthProbe,
    poll_interval: Duration,
    instances: HashMap<String, InstanceSlot>,
}

impl ServiceController {
    pub fn new(topology: &Topology, backend: Arc<dyn LifecycleBackend>, probe: HealthProbe) -> Self {
        let instances = topology
            .services
            .iter()
            .map(|spec| {
                (
                    spec.name.clone(),
                    InstanceSlot {
                        spec: spec.clone(),
                        op_lock: tokio::sync::Mutex::new(()),
                        state: parking_lot::Mutex::new(ServiceState::Running),
                    },
                )
            })
            .collect();

        Self {
            backend,
            probe,
            poll_interval: Duration::from_secs(1),
            instances,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn slot(&self, name: &str) -> Result<&InstanceSlot> {
        self.instances
            .get(name)
            .ok_or_else(|| HarnessError::UnknownService(name.to_string()))
    }

    fn lock_op<'a>(&self, slot: &'a InstanceSlot) -> Result<tokio::sync::MutexGuard<'a, ()>> {
        slot.op_lock
            .try_lock()
            .map_err(|_| HarnessError::OperationInProgress {
                service: slot.spec.name.clone(),
            })
    }

    pub fn state(&self, name: &str) -> Result<ServiceState> {
        Ok(*self.slot(name)?.state.lock())
    }

    async fn do_start(&self, slot: &InstanceSlot) -> Result<()> {
        tracing::info!(service = %slot.spec.name, "Starting service");
        self.backend.start(&slot.spec.container).await?;
        slot.set_state(ServiceState::Restarting);
        Ok(())
    }

    async fn do_stop(&self, slot: &InstanceSlot) -> Result<()> {
        tracing::info!(service = %slot.spec.name, "Stopping service");
        self.backend.stop(&slot.spec.container).await?;
        slot.set_state(ServiceState::Stopped);
        Ok(())
    }

    /// Start a stopped instance. The instance stays `Restarting` until a
    /// `wait_healthy` confirms it.
    pub async fn start(&self, name: &str) -> Result<()> {
        let slot = self.slot(name)?;
        let _guard = self.lock_op(slot)?;
        self.do_start(slot).await
    }

    pub async fn stop(&self, name: &str) -> Result<()> {
        let slot = self.slot(name)?;
        let _guard = self.lock_op(slot)?;
        self.do_stop(slot).await
    }

    /// Abrupt termination, no graceful shutdown
    pub async fn kill(&self, name: &str) -> Result<()> {
        let slot = self.slot(name)?;
        let _guard = self.lock_op(slot)?;
        tracing::warn!(service = %name, "Killing service");
        self.backend.kill(&slot.spec.container).await?;
        slot.set_state(ServiceState::Stopped);
        Ok(())
    }

    /// Stop then start. On an already-stopped instance this degrades to a
    /// plain start rather than raising a double-stop error.
    pub async fn restart(&self, name: &str) -> Result<()> {
        let slot = self.slot(name)?;
        let _guard = self.lock_op(slot)?;

        let current = *slot.state.lock();
        if current == ServiceState::Stopped {
            tracing::info!(service = %name, "Restart on stopped instance; starting");
        } else {
            self.do_stop(slot).await?;
        }
        self.do_start(slot).await
    }

    /// Block until the instance reports healthy or `timeout` elapses. On
    /// timeout the instance is left `Unhealthy` and the call fails with
    /// `InfrastructureTimeout`.
    pub async fn wait_healthy(&self, name: &str, timeout: Duration) -> Result<HealthStatus> {
        let slot = self.slot(name)?;
        let _guard = self.lock_op(slot)?;

        let outcome = self
            .probe
            .wait_until(&slot.spec, healthy, self.poll_interval, timeout)
            .await;

        if outcome.timed_out {
            slot.set_state(ServiceState::Unhealthy);
            return Err(HarnessError::InfrastructureTimeout {
                service: name.to_string(),
                timeout,
            });
        }

        slot.set_state(ServiceState::Running);
        // The stream yields the matching sample before ending, so `last` is
        // always present on the non-timeout path.
        outcome.last.ok_or_else(|| HarnessError::Infrastructure {
            service: name.to_string(),
            reason: "health poll produced no samples".to_string(),
        })
    }

    /// Bring an instance back to `Running` regardless of its current state.
    /// Used by scenario teardown so cleanup succeeds on every exit path.
    pub async fn ensure_running(&self, name: &str, timeout: Duration) -> Result<HealthStatus> {
        if self.state(name)? != ServiceState::Running {
            self.restart(name).await?;
        }
        self.wait_healthy(name, timeout).await
    }

    pub fn service_names(&self) -> Vec<String> {
        self.instances.keys().cloned().collect()
    }
}
