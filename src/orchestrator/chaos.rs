use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::controller::ServiceController;
use crate::orchestrator::error::{HarnessError, Result};
use crate::orchestrator::types::{FailureEvent, FailureKind};

/// A scheduled one-shot injection.
///
/// `outcome` resolves to `Ok(Some(event))` once the injection fired,
/// `Ok(None)` when it was cancelled before the offset elapsed, and `Err`
/// when the lifecycle operation itself failed.
pub struct ScheduledInjection {
    token: CancellationToken,
    handle: Option<JoinHandle<Result<Option<FailureEvent>>>>,
}

impl ScheduledInjection {
    /// Cancel the pending injection. A cancelled injection never fires,
    /// even if the offset elapses after window teardown.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub async fn outcome(mut self) -> Result<Option<FailureEvent>> {
        let Some(handle) = self.handle.take() else {
            return Ok(None);
        };
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Chaos injection task join failed");
                Err(HarnessError::Infrastructure {
                    service: "chaos-scheduler".to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Dropping the handle disarms a pending injection. A scenario abandoned
/// at its deadline drops its futures without awaiting them; the armed task
/// must not fire into the restored topology afterwards.
impl Drop for ScheduledInjection {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Fires exactly one failure injection at a configured offset inside an
/// active load window, via the service controller.
pub struct ChaosScheduler {
    controller: Arc<ServiceController>,
}

impl ChaosScheduler {
    pub fn new(controller: Arc<ServiceController>) -> Self {
        Self { controller }
    }

    /// Arm a one-shot timer relative to now. At `offset` the target is
    /// killed or restarted exactly once; `injected_at` is recorded before
    /// the lifecycle operation is issued, so a validator awaiting the event
    /// can never observe a recovery that predates the injection.
    pub fn schedule(
        &self,
        offset: Duration,
        target: impl Into<String>,
        kind: FailureKind,
    ) -> ScheduledInjection {
        let target = target.into();
        let token = CancellationToken::new();
        let task_token = token.clone();
        let controller = Arc::clone(&self.controller);

        tracing::info!(
            target = %target,
            kind = %kind,
            offset_ms = offset.as_millis() as u64,
            "Chaos injection armed"
        );

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {
                    tracing::info!(target = %target, "Chaos injection cancelled before firing");
                    return Ok(None);
                }
                _ = tokio::time::sleep(offset) => {}
            }

            let injected_at = Instant::now();
            tracing::warn!(target = %target, kind = %kind, "CHAOS INJECTION firing");

            match kind {
                FailureKind::Kill => controller.kill(&target).await?,
                FailureKind::Restart => controller.restart(&target).await?,
            }

            Ok(Some(FailureEvent {
                target,
                kind,
                injected_at,
            }))
        });

        ScheduledInjection {
            token,
            handle: Some(handle),
        }
    }
}
