use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

use crate::orchestrator::error::{HarnessError, Result};

/// Capability interface for service lifecycle control.
///
/// The orchestration logic never depends on a specific execution
/// environment; backends are interchangeable (container runtime, local
/// process control, scripted mocks in tests).
#[async_trait]
pub trait LifecycleBackend: Send + Sync {
    async fn start(&self, container: &str) -> Result<()>;
    async fn stop(&self, container: &str) -> Result<()>;
    /// Abrupt termination, no graceful shutdown window
    async fn kill(&self, container: &str) -> Result<()>;
    async fn is_running(&self, container: &str) -> Result<bool>;
}

/// Lifecycle backend shelling out to the docker CLI
#[derive(Debug, Clone)]
pub struct DockerBackend {
    /// Settle delay applied after `start` before health polling begins
    settle: Duration,
}

impl Default for DockerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerBackend {
    pub fn new() -> Self {
        Self {
            settle: Duration::from_secs(2),
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    async fn run(&self, args: &[&str], container: &str) -> Result<String> {
        tracing::info!(container = container, args = ?args, "Running docker command");

        let output = Command::new("docker")
            .args(args)
            .arg(container)
            .output()
            .await
            .map_err(|e| HarnessError::Infrastructure {
                service: container.to_string(),
                reason: format!("failed to spawn docker: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(
                container = container,
                args = ?args,
                stderr = %stderr,
                "Docker command failed"
            );
            return Err(HarnessError::Infrastructure {
                service: container.to_string(),
                reason: if stderr.is_empty() {
                    format!("docker {} exited with {}", args.join(" "), output.status)
                } else {
                    stderr
                },
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl LifecycleBackend for DockerBackend {
    async fn start(&self, container: &str) -> Result<()> {
        self.run(&["start"], container).await?;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        Ok(())
    }

    async fn stop(&self, container: &str) -> Result<()> {
        self.run(&["stop"], container).await?;
        Ok(())
    }

    async fn kill(&self, container: &str) -> Result<()> {
        self.run(&["kill"], container).await?;
        Ok(())
    }

    async fn is_running(&self, container: &str) -> Result<bool> {
        let out = self
            .run(&["inspect", "-f", "{{.State.Running}}"], container)
            .await?;
        Ok(out == "true")
    }
}
