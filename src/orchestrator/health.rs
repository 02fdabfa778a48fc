use async_trait::async_trait;
use futures::{Stream, StreamExt, pin_mut};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::orchestrator::types::HealthStatus;
use crate::topology::{ServiceKind, ServiceSpec};

/// Structured payload returned by the health endpoint.
///
/// Any other shape, or a transport error, is classified unhealthy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthPayload {
    pub status: String,
    pub database_reachable: bool,
}

impl HealthPayload {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            database_reachable: true,
        }
    }
}

/// Seam for fetching a health payload for a service
#[async_trait]
pub trait HealthEndpoint: Send + Sync {
    async fn fetch(&self, spec: &ServiceSpec) -> eyre::Result<HealthPayload>;
}

/// HTTP health endpoint using the service's `health_url`
pub struct HttpHealthEndpoint {
    client: reqwest::Client,
}

impl HttpHealthEndpoint {
    pub fn new() -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthEndpoint for HttpHealthEndpoint {
    async fn fetch(&self, spec: &ServiceSpec) -> eyre::Result<HealthPayload> {
        let response = self.client.get(&spec.health_url).send().await?;
        let payload = response.error_for_status()?.json::<HealthPayload>().await?;
        Ok(payload)
    }
}

/// Result of driving a poll sequence to completion
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// The final observation, present whenever at least one sample was taken
    pub last: Option<HealthStatus>,
    /// Set when the deadline passed before the predicate held
    pub timed_out: bool,
}

/// Predicate for the common "service is healthy" case
pub fn healthy(status: &HealthStatus) -> bool {
    status.healthy
}

/// Issues health checks and produces lazy, restartable observation
/// sequences. The probe classifies; it never propagates transport errors.
#[derive(Clone)]
pub struct HealthProbe {
    endpoint: Arc<dyn HealthEndpoint>,
}

impl HealthProbe {
    pub fn new(endpoint: Arc<dyn HealthEndpoint>) -> Self {
        Self { endpoint }
    }

    /// Take a single health observation.
    ///
    /// An API service is healthy when the payload reports `status == "ok"`;
    /// a database service is healthy when the payload reports
    /// `database_reachable` (the endpoint runs a probe query against it).
    pub async fn poll_once(&self, spec: &ServiceSpec) -> HealthStatus {
        let started = Instant::now();
        let (healthy, database_reachable) = match self.endpoint.fetch(spec).await {
            Ok(payload) => {
                let healthy = match spec.kind {
                    ServiceKind::Api => payload.status == "ok",
                    ServiceKind::Database => payload.database_reachable,
                };
                (healthy, payload.database_reachable)
            }
            Err(e) => {
                tracing::debug!(
                    service = %spec.name,
                    error = %e,
                    "Health check failed; classifying unhealthy"
                );
                (false, false)
            }
        };

        HealthStatus {
            service: spec.name.clone(),
            observed_at: Instant::now(),
            healthy,
            database_reachable,
            latency: started.elapsed(),
        }
    }

    /// Lazy, finite sequence of observations sampled every `interval`.
    ///
    /// The sequence ends as soon as `predicate` holds for a sample or the
    /// deadline passes; either way the terminating sample is yielded so the
    /// caller always sees the final status.
    pub fn poll_until<'a, P>(
        &'a self,
        spec: &'a ServiceSpec,
        predicate: &'a P,
        interval: Duration,
        timeout: Duration,
    ) -> impl Stream<Item = HealthStatus> + 'a
    where
        P: Fn(&HealthStatus) -> bool,
    {
        let deadline = Instant::now() + timeout;
        async_stream::stream! {
            loop {
                let status = self.poll_once(spec).await;
                let done = predicate(&status);
                yield status;
                if done || Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        }
    }

    /// Drive `poll_until` to completion, returning the final status plus an
    /// explicit timeout indicator rather than a silent empty result.
    pub async fn wait_until<P>(
        &self,
        spec: &ServiceSpec,
        predicate: P,
        interval: Duration,
        timeout: Duration,
    ) -> PollOutcome
    where
        P: Fn(&HealthStatus) -> bool,
    {
        let mut attempts = 0u32;
        let mut last: Option<HealthStatus> = None;
        {
            let stream = self.poll_until(spec, &predicate, interval, timeout);
            pin_mut!(stream);
            while let Some(status) = stream.next().await {
                attempts += 1;
                last = Some(status);
            }
        }

        let matched = last.as_ref().map(&predicate).unwrap_or(false);
        if matched {
            tracing::info!(
                service = %spec.name,
                attempts = attempts,
                "Predicate satisfied"
            );
        } else {
            tracing::warn!(
                service = %spec.name,
                attempts = attempts,
                timeout_ms = timeout.as_millis() as u64,
                "Poll deadline reached before predicate held"
            );
        }

        PollOutcome {
            last,
            timed_out: !matched,
        }
    }
}
