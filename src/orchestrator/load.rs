use futures::future::BoxFuture;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceBuilder, ServiceExt};
use url::Url;
use uuid::Uuid;

/// One synthetic request. The mix mirrors production client traffic:
/// creates dominate, reads follow, health checks trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadAction {
    CreateUser,
    ListUsers,
    HealthCheck,
}

impl LoadAction {
    /// Weighted 3:2:1 pick
    fn pick(roll: u8) -> Self {
        match roll % 6 {
            0..=2 => LoadAction::CreateUser,
            3..=4 => LoadAction::ListUsers,
            _ => LoadAction::HealthCheck,
        }
    }
}

/// Parameters for one load window
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub duration: Duration,
    pub concurrency: usize,
    /// Requests per second budget applied to each issuer
    pub rate_limit: u64,
    pub think_time_min: Duration,
    pub think_time_max: Duration,
}

impl Default for LoadPlan {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(60),
            concurrency: 10,
            rate_limit: 20,
            think_time_min: Duration::from_millis(500),
            think_time_max: Duration::from_millis(2000),
        }
    }
}

/// Per-second tally of request results, offset from the window start
#[derive(Debug, Clone, Serialize)]
pub struct SecondBucket {
    pub offset_secs: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Aggregated result of a load window
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub success_count: u64,
    pub failure_count: u64,
    pub timeline: Vec<SecondBucket>,
}

impl LoadSummary {
    pub fn total(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub fn error_rate(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.failure_count as f64 / self.total() as f64 * 100.0
    }

    /// First and last second offsets that saw a failure, when any did
    pub fn failure_window(&self) -> Option<(u64, u64)> {
        let offsets: Vec<u64> = self
            .timeline
            .iter()
            .filter(|b| b.failures > 0)
            .map(|b| b.offset_secs)
            .collect();
        Some((*offsets.first()?, *offsets.last()?))
    }
}

/// HTTP issuer for the CRUD API under test.
///
/// Emails are derived from a per-run id plus a shared sequence so creates
/// never trip the unique-email constraint within a run.
#[derive(Clone)]
pub struct HttpLoadService {
    client: reqwest::Client,
    base_url: Url,
    run_id: String,
    seq: Arc<AtomicU64>,
}

impl HttpLoadService {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            run_id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Service<LoadAction> for HttpLoadService {
    type Response = ();
    type Error = eyre::Report;
    type Future = BoxFuture<'static, Result<(), eyre::Report>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, action: LoadAction) -> Self::Future {
        let client = self.client.clone();
        let base = self.base_url.clone();
        let run_id = self.run_id.clone();
        let n = self.seq.fetch_add(1, Ordering::Relaxed);

        Box::pin(async move {
            let response = match action {
                LoadAction::CreateUser => {
                    let payload = serde_json::json!({
                        "name": format!("Load User {n}"),
                        "email": format!("loaduser-{run_id}-{n}@test.com"),
                        "is_active": true,
                    });
                    client.post(base.join("/users/")?).json(&payload).send().await?
                }
                LoadAction::ListUsers => client.get(base.join("/users/")?).send().await?,
                LoadAction::HealthCheck => client.get(base.join("/health")?).send().await?,
            };

            response.error_for_status()?;
            Ok(())
        })
    }
}

/// Generates concurrent synthetic requests for a fixed wall-clock duration,
/// tallying successes and failures without aborting on transient errors.
pub struct LoadDriver {
    plan: LoadPlan,
}

impl LoadDriver {
    pub fn new(plan: LoadPlan) -> Self {
        Self { plan }
    }

    /// Run the load window. `make_service` builds one issuer service per
    /// worker; each worker is paced by its own rate limit and repeats until
    /// the window closes or `shutdown` is cancelled. Request failures are
    /// tallied into the per-second timeline; a failure never aborts the run.
    pub async fn run<S, F>(&self, shutdown: CancellationToken, make_service: F) -> LoadSummary
    where
        S: Service<LoadAction, Response = (), Error = eyre::Report> + Send + 'static,
        S::Future: Send,
        F: Fn() -> S,
    {
        let started = Instant::now();
        let deadline = started + self.plan.duration;

        tracing::info!(
            duration_secs = self.plan.duration.as_secs_f64(),
            concurrency = self.plan.concurrency,
            rate_limit = self.plan.rate_limit,
            "Load window opened"
        );

        let mut workers: JoinSet<BTreeMap<u64, (u64, u64)>> = JoinSet::new();
        for worker in 0..self.plan.concurrency {
            let plan = self.plan.clone();
            let shutdown = shutdown.clone();
            let mut service = ServiceBuilder::new()
                .rate_limit(plan.rate_limit, Duration::from_secs(1))
                .service(make_service());

            workers.spawn(async move {
                let mut tally: BTreeMap<u64, (u64, u64)> = BTreeMap::new();
                let mut roll = worker as u8;

                while Instant::now() < deadline && !shutdown.is_cancelled() {
                    let action = LoadAction::pick(roll);
                    roll = roll.wrapping_add(1);

                    let result = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = async {
                            match service.ready().await {
                                Ok(svc) => svc.call(action).await,
                                Err(e) => Err(e),
                            }
                        } => result,
                    };

                    let offset = started.elapsed().as_secs();
                    let bucket = tally.entry(offset).or_insert((0, 0));
                    match result {
                        Ok(()) => bucket.0 += 1,
                        Err(e) => {
                            bucket.1 += 1;
                            tracing::debug!(
                                worker = worker,
                                action = ?action,
                                error = %e,
                                "Load request failed; continuing"
                            );
                        }
                    }

                    let think = {
                        let mut rng = rand::rng();
                        rng.random_range(
                            plan.think_time_min.as_millis() as u64
                                ..=plan.think_time_max.as_millis() as u64,
                        )
                    };
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_millis(think)) => {}
                    }
                }

                tally
            });
        }

        let mut merged: BTreeMap<u64, (u64, u64)> = BTreeMap::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(tally) => {
                    for (offset, (ok, err)) in tally {
                        let bucket = merged.entry(offset).or_insert((0, 0));
                        bucket.0 += ok;
                        bucket.1 += err;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Load worker join failed");
                }
            }
        }

        let summary = LoadSummary {
            success_count: merged.values().map(|(ok, _)| ok).sum(),
            failure_count: merged.values().map(|(_, err)| err).sum(),
            timeline: merged
                .into_iter()
                .map(|(offset_secs, (successes, failures))| SecondBucket {
                    offset_secs,
                    successes,
                    failures,
                })
                .collect(),
        };

        tracing::info!(
            total = summary.total(),
            failures = summary.failure_count,
            error_rate = format!("{:.2}%", summary.error_rate()),
            cancelled = shutdown.is_cancelled(),
            "Load window closed"
        );

        summary
    }
}
