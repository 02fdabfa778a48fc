use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::HarnessConfig;
use crate::orchestrator::backend::LifecycleBackend;
use crate::orchestrator::chaos::ChaosScheduler;
use crate::orchestrator::controller::ServiceController;
use crate::orchestrator::error::{HarnessError, Result};
use crate::orchestrator::health::{HealthEndpoint, HealthProbe};
use crate::orchestrator::load::{HttpLoadService, LoadDriver, LoadSummary};
use crate::orchestrator::logging::ScenarioContext;
use crate::orchestrator::pool::ConnectionPoolManager;
use crate::orchestrator::types::{FailureKind, PoolState, RecoveryOutcome};
use crate::orchestrator::validator::RecoveryValidator;
use crate::report::{RecoveryRecord, RunReport, ScenarioReport};
use crate::topology::{ServiceKind, Topology};

/// Scenario names accepted by `run`
pub const SCENARIOS: &[&str] = &[
    "recovery-by-kill",
    "recovery-by-restart",
    "pool-exhaustion",
    "chaos-under-load",
];

/// What a scenario body hands back: captured metrics plus the assertion
/// failures it collected. Only infrastructure errors surface as `Err`.
struct ScenarioOutput {
    load: Option<LoadSummary>,
    recovery: Option<RecoveryOutcome>,
    failures: Vec<String>,
}

impl ScenarioOutput {
    fn new() -> Self {
        Self {
            load: None,
            recovery: None,
            failures: Vec::new(),
        }
    }

    fn check(&mut self, condition: bool, message: impl Into<String>) {
        if !condition {
            let message = message.into();
            tracing::error!(check = %message, "Scenario assertion failed");
            self.failures.push(message);
        }
    }
}

/// Composes controller, probe, pool, scheduler, validator and load driver
/// into named scenarios and produces pass/fail plus metrics.
///
/// Every scenario starts from a clean pool, runs under a global deadline,
/// and tears down unconditionally: stopped instances are brought back and
/// the API data set is cleaned before and after the body, on every exit
/// path.
pub struct ScenarioRunner {
    config: HarnessConfig,
    topology: Topology,
    controller: Arc<ServiceController>,
    probe: HealthProbe,
    chaos: ChaosScheduler,
    client: reqwest::Client,
}

impl ScenarioRunner {
    pub fn new(
        config: HarnessConfig,
        topology: Topology,
        backend: Arc<dyn LifecycleBackend>,
        endpoint: Arc<dyn HealthEndpoint>,
    ) -> eyre::Result<Self> {
        let probe = HealthProbe::new(endpoint);
        let controller = Arc::new(
            ServiceController::new(&topology, backend, probe.clone())
                .with_poll_interval(config.health_poll_interval),
        );
        let chaos = ChaosScheduler::new(Arc::clone(&controller));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            config,
            topology,
            controller,
            probe,
            chaos,
            client,
        })
    }

    /// Run the named scenarios (all of them when `names` is empty)
    pub async fn run_all(&self, names: &[String]) -> RunReport {
        let started_at = Utc::now();
        let selected: Vec<String> = if names.is_empty() {
            SCENARIOS.iter().map(|s| s.to_string()).collect()
        } else {
            names.to_vec()
        };

        let mut scenarios = Vec::with_capacity(selected.len());
        for name in &selected {
            let report = self.run(name).await;
            tracing::info!(
                scenario = %name,
                passed = report.passed,
                duration_ms = report.duration_ms,
                "Scenario finished"
            );
            scenarios.push(report);
        }

        RunReport {
            started_at,
            finished_at: Utc::now(),
            scenarios,
        }
    }

    /// Run one scenario by name under the global deadline, with guaranteed
    /// teardown and data cleanup around the body.
    pub async fn run(&self, name: &str) -> ScenarioReport {
        let ctx = ScenarioContext::new(name);
        let span = ctx.span();

        async {
            tracing::info!("Scenario starting");
            self.cleanup_data().await;

            // Dropping the dispatch future at the deadline disarms pending
            // injections via their handles; the token reaches the detached
            // load workers, which outlive the future otherwise.
            let cancel = CancellationToken::new();
            let result = match tokio::time::timeout(
                self.config.scenario_deadline,
                self.dispatch(name, &cancel),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    Err(HarnessError::Infrastructure {
                        service: name.to_string(),
                        reason: format!(
                            "scenario deadline of {:?} exceeded",
                            self.config.scenario_deadline
                        ),
                    })
                }
            };

            // Teardown runs regardless of which path the body took.
            self.teardown().await;
            self.cleanup_data().await;

            match result {
                Ok(output) => ScenarioReport {
                    name: name.to_string(),
                    passed: output.failures.is_empty(),
                    duration_ms: ctx.elapsed_ms(),
                    error: if output.failures.is_empty() {
                        None
                    } else {
                        Some(output.failures.join("; "))
                    },
                    load: output.load,
                    recovery: output.recovery.as_ref().map(RecoveryRecord::from),
                },
                Err(e) => ScenarioReport {
                    name: name.to_string(),
                    passed: false,
                    duration_ms: ctx.elapsed_ms(),
                    error: Some(e.to_string()),
                    load: None,
                    recovery: None,
                },
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, name: &str, cancel: &CancellationToken) -> Result<ScenarioOutput> {
        match name {
            "recovery-by-kill" => self.recovery_by_kill().await,
            "recovery-by-restart" => self.recovery_by_restart().await,
            "pool-exhaustion" => self.pool_exhaustion().await,
            "chaos-under-load" => self.chaos_under_load(cancel).await,
            other => Err(HarnessError::UnknownScenario(other.to_string())),
        }
    }

    fn service_of_kind(&self, kind: ServiceKind) -> Result<String> {
        self.topology
            .services
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| s.name.clone())
            .ok_or_else(|| HarnessError::UnknownService(kind.to_string()))
    }

    fn new_pool(&self) -> Arc<ConnectionPoolManager> {
        Arc::new(ConnectionPoolManager::new(self.config.pool_size))
    }

    fn validator_with(&self, pool: Arc<ConnectionPoolManager>) -> RecoveryValidator {
        RecoveryValidator::new(self.probe.clone(), self.topology.clone())
            .with_poll_interval(self.config.health_poll_interval)
            .with_pool(pool)
    }

    /// Kill the database, dispose the pool, confirm full recovery within
    /// the SLA, and prove the first post-disposal acquire binds a fresh
    /// server session.
    async fn recovery_by_kill(&self) -> Result<ScenarioOutput> {
        let api = self.service_of_kind(ServiceKind::Api)?;
        let database = self.service_of_kind(ServiceKind::Database)?;
        let mut output = ScenarioOutput::new();

        self.controller.wait_healthy(&api, self.config.sla).await?;

        let pool = self.new_pool();
        let baseline = pool.acquire()?;
        let baseline_epoch = baseline.session_epoch();
        pool.release(&baseline)?;

        let injection = self
            .chaos
            .schedule(Duration::ZERO, database.clone(), FailureKind::Kill);
        let event = injection
            .outcome()
            .await?
            .ok_or_else(|| HarnessError::Infrastructure {
                service: database.clone(),
                reason: "injection cancelled before firing".to_string(),
            })?;

        tokio::time::sleep(self.config.chaos_downtime).await;
        self.controller.start(&database).await?;

        let validator = self.validator_with(Arc::clone(&pool));
        let outcome = validator.observe(&event, self.config.sla).await?;

        output.check(outcome.recovered(), "database did not recover");
        output.check(outcome.within(self.config.sla), "recovery exceeded SLA");
        output.check(outcome.is_full(), "recovery was not classified full");

        // An acquire that would hand out a pre-kill connection here is the
        // historical stale-session bug; disposal must have already run.
        output.check(
            pool.state() == PoolState::Stale,
            "pool was not disposed after database kill",
        );
        match pool.acquire() {
            Ok(fresh) => {
                output.check(
                    fresh.session_epoch() > baseline_epoch,
                    "acquire after disposal reused the stale session epoch",
                );
                output.check(
                    pool.state() != PoolState::Stale,
                    "pool did not return to healthy after a fresh acquire",
                );
                pool.release(&fresh)?;
            }
            Err(e) => output.check(false, format!("acquire after disposal failed: {e}")),
        }

        if let Some(spec) = self.topology.get(&database) {
            let status = self.probe.poll_once(spec).await;
            output.check(
                status.database_reachable,
                "final health check reports database unreachable",
            );
        }

        output.recovery = Some(outcome);
        Ok(output)
    }

    /// Stop the API, then restart it: the restart must degrade to a plain
    /// start (no double-stop error) and recovery must be full.
    async fn recovery_by_restart(&self) -> Result<ScenarioOutput> {
        let api = self.service_of_kind(ServiceKind::Api)?;
        let mut output = ScenarioOutput::new();

        self.controller.stop(&api).await?;

        let injection = self
            .chaos
            .schedule(Duration::ZERO, api.clone(), FailureKind::Restart);
        let event = injection
            .outcome()
            .await?
            .ok_or_else(|| HarnessError::Infrastructure {
                service: api.clone(),
                reason: "injection cancelled before firing".to_string(),
            })?;

        let validator = self.validator_with(self.new_pool());
        let outcome = validator.observe(&event, self.config.sla).await?;

        output.check(outcome.recovered(), "api did not recover after restart");
        output.check(outcome.within(self.config.sla), "recovery exceeded SLA");
        output.check(outcome.is_full(), "recovery was not classified full");

        output.recovery = Some(outcome);
        Ok(output)
    }

    /// Fill every pool slot, prove the next acquire fails loudly, then
    /// prove releases restore availability.
    async fn pool_exhaustion(&self) -> Result<ScenarioOutput> {
        let mut output = ScenarioOutput::new();
        let pool = self.new_pool();

        let mut held = Vec::with_capacity(pool.max_size());
        for _ in 0..pool.max_size() {
            held.push(pool.acquire()?);
        }

        output.check(
            pool.state() == PoolState::Exhausted,
            "pool not marked exhausted at capacity",
        );
        output.check(
            pool.in_use() == pool.max_size(),
            "in_use does not equal max_size at capacity",
        );

        match pool.acquire() {
            Err(HarnessError::PoolExhausted { .. }) => {}
            Ok(_) => output.check(false, "acquire beyond capacity unexpectedly succeeded"),
            Err(e) => output.check(false, format!("unexpected acquire error: {e}")),
        }

        for conn in &held {
            pool.release(conn)?;
        }
        output.check(pool.in_use() == 0, "releases did not drain the pool");
        output.check(
            pool.state() == PoolState::Healthy,
            "pool not healthy after draining",
        );

        let again = pool.acquire()?;
        pool.release(&again)?;

        Ok(output)
    }

    /// Sustained load with a mid-window kill of a random target: the
    /// failure spike must stay inside the chaos window, recovery must be
    /// full within the SLA, and data written during the window must
    /// survive.
    async fn chaos_under_load(&self, cancel: &CancellationToken) -> Result<ScenarioOutput> {
        let api = self.service_of_kind(ServiceKind::Api)?;
        let database = self.service_of_kind(ServiceKind::Database)?;
        let mut output = ScenarioOutput::new();

        let target = {
            let mut rng = rand::rng();
            if rng.random_bool(0.5) { api } else { database.clone() }
        };
        tracing::info!(target = %target, "Chaos target selected");

        let driver = LoadDriver::new(self.config.load.clone());
        let base_url = self.config.base_url.clone();
        let shutdown = cancel.clone();
        let load_handle = tokio::spawn(async move {
            driver
                .run(shutdown, move || HttpLoadService::new(base_url.clone()))
                .await
        });

        let injection =
            self.chaos
                .schedule(self.config.chaos_offset, target.clone(), FailureKind::Kill);
        let event = injection
            .outcome()
            .await?
            .ok_or_else(|| HarnessError::Infrastructure {
                service: target.clone(),
                reason: "injection cancelled before firing".to_string(),
            })?;

        tokio::time::sleep(self.config.chaos_downtime).await;
        self.controller.start(&target).await?;

        let validator = self.validator_with(self.new_pool());
        let outcome = validator.observe(&event, self.config.sla).await?;

        let summary = load_handle
            .await
            .map_err(|e| HarnessError::Infrastructure {
                service: "load-driver".to_string(),
                reason: e.to_string(),
            })?;

        output.check(summary.total() > 0, "load window issued no requests");
        output.check(summary.failure_count > 0, "no failure spike observed");
        output.check(
            summary.error_rate() < 30.0,
            format!("error rate too high: {:.2}%", summary.error_rate()),
        );

        if let Some((first, last)) = summary.failure_window() {
            let window_start = self.config.chaos_offset.as_secs();
            let window_end = window_start
                + self.config.chaos_downtime.as_secs()
                + self.config.sla.as_secs();
            // one-second tolerance for bucket boundaries
            output.check(
                first + 1 >= window_start,
                format!("failures began at t={first}s, before the injection at t={window_start}s"),
            );
            output.check(
                last <= window_end + 1,
                format!("failures persisted to t={last}s, past the SLA window end t={window_end}s"),
            );
        }

        output.check(outcome.recovered(), "target did not recover");
        output.check(outcome.within(self.config.sla), "recovery exceeded SLA");
        output.check(outcome.is_full(), "recovery was not classified full");

        if let Some(spec) = self.topology.get(&database) {
            let status = self.probe.poll_once(spec).await;
            output.check(
                status.database_reachable,
                "final health check reports database unreachable",
            );
        }

        match self.fetch_user_count().await {
            Ok(count) => output.check(count > 0, "no users survived the chaos window"),
            Err(e) => output.check(false, format!("data consistency check failed: {e}")),
        }

        output.load = Some(summary);
        output.recovery = Some(outcome);
        Ok(output)
    }

    /// Bring every instance back to running, databases first so dependents
    /// come up against a live upstream. Teardown failures are logged, never
    /// propagated.
    async fn teardown(&self) {
        let mut services: Vec<_> = self.topology.services.clone();
        services.sort_by_key(|s| match s.kind {
            ServiceKind::Database => 0,
            ServiceKind::Api => 1,
        });

        for spec in services {
            if let Err(e) = self
                .controller
                .ensure_running(&spec.name, self.config.sla)
                .await
            {
                tracing::error!(
                    service = %spec.name,
                    error = %e,
                    "Teardown could not restore service"
                );
            }
        }
    }

    /// Delete all users through the CRUD API so every scenario starts and
    /// ends from a deterministic data set. Failures here are warnings, not
    /// scenario failures.
    async fn cleanup_data(&self) {
        let users_url = match self.config.base_url.join("/users/") {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid users URL; skipping cleanup");
                return;
            }
        };

        let users: Vec<serde_json::Value> = match self
            .client
            .get(users_url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(response) => match response.json().await {
                Ok(users) => users,
                Err(e) => {
                    tracing::warn!(error = %e, "Unable to parse users for cleanup");
                    return;
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Unable to fetch users for cleanup");
                return;
            }
        };

        for user in users {
            let Some(id) = user.get("id").and_then(|v| v.as_i64()) else {
                continue;
            };
            let Ok(url) = users_url.join(&id.to_string()) else {
                continue;
            };
            if let Err(e) = self.client.delete(url).send().await {
                tracing::warn!(user_id = id, error = %e, "Failed to delete user");
            }
        }
    }

    async fn fetch_user_count(&self) -> eyre::Result<usize> {
        let url = self.config.base_url.join("/users/")?;
        let users: Vec<serde_json::Value> = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(users.len())
    }
}
