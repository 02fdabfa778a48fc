use eyre::WrapErr;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::cli::RunArgs;
use crate::orchestrator::load::LoadPlan;
use crate::topology::Topology;

/// Harness configuration assembled from CLI arguments and environment
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Base URL of the API under test, resolved through the runtime's
    /// service discovery rather than loopback
    pub base_url: Url,
    /// Small on purpose so exhaustion is reachable within test time budgets
    pub pool_size: usize,
    /// Maximum tolerated duration between injection and confirmed recovery
    pub sla: Duration,
    pub load: LoadPlan,
    /// Offset of the failure injection inside the load window
    pub chaos_offset: Duration,
    /// Downtime between killing a chaos target and starting it again
    pub chaos_downtime: Duration,
    /// Global deadline per scenario; on expiry in-flight work is cancelled
    /// and teardown still runs
    pub scenario_deadline: Duration,
    pub health_poll_interval: Duration,
    pub report_dir: String,
    pub docker_settle: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://api:8000").expect("static URL"),
            pool_size: 3,
            sla: Duration::from_secs(15),
            load: LoadPlan::default(),
            chaos_offset: Duration::from_secs(30),
            chaos_downtime: Duration::from_secs(3),
            scenario_deadline: Duration::from_secs(180),
            health_poll_interval: Duration::from_secs(1),
            report_dir: "reports".to_string(),
            docker_settle: Duration::from_secs(2),
        }
    }
}

impl HarnessConfig {
    pub fn from_run_args(args: &RunArgs) -> eyre::Result<Self> {
        let base_url =
            Url::parse(&args.base_url).wrap_err("Invalid base URL for the API under test")?;

        let config = Self {
            base_url,
            pool_size: args.pool_size,
            sla: Duration::from_secs(args.sla_seconds),
            load: LoadPlan {
                duration: Duration::from_secs(args.load_duration_seconds),
                concurrency: args.concurrency,
                rate_limit: args.rate_limit,
                ..LoadPlan::default()
            },
            chaos_offset: Duration::from_secs(args.chaos_offset_seconds),
            chaos_downtime: Duration::from_secs(args.chaos_downtime_seconds),
            scenario_deadline: Duration::from_secs(args.scenario_deadline_seconds),
            health_poll_interval: Duration::from_secs(1),
            report_dir: args.report_dir.clone(),
            docker_settle: Duration::from_secs(args.docker_settle_seconds),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.pool_size == 0 {
            eyre::bail!("pool_size must be at least 1");
        }
        if self.chaos_offset >= self.load.duration {
            eyre::bail!(
                "chaos offset ({:?}) must fall inside the load window ({:?})",
                self.chaos_offset,
                self.load.duration
            );
        }
        if self.scenario_deadline <= self.load.duration {
            eyre::bail!("scenario deadline must exceed the load window");
        }
        Ok(())
    }

    /// Topology from the configured YAML file, or the docker-compose
    /// default when the file does not exist
    pub fn load_topology(&self, topology_file: &str) -> eyre::Result<Topology> {
        if Path::new(topology_file).exists() {
            let file = File::open(topology_file).wrap_err("Failed to open topology file")?;
            Topology::from_yaml(file)
        } else {
            tracing::info!(
                topology_file = topology_file,
                "Topology file not found; using default local topology"
            );
            Ok(Topology::default_local(self.base_url.as_str()))
        }
    }
}
