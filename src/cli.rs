use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "resilience-harness")]
#[command(about = "Recovery and resilience test orchestrator for an API + database topology")]
#[command(version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run resilience scenarios
    Run(RunArgs),

    /// List available scenarios
    List,
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Scenarios to run (empty = all)
    pub scenarios: Vec<String>,

    /// Path to topology file
    #[arg(short, long, default_value = "topology.yaml")]
    pub topology_file: String,

    /// Base URL of the API under test
    #[arg(long, env = "API_BASE_URL", default_value = "http://api:8000")]
    pub base_url: String,

    /// Connection pool size (small so exhaustion is reachable in tests)
    #[arg(long, default_value_t = 3)]
    pub pool_size: usize,

    /// Recovery SLA in seconds
    #[arg(long, default_value_t = 15)]
    pub sla_seconds: u64,

    /// Load window duration in seconds
    #[arg(long, default_value_t = 60)]
    pub load_duration_seconds: u64,

    /// Number of concurrent load issuers
    #[arg(long, default_value_t = 10)]
    pub concurrency: usize,

    /// Requests per second budget per issuer
    #[arg(long, default_value_t = 20)]
    pub rate_limit: u64,

    /// Failure injection offset inside the load window, in seconds
    #[arg(long, default_value_t = 30)]
    pub chaos_offset_seconds: u64,

    /// Downtime between killing the chaos target and starting it again
    #[arg(long, default_value_t = 3)]
    pub chaos_downtime_seconds: u64,

    /// Global deadline per scenario in seconds
    #[arg(long, default_value_t = 180)]
    pub scenario_deadline_seconds: u64,

    /// Directory for report artifacts
    #[arg(long, default_value = "reports")]
    pub report_dir: String,

    /// Settle delay after docker start, in seconds
    #[arg(long, default_value_t = 2)]
    pub docker_settle_seconds: u64,
}
