use clap::Parser;
use dotenv::dotenv;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use resilience_harness::{
    cli::{Cli, Commands, RunArgs},
    config::HarnessConfig,
    orchestrator::{
        DockerBackend, HealthEndpoint, HttpHealthEndpoint, LifecycleBackend, ScenarioRunner,
        SCENARIOS,
    },
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load environment variables from .env file
    dotenv().ok();

    // Initialize tracing with environment filter using CLI log level
    let log_level = format!("resilience_harness={},info", cli.log_level);
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::List => {
            for name in SCENARIOS {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Run(args) => run_scenarios(args).await,
    }
}

async fn run_scenarios(args: RunArgs) -> eyre::Result<()> {
    let config = HarnessConfig::from_run_args(&args)?;
    let topology = config.load_topology(&args.topology_file)?;

    tracing::info!(
        base_url = %config.base_url,
        services = topology.services.len(),
        "Starting resilience run"
    );

    let backend: Arc<dyn LifecycleBackend> =
        Arc::new(DockerBackend::new().with_settle(config.docker_settle));
    let endpoint: Arc<dyn HealthEndpoint> = Arc::new(HttpHealthEndpoint::new()?);

    let report_dir = config.report_dir.clone();
    let runner = ScenarioRunner::new(config, topology, backend, endpoint)?;

    let report = runner.run_all(&args.scenarios).await;
    let path = report.write_json(&report_dir)?;

    for scenario in &report.scenarios {
        let verdict = if scenario.passed { "PASS" } else { "FAIL" };
        match &scenario.error {
            Some(error) => println!("{verdict}  {} ({})", scenario.name, error),
            None => println!("{verdict}  {}", scenario.name),
        }
    }
    println!("Report written to {}", path.display());

    if !report.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}
