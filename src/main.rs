//! Main entry point for the index-harvester CLI

use clap::Parser;
use index_harvester::cli::{Cli, Commands};
use index_harvester::shutdown::{self, InterruptCoordinator};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("index_harvester=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = index_harvester::metrics::init_metrics(addr) {
            warn!("Metrics exporter not started: {}", e);
        }
    }

    // First Ctrl+C drains and flushes, the second exits immediately
    let interrupt = InterruptCoordinator::shared();
    shutdown::install_signal_handler(interrupt.clone());

    let result: anyhow::Result<()> = match cli.command {
        Commands::Run(ref args) => args
            .execute(&cli, interrupt.clone())
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Status(ref status_cmd) => status_cmd
            .execute(&cli)
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
