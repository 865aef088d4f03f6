//! Main entry point for the match-harvester CLI

use clap::Parser;
use match_harvester::cli::{Cli, Commands};
use match_harvester::metrics;
use match_harvester::shutdown::{self, ShutdownCoordinator};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("match_harvester=info"));

    // Logs go to stderr so that stdout stays parseable with --output-format json
    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    // Install global shutdown coordinator and Ctrl+C handler
    let shutdown = ShutdownCoordinator::shared();
    shutdown::set_global_shutdown(shutdown.clone());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - finishing current item and saving progress...");
                shutdown.request_shutdown();
            }
        }
    });

    if let Some(addr) = cli.metrics_addr {
        match metrics::init_metrics(addr).await {
            Ok(()) => info!(%addr, "Prometheus exporter listening"),
            Err(e) => error!(%addr, error = %e, "Failed to start metrics exporter"),
        }
    }

    let result = match &cli.command {
        Commands::Harvest(args) => args
            .execute(&cli, shutdown.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Reset(args) => args.execute(&cli).map_err(|e| anyhow::anyhow!(e)),
        Commands::Status(args) => args.execute(&cli).map_err(|e| anyhow::anyhow!(e)),
        Commands::Export(args) => args.execute(&cli).map_err(|e| anyhow::anyhow!(e)),
        Commands::Platforms(cmd) => cmd
            .execute(cli.output_format)
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Validate(cmd) => cmd.execute().map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
