//! Main entry point for the catalog-downloader CLI

use catalog_downloader::cli::{Cli, CliError, Commands};
use catalog_downloader::metrics::init_metrics;
use catalog_downloader::shutdown::ShutdownCoordinator;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing(verbose: bool) {
    // Check if JSON output is requested via environment variable
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("catalog_downloader={default_level}")));

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

async fn run(cli: &Cli) -> anyhow::Result<()> {
    if let Some(addr) = cli.metrics_addr {
        init_metrics(addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to start metrics exporter: {e}"))?;
    }

    let shutdown = ShutdownCoordinator::shared();
    shutdown.listen_for_ctrl_c();

    match &cli.command {
        Commands::Download(args) => args.execute(cli, shutdown.clone()).await?,
        Commands::ListGenres(args) => args.execute(cli).await?,
        Commands::ListBooks(args) => args.execute(cli).await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli).await {
        let code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
        if code != 130 {
            error!("Command failed: {}", e);
        }
        std::process::exit(code);
    }
}
