//! pbapd entry point

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pbap_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(path) = &cli.counters_file {
        config.simulator.counters_file = Some(path.clone());
    }

    CommandDispatcher::execute(cli, config).await?;

    info!("pbapd exited successfully");
    Ok(())
}

/// Setup logging; `RUST_LOG` overrides the verbosity flag
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
