//! swap-tracker - Jupiter swap execution with on-chain confirmation tracking

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use swap_tracker::adapters::cli::{self, CliApp};
use swap_tracker::config::load_config;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in the config file)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    let config = load_config(&app.config)
        .with_context(|| format!("Failed to load configuration from {}", app.config.display()))?;
    init_logging(app.verbose, app.debug, &config.logging.level);

    cli::execute(app, config).await
}

/// RUST_LOG wins, then --debug, then -v, then the configured level
fn init_logging(verbose: bool, debug: bool, configured: &str) {
    let fallback = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        configured
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    fmt().with_env_filter(filter).with_target(false).init();
}
