//! CLI Adapter
//!
//! Command-line interface for swap-tracker.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{CliApp, Command, PrepareCmd, QuoteCmd, StatusCmd, SwapCmd, parse_mint};

use anyhow::Result;

use crate::config::Config;

/// Execute the CLI command
pub async fn execute(app: CliApp, config: Config) -> Result<()> {
    commands::execute(app, config).await
}
