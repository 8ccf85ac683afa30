//! CLI Command Handlers
//!
//! Implementation of all CLI commands for swap-tracker.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::jupiter::JupiterClient;
use crate::adapters::metrics::RecorderMetrics;
use crate::adapters::solana::{LocalSigner, SolanaClient, parse_commitment};
use crate::adapters::storage::FileJournal;
use crate::application::{PreparedSwap, SwapError, SwapRequest, SwapService};
use crate::config::Config;
use crate::domain::{Trade, TradeId, native_mint};
use crate::ports::{QuotePort, RouteRequest, TradeJournal};

/// swap-tracker - Jupiter swap execution with on-chain confirmation tracking
#[derive(Parser, Debug)]
#[command(
    name = "swap-tracker",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Jupiter swap execution with on-chain confirmation tracking",
    long_about = "swap-tracker prepares Jupiter swaps as unsigned Solana transactions, \
                  broadcasts signed ones, and follows each trade until it is finalized, \
                  fails, or times out."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE", default_value = "config/mainnet.toml")]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Get a quote for a token swap
    Quote(QuoteCmd),

    /// Build an unsigned swap transaction for an external signer
    Prepare(PrepareCmd),

    /// Prepare, sign with the local keypair, submit and track a swap
    Swap(SwapCmd),

    /// Show a tracked trade
    Status(StatusCmd),
}

/// Get swap quote
#[derive(Parser, Debug)]
pub struct QuoteCmd {
    /// Input mint address, or SOL
    #[arg(value_name = "INPUT")]
    pub input_mint: String,

    /// Output mint address, or SOL
    #[arg(value_name = "OUTPUT")]
    pub output_mint: String,

    /// Amount in base units (lamports for SOL)
    #[arg(value_name = "AMOUNT")]
    pub amount: u64,

    /// Slippage tolerance in basis points (default from config)
    #[arg(long, value_name = "BPS")]
    pub slippage: Option<u16>,

    /// Wallet the route is quoted for (default: configured keypair)
    #[arg(long, value_name = "PUBKEY")]
    pub owner: Option<String>,
}

/// Build an unsigned transaction
#[derive(Parser, Debug)]
pub struct PrepareCmd {
    #[arg(value_name = "INPUT")]
    pub input_mint: String,

    #[arg(value_name = "OUTPUT")]
    pub output_mint: String,

    /// Amount in base units (lamports for SOL)
    #[arg(value_name = "AMOUNT")]
    pub amount: u64,

    #[arg(long, value_name = "BPS")]
    pub slippage: Option<u16>,

    /// Wallet that will sign (default: configured keypair)
    #[arg(long, value_name = "PUBKEY")]
    pub owner: Option<String>,
}

/// Execute swap
#[derive(Parser, Debug)]
pub struct SwapCmd {
    #[arg(value_name = "INPUT")]
    pub input_mint: String,

    #[arg(value_name = "OUTPUT")]
    pub output_mint: String,

    /// Amount in base units (lamports for SOL)
    #[arg(value_name = "AMOUNT")]
    pub amount: u64,

    #[arg(long, value_name = "BPS")]
    pub slippage: Option<u16>,

    /// Confirm swap without prompting
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Return after broadcast instead of waiting for a terminal status
    #[arg(long)]
    pub no_wait: bool,
}

/// Show a tracked trade
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Trade id
    #[arg(value_name = "TRADE_ID", required_unless_present = "signature")]
    pub trade_id: Option<TradeId>,

    /// Look the trade up by transaction signature instead
    #[arg(long, value_name = "SIGNATURE", conflicts_with = "trade_id")]
    pub signature: Option<String>,

    /// Output format (text, json)
    #[arg(short, long, value_name = "FORMAT", default_value = "text")]
    pub format: String,
}

/// Execute the CLI command
pub async fn execute(app: CliApp, config: Config) -> Result<()> {
    match app.command {
        Command::Quote(cmd) => quote_command(cmd, &config).await,
        Command::Prepare(cmd) => prepare_command(cmd, &config).await,
        Command::Swap(cmd) => swap_command(cmd, &config).await,
        Command::Status(cmd) => status_command(cmd, &config).await,
    }
}

/// Mint address, with `SOL` accepted for the native mint
pub fn parse_mint(value: &str) -> Result<Pubkey> {
    if value.eq_ignore_ascii_case("SOL") {
        return Ok(native_mint());
    }
    Pubkey::from_str(value).with_context(|| format!("Invalid mint address: {}", value))
}

fn solana_client(config: &Config) -> Result<SolanaClient> {
    let commitment = parse_commitment(&config.solana.commitment)
        .with_context(|| format!("Unknown commitment: {}", config.solana.commitment))?;
    Ok(SolanaClient::with_settings(
        config.solana.get_rpc_url(),
        commitment,
        config.solana.request_timeout(),
        config.solana.skip_preflight,
    ))
}

fn jupiter_client(config: &Config) -> Result<JupiterClient> {
    JupiterClient::with_config(config.jupiter.client_config())
        .context("Failed to create Jupiter client")
}

/// Load the signing wallet with a helpful error message
fn load_signer(path: &Path) -> Result<LocalSigner> {
    if !path.exists() {
        bail!(
            "Wallet file not found: {}\n\n\
             To create a new wallet, run:\n  \
             solana-keygen new --outfile {}\n\n\
             Or point 'keypair_path' in your config (or SOLANA_KEYPAIR_PATH) at an existing one",
            path.display(),
            path.display()
        );
    }

    LocalSigner::from_file(path).with_context(|| {
        format!(
            "Failed to load wallet from '{}'. Expected format: JSON array of bytes",
            path.display()
        )
    })
}

fn resolve_owner(owner: Option<&str>, config: &Config) -> Result<Pubkey> {
    match owner {
        Some(key) => Pubkey::from_str(key).with_context(|| format!("Invalid owner: {}", key)),
        None => Ok(load_signer(&config.solana.get_keypair_path())?.pubkey()),
    }
}

fn swap_request(
    owner: Pubkey,
    input: &str,
    output: &str,
    amount: u64,
    slippage: Option<u16>,
    config: &Config,
) -> Result<SwapRequest> {
    Ok(SwapRequest {
        owner,
        from_mint: parse_mint(input)?,
        to_mint: parse_mint(output)?,
        amount,
        slippage_bps: slippage.unwrap_or(config.execution.default_slippage_bps),
    })
}

async fn start_service(config: &Config) -> Result<SwapService> {
    let ledger = Arc::new(solana_client(config)?);
    let quotes = Arc::new(jupiter_client(config)?);
    let journal = Arc::new(FileJournal::new(config.storage.trades_dir()));

    SwapService::start(
        ledger,
        quotes,
        journal,
        Arc::new(RecorderMetrics::new()),
        config.service_config(),
    )
    .await
    .context("Failed to start swap service")
}

/// Handle quote command
async fn quote_command(cmd: QuoteCmd, config: &Config) -> Result<()> {
    let owner = resolve_owner(cmd.owner.as_deref(), config)?;
    let request = swap_request(
        owner,
        &cmd.input_mint,
        &cmd.output_mint,
        cmd.amount,
        cmd.slippage,
        config,
    )?;
    tracing::info!("Fetching quote: {} -> {}", request.from_mint, request.to_mint);

    let jupiter = jupiter_client(config)?;
    let route = jupiter
        .get_quote(&RouteRequest {
            user: owner,
            input_mint: request.from_mint,
            output_mint: request.to_mint,
            amount: request.amount,
            slippage_bps: request.slippage_bps,
        })
        .await
        .context("Failed to get quote")?;

    println!("Quote: {} {} -> {} {}", route.in_amount, route.input_mint, route.out_amount, route.output_mint);
    println!("  Minimum out:  {} ({} bps slippage)", route.min_out_amount, request.slippage_bps);
    println!("  Price:        {}", route.price());
    println!("  Price impact: {}%", route.price_impact_pct);
    println!("  Fee:          {}", route.fee_amount);
    println!("  Route:        {}", route.hops.join(" -> "));

    Ok(())
}

fn print_prepared(prepared: &PreparedSwap) -> Result<()> {
    println!("Transaction (base64, unsigned):");
    println!(
        "{}",
        prepared
            .encode_transaction()
            .context("Failed to encode transaction")?
    );
    println!();
    println!("Required signers:");
    for signer in &prepared.required_signers {
        println!("  {}", signer);
    }
    println!();
    println!("Token accounts:");
    for req in &prepared.requirements {
        println!(
            "  {} ({}) {}",
            req.derived_address,
            req.mint,
            if req.needs_creation() { "created by this transaction" } else { "exists" }
        );
    }
    println!();
    println!("Draft:");
    println!(
        "{}",
        serde_json::to_string_pretty(&prepared.draft).context("Failed to serialize draft")?
    );
    Ok(())
}

/// Handle prepare command
async fn prepare_command(cmd: PrepareCmd, config: &Config) -> Result<()> {
    let owner = resolve_owner(cmd.owner.as_deref(), config)?;
    let request = swap_request(
        owner,
        &cmd.input_mint,
        &cmd.output_mint,
        cmd.amount,
        cmd.slippage,
        config,
    )?;

    let service = start_service(config).await?;
    let prepared = service.prepare(&request).await;
    service.shutdown();

    print_prepared(&prepared.context("Failed to prepare swap")?)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim(), "y" | "Y" | "yes"))
}

/// Handle swap command
async fn swap_command(cmd: SwapCmd, config: &Config) -> Result<()> {
    let signer = load_signer(&config.solana.get_keypair_path())?;
    let request = swap_request(
        signer.pubkey(),
        &cmd.input_mint,
        &cmd.output_mint,
        cmd.amount,
        cmd.slippage,
        config,
    )?;
    tracing::info!("Preparing swap: {} -> {}", request.from_mint, request.to_mint);

    let service = start_service(config).await?;
    let result = run_swap(&service, &signer, &request, &cmd, config).await;
    service.shutdown();
    let trade = result?;

    print_trade(&trade, "text")
}

async fn run_swap(
    service: &SwapService,
    signer: &LocalSigner,
    request: &SwapRequest,
    cmd: &SwapCmd,
    config: &Config,
) -> Result<Trade> {
    let prepared = service
        .prepare(request)
        .await
        .context("Failed to prepare swap")?;

    let draft = &prepared.draft;
    println!("Swap: {} {} -> {}", draft.amount, draft.from_mint, draft.to_mint);
    println!("  Expected out: {} (min {})", draft.expected_out_amount, draft.min_out_amount);
    println!("  Slippage:     {} bps", draft.slippage_bps);
    if prepared.account_creation_count() > 0 {
        println!("  Creates {} token account(s)", prepared.account_creation_count());
    }

    if !cmd.yes && !confirm("Sign and submit?")? {
        bail!("Swap aborted");
    }

    let signed = signer.sign(prepared).context("Failed to sign transaction")?;
    let trade = service.submit(signed).await.context("Failed to submit swap")?;
    println!("Submitted trade {}", trade.id);

    if cmd.no_wait {
        return Ok(trade);
    }

    // Poller gives up at max_timeout; allow one extra interval for the last write
    let c = &config.confirmation;
    let limit = Duration::from_secs(c.max_timeout_secs) + Duration::from_millis(c.poll_interval_ms) * 2;
    let check_every = Duration::from_millis(c.poll_interval_ms);
    match service.await_outcome(trade.id, check_every, limit).await {
        Err(SwapError::Timeout(reason)) => {
            tracing::warn!("{}", reason);
            service.get(trade.id).await.context("Failed to read trade")
        }
        result => result.context("Failed while tracking trade"),
    }
}

/// Handle status command
async fn status_command(cmd: StatusCmd, config: &Config) -> Result<()> {
    let journal = FileJournal::new(config.storage.trades_dir());

    let trade = match (cmd.trade_id, cmd.signature.as_deref()) {
        (Some(id), _) => journal.load(id).await.context("Failed to read trade")?,
        (None, Some(signature)) => journal
            .load_all()
            .await
            .context("Failed to read trades")?
            .into_iter()
            .find(|t| t.tx_signature.as_deref() == Some(signature)),
        (None, None) => bail!("Provide a trade id or --signature"),
    };

    match trade {
        Some(trade) => print_trade(&trade, &cmd.format),
        None => bail!("No trade found in {}", journal.dir().display()),
    }
}

fn print_trade(trade: &Trade, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(trade)?);
        return Ok(());
    }

    println!();
    println!("  Trade:         {}", trade.id);
    println!("  Status:        {}", trade.status);
    println!("  Swap:          {} {} -> {}", trade.amount, trade.from_mint, trade.to_mint);
    println!("  Expected out:  {} (min {})", trade.expected_out_amount, trade.min_out_amount);
    println!("  Signature:     {}", trade.tx_signature.as_deref().unwrap_or("-"));
    println!("  Confirmations: {}", trade.confirmations);
    println!("  Created:       {}", trade.created_at.to_rfc3339());
    if let Some(done) = trade.completed_at {
        println!("  Completed:     {}", done.to_rfc3339());
    }
    if let Some(ref error) = trade.error {
        println!("  Error:         {}", error);
    }
    Ok(())
}
