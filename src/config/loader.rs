//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config/mainnet.toml.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adapters::jupiter::JupiterConfig;
use crate::adapters::solana::parse_commitment;
use crate::application::{PollerConfig, RetryPolicy, ServiceConfig};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub solana: SolanaSection,
    #[serde(default)]
    pub jupiter: JupiterSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub confirmation: ConfirmationSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Solana RPC configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct SolanaSection {
    /// RPC endpoint (use private RPC for production)
    pub rpc_url: String,
    /// Wallet keypair path (NEVER commit this file!)
    pub keypair_path: String,
    /// Commitment level: "processed", "confirmed", "finalized"
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub skip_preflight: bool,
}

impl SolanaSection {
    /// Get RPC URL with environment variable override
    /// Checks SOLANA_RPC_URL env var first, falls back to config value
    pub fn get_rpc_url(&self) -> String {
        std::env::var("SOLANA_RPC_URL").unwrap_or_else(|_| self.rpc_url.clone())
    }

    /// Keypair path with SOLANA_KEYPAIR_PATH override and `~` expanded
    pub fn get_keypair_path(&self) -> PathBuf {
        let raw = std::env::var("SOLANA_KEYPAIR_PATH").unwrap_or_else(|_| self.keypair_path.clone());
        PathBuf::from(shellexpand::tilde(&raw).into_owned())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Jupiter API configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct JupiterSection {
    #[serde(default = "default_jupiter_url")]
    pub api_base_url: String,
    /// Optional API key for higher rate limits (get from jup.ag)
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_jupiter_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_jupiter_retries")]
    pub max_retries: u32,
}

impl Default for JupiterSection {
    fn default() -> Self {
        Self {
            api_base_url: default_jupiter_url(),
            api_key: None,
            timeout_secs: default_jupiter_timeout_secs(),
            max_retries: default_jupiter_retries(),
        }
    }
}

impl JupiterSection {
    /// Get API key with environment variable fallback
    /// Checks JUPITER_API_KEY env var if config value is empty/None
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        std::env::var("JUPITER_API_KEY").ok()
    }

    pub fn client_config(&self) -> JupiterConfig {
        JupiterConfig {
            api_base_url: self.api_base_url.trim_end_matches('/').to_string(),
            api_key: self.get_api_key(),
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
        }
    }
}

/// Swap preparation and broadcast section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Slippage tolerance in basis points (0.5% = 50 bps)
    pub default_slippage_bps: u16,
    /// Quotes older than this are refused
    pub max_quote_age_ms: u64,
    pub retry_base_delay_ms: u64,
    pub retry_multiplier: u32,
    /// Broadcast attempts, including the first
    pub max_send_attempts: u32,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            default_slippage_bps: 50,
            max_quote_age_ms: 10_000,
            retry_base_delay_ms: retry.base_delay.as_millis() as u64,
            retry_multiplier: retry.multiplier,
            max_send_attempts: retry.max_attempts,
        }
    }
}

/// Confirmation polling section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfirmationSection {
    pub poll_interval_ms: u64,
    /// Confirmations at which a trade counts as final
    pub finality_threshold: u64,
    pub max_timeout_secs: u64,
    pub max_concurrent_pollers: usize,
    pub queue_capacity: usize,
}

impl Default for ConfirmationSection {
    fn default() -> Self {
        let poller = PollerConfig::default();
        Self {
            poll_interval_ms: poller.poll_interval.as_millis() as u64,
            finality_threshold: poller.finality_threshold,
            max_timeout_secs: poller.max_timeout.as_secs(),
            max_concurrent_pollers: poller.max_concurrent,
            queue_capacity: poller.queue_capacity,
        }
    }
}

/// Trade journal section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// One JSON document per trade is kept here
    pub trades_dir: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            trades_dir: "data/trades".to_string(),
        }
    }
}

impl StorageSection {
    pub fn trades_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.trades_dir).into_owned())
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_jupiter_url() -> String {
    JupiterConfig::default().api_base_url
}

fn default_jupiter_timeout_secs() -> u64 {
    30
}

fn default_jupiter_retries() -> u32 {
    3
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Solana
        if self.solana.rpc_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "rpc_url cannot be empty".to_string(),
            ));
        }

        if self.solana.keypair_path.is_empty() {
            return Err(ConfigError::ValidationError(
                "keypair_path cannot be empty".to_string(),
            ));
        }

        if parse_commitment(&self.solana.commitment).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "commitment must be processed, confirmed or finalized, got {}",
                self.solana.commitment
            )));
        }

        // Jupiter
        if self.jupiter.api_base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "api_base_url cannot be empty".to_string(),
            ));
        }

        if self.jupiter.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "jupiter.max_retries must be > 0".to_string(),
            ));
        }

        // Execution
        if self.execution.default_slippage_bps > 10_000 {
            return Err(ConfigError::ValidationError(format!(
                "default_slippage_bps must be 0-10000, got {}",
                self.execution.default_slippage_bps
            )));
        }

        if self.execution.max_quote_age_ms == 0 {
            return Err(ConfigError::ValidationError(
                "max_quote_age_ms must be > 0".to_string(),
            ));
        }

        if self.execution.max_send_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_send_attempts must be > 0".to_string(),
            ));
        }

        if self.execution.retry_multiplier == 0 {
            return Err(ConfigError::ValidationError(
                "retry_multiplier must be > 0".to_string(),
            ));
        }

        // Confirmation
        let c = &self.confirmation;
        if c.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be > 0".to_string(),
            ));
        }

        if c.finality_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "finality_threshold must be > 0".to_string(),
            ));
        }

        if c.max_timeout_secs == 0 || c.max_timeout_secs * 1000 < c.poll_interval_ms {
            return Err(ConfigError::ValidationError(format!(
                "max_timeout_secs must cover at least one poll interval, got {}s",
                c.max_timeout_secs
            )));
        }

        if c.max_concurrent_pollers == 0 || c.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_pollers and queue_capacity must be > 0".to_string(),
            ));
        }

        // Storage
        if self.storage.trades_dir.is_empty() {
            return Err(ConfigError::ValidationError(
                "trades_dir cannot be empty".to_string(),
            ));
        }

        // Logging
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of {:?}, got {}",
                LOG_LEVELS, self.logging.level
            )));
        }

        Ok(())
    }

    /// Tunables for the swap path
    pub fn service_config(&self) -> ServiceConfig {
        let c = &self.confirmation;
        ServiceConfig {
            poller: PollerConfig {
                poll_interval: Duration::from_millis(c.poll_interval_ms),
                finality_threshold: c.finality_threshold,
                max_timeout: Duration::from_secs(c.max_timeout_secs),
                max_concurrent: c.max_concurrent_pollers,
                queue_capacity: c.queue_capacity,
            },
            retry: RetryPolicy {
                base_delay: Duration::from_millis(self.execution.retry_base_delay_ms),
                multiplier: self.execution.retry_multiplier,
                max_attempts: self.execution.max_send_attempts,
            },
            max_quote_age: Duration::from_millis(self.execution.max_quote_age_ms),
        }
    }
}
