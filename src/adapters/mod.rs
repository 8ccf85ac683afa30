//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Jupiter: DEX aggregator API client (quote + swap instruction)
//! - Solana: RPC client and local keypair signer
//! - Storage: trade journals
//! - Metrics: `metrics` facade counters and histograms
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod jupiter;
pub mod metrics;
pub mod solana;
pub mod storage;

pub use cli::CliApp;
pub use jupiter::JupiterClient;
pub use self::metrics::RecorderMetrics;
pub use solana::{LocalSigner, SolanaClient};
pub use storage::{FileJournal, MemoryJournal};
