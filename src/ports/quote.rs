//! Quote Port
//!
//! Route lookup against an external quote service. The core never computes
//! prices itself; it only validates what the service returns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("API request failed: {0}")]
    ApiError(String),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("No route found: {0}")]
    NoRoute(String),
    #[error("Invalid quote response: {0}")]
    InvalidResponse(String),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

impl QuoteError {
    /// Transport-level failures, as opposed to an answer we can't use
    pub fn is_transient(&self) -> bool {
        matches!(self, QuoteError::ApiError(_) | QuoteError::RateLimited)
    }
}

/// Parameters for a route lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    /// Wallet the swap instruction is built for
    pub user: Pubkey,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    /// Amount in base units (lamports for SOL)
    pub amount: u64,
    /// Slippage tolerance in basis points (1 = 0.01%)
    pub slippage_bps: u16,
}

/// A quoted route with its ready-to-use swap instruction and the
/// instructions the service wants around it
#[derive(Debug, Clone)]
pub struct Route {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub in_amount: u64,
    pub out_amount: u64,
    /// Minimum output amount after slippage
    pub min_out_amount: u64,
    /// Price impact percentage
    pub price_impact_pct: f64,
    /// Total route fee in base units
    pub fee_amount: u64,
    /// DEX labels per hop; empty means the service found no path
    pub hops: Vec<String>,
    /// Runs before the swap: wrapped-SOL funding and the token accounts the
    /// route expects
    pub setup_instructions: Vec<Instruction>,
    pub swap_instruction: Instruction,
    /// Runs after the swap, e.g. unwrapping SOL
    pub cleanup_instruction: Option<Instruction>,
    pub quoted_at: DateTime<Utc>,
}

impl Route {
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty() || self.out_amount == 0
    }

    /// Output units per input unit
    pub fn price(&self) -> Decimal {
        Decimal::from(self.out_amount)
            .checked_div(Decimal::from(self.in_amount))
            .unwrap_or_default()
    }

    /// Age of the quote relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.quoted_at
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuotePort: Send + Sync {
    async fn get_quote(&self, request: &RouteRequest) -> Result<Route, QuoteError>;
}
