//! Trade Lifecycle
//!
//! A trade is created when its signed transaction is broadcast and then moves
//! forward through a fixed status graph until it reaches a terminal status.
//!
//! ```text
//! pending -> submitted -> confirming -> finalized
//!    |           |  \          |  \
//!    |           |   cancelled |   cancelled
//!    +-> failed  +-> failed    +-> failed
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique trade identifier
pub type TradeId = Uuid;

/// Status of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    /// Prepared, not yet broadcast
    Pending,
    /// Broadcast, no confirmation observed yet
    Submitted,
    /// Landed in a block, waiting for finality
    Confirming,
    Finalized,
    Failed,
    /// Tracking stopped on request; the ledger transaction is not aborted
    Cancelled,
}

impl TradeStatus {
    /// Terminal statuses stop polling and freeze the trade
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Finalized | TradeStatus::Failed | TradeStatus::Cancelled
        )
    }

    /// Transition table. Every pair is spelled out so a new status cannot
    /// compile without deciding its edges.
    pub fn can_transition_to(self, next: TradeStatus) -> bool {
        use TradeStatus::*;

        match (self, next) {
            (Pending, Submitted) | (Pending, Failed) => true,
            (Pending, Pending | Confirming | Finalized | Cancelled) => false,

            (Submitted, Confirming) | (Submitted, Failed) | (Submitted, Cancelled) => true,
            (Submitted, Pending | Submitted | Finalized) => false,

            (Confirming, Finalized) | (Confirming, Failed) | (Confirming, Cancelled) => true,
            (Confirming, Pending | Submitted | Confirming) => false,

            (Finalized | Failed | Cancelled, _) => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Submitted => "submitted",
            TradeStatus::Confirming => "confirming",
            TradeStatus::Finalized => "finalized",
            TradeStatus::Failed => "failed",
            TradeStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted move along an edge that is not in the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Illegal trade transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: TradeStatus,
    pub to: TradeStatus,
}

/// Why a trade ended in `failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Input or quote was rejected before reaching the ledger
    Validation,
    /// The ledger rejected or failed the transaction
    Rejected,
    /// No terminal confirmation within the polling window
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Rejected => "rejected",
            FailureKind::Timeout => "timeout",
        }
    }
}

/// Failure reason attached to every `failed` trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TradeFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            kind.as_str().to_string()
        } else {
            message
        };
        Self { kind, message }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Rejected, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }
}

impl fmt::Display for TradeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// Unpersisted trade produced by preparation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDraft {
    pub owner: String,
    pub from_mint: String,
    pub to_mint: String,
    /// Input amount in base units
    pub amount: u64,
    /// Quoted output amount in base units
    pub expected_out_amount: u64,
    /// Minimum output after slippage
    pub min_out_amount: u64,
    /// Output units per input unit
    pub price: Decimal,
    /// Route fee in base units
    pub fee: u64,
    pub slippage_bps: u16,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
}

impl TradeDraft {
    /// Promote the draft to a broadcast trade carrying `signature`
    pub fn into_submitted(self, signature: String) -> Result<Trade, TransitionError> {
        let mut trade = Trade {
            id: Uuid::new_v4(),
            owner: self.owner,
            from_mint: self.from_mint,
            to_mint: self.to_mint,
            amount: self.amount,
            expected_out_amount: self.expected_out_amount,
            min_out_amount: self.min_out_amount,
            price: self.price,
            fee: self.fee,
            slippage_bps: self.slippage_bps,
            status: self.status,
            tx_signature: Some(signature),
            confirmations: 0,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        };
        trade.transition(TradeStatus::Submitted)?;
        Ok(trade)
    }
}

/// A broadcast swap and its confirmation progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub owner: String,
    pub from_mint: String,
    pub to_mint: String,
    pub amount: u64,
    pub expected_out_amount: u64,
    pub min_out_amount: u64,
    pub price: Decimal,
    pub fee: u64,
    pub slippage_bps: u16,
    pub status: TradeStatus,
    pub tx_signature: Option<String>,
    pub confirmations: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<TradeFailure>,
}

impl Trade {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next` if the transition table allows it
    pub fn transition(&mut self, next: TradeStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Transition to `failed` and attach the reason
    pub fn fail(&mut self, failure: TradeFailure) -> Result<(), TransitionError> {
        self.transition(TradeStatus::Failed)?;
        self.error = Some(failure);
        Ok(())
    }

    /// Record an observed confirmation count.
    ///
    /// Only applies while `confirming`, and only when the count does not go
    /// backward. Returns whether the count was accepted.
    pub fn record_confirmations(&mut self, observed: u64) -> bool {
        if self.status != TradeStatus::Confirming || observed < self.confirmations {
            return false;
        }
        self.confirmations = observed;
        true
    }

    /// Wall-clock time from creation to completion
    pub fn latency(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.created_at)
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trade {}: {} {} -> {} [{}] ({} confirmations)",
            self.id, self.amount, self.from_mint, self.to_mint, self.status, self.confirmations
        )
    }
}
