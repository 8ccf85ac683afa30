//! Swap path errors
//!
//! One error type for the client-facing operations. Port errors convert
//! into it according to how the caller should react.

use thiserror::Error;

use crate::domain::{TradeId, TransitionError};
use crate::ports::{JournalError, LedgerError, QuoteError};

#[derive(Debug, Error)]
pub enum SwapError {
    /// Bad input or unusable quote; not retried
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Ledger could not be reached within the retry budget
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// Ledger explicitly rejected or failed the transaction
    #[error("Transaction rejected: {0}")]
    Transaction(String),

    /// A bounded wait ended before the trade became terminal. The trade
    /// itself fails with a `timeout` failure once its window closes.
    #[error("Confirmation timed out: {0}")]
    Timeout(String),

    /// Duplicate signature reached storage
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Trade not found: {0}")]
    NotFound(TradeId),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Storage error: {0}")]
    Storage(#[from] JournalError),
}

impl SwapError {
    /// Stable label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            SwapError::Validation(_) => "validation",
            SwapError::Unavailable(_) => "unavailable",
            SwapError::Transaction(_) => "transaction",
            SwapError::Timeout(_) => "timeout",
            SwapError::Conflict(_) => "conflict",
            SwapError::NotFound(_) => "not_found",
            SwapError::InvalidTransition(_) => "invalid_transition",
            SwapError::Storage(_) => "storage",
        }
    }

    /// Whether the same request may succeed if repeated later
    pub fn is_retryable(&self) -> bool {
        matches!(self, SwapError::Unavailable(_))
    }
}

impl From<LedgerError> for SwapError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Rejected(msg) => SwapError::Transaction(msg),
            other => SwapError::Unavailable(other.to_string()),
        }
    }
}

impl From<QuoteError> for SwapError {
    fn from(err: QuoteError) -> Self {
        if err.is_transient() {
            SwapError::Unavailable(format!("Quote service: {}", err))
        } else {
            SwapError::Validation(format!("Quote rejected: {}", err))
        }
    }
}
