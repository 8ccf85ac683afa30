//! Ledger Port
//!
//! The three ledger capabilities the swap path needs, plus the blockhash
//! lookup required to assemble a transaction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    account::Account, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::Transaction,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Connection refused/reset or the request never completed
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limit exceeded")]
    RateLimited,

    /// The ledger explicitly refused the request (bad signature,
    /// insufficient funds, account in use, failed preflight)
    #[error("Rejected by ledger: {0}")]
    Rejected(String),
}

impl LedgerError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Connection(_) | LedgerError::Timeout | LedgerError::RateLimited
        )
    }
}

/// Latest ledger view of one signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureStatus {
    /// Blocks built on top of the one containing the transaction
    pub confirmations: u64,
    /// Rooted by the cluster; confirmation counting has stopped
    pub finalized: bool,
    /// Execution error reported for the transaction
    pub err: Option<String>,
}

impl SignatureStatus {
    pub fn confirmed(confirmations: u64) -> Self {
        Self {
            confirmations,
            finalized: false,
            err: None,
        }
    }

    pub fn finalized() -> Self {
        Self {
            confirmations: 0,
            finalized: true,
            err: None,
        }
    }

    pub fn failed(err: impl Into<String>) -> Self {
        Self {
            confirmations: 0,
            finalized: false,
            err: Some(err.into()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerPort: Send + Sync {
    /// Fetch an account; `None` when nothing is stored at the address
    async fn get_account_info(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError>;

    /// Broadcast a signed transaction
    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError>;

    /// `None` when the ledger has not seen the signature (yet)
    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, LedgerError>;

    async fn get_latest_blockhash(&self) -> Result<Hash, LedgerError>;
}
