//! Trade Journal Port
//!
//! Durable key-value storage for trades, keyed by trade id.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Trade;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JournalError {
    #[error("Failed to serialize trade: {0}")]
    SerializationError(String),

    #[error("Failed to write trade file: {0}")]
    WriteError(String),

    #[error("Failed to read trade file: {0}")]
    ReadError(String),

    #[error("Trade file is corrupted: {0}")]
    CorruptedFile(String),

    #[error("Failed to create directory: {0}")]
    DirectoryError(String),
}

#[async_trait]
pub trait TradeJournal: Send + Sync {
    /// Insert or replace the stored copy of `trade`
    async fn save(&self, trade: &Trade) -> Result<(), JournalError>;

    /// Every stored trade, in no particular order
    async fn load_all(&self) -> Result<Vec<Trade>, JournalError>;
}
