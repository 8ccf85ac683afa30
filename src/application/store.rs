//! Trade State Store
//!
//! Single source of truth for trade status. Each trade lives behind its own
//! async mutex, so work on different trades never contends; the index that
//! maps ids and signatures to those mutexes is only held for lookups and
//! inserts, never across journal I/O.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use super::error::SwapError;
use crate::domain::{Trade, TradeId, TradeStatus, TransitionError};
use crate::ports::{JournalError, TradeJournal};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Signature {signature} already tracked by trade {existing}")]
    Conflict { signature: String, existing: TradeId },

    #[error("Trade id {0} already exists")]
    DuplicateId(TradeId),

    #[error("Trade {0} has no transaction signature")]
    MissingSignature(TradeId),

    #[error("Trade not found: {0}")]
    NotFound(TradeId),

    #[error("Trade {id} is {status} and can no longer change")]
    Immutable { id: TradeId, status: TradeStatus },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl From<StoreError> for SwapError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. }
            | StoreError::DuplicateId(_)
            | StoreError::Immutable { .. } => SwapError::Conflict(err.to_string()),
            StoreError::MissingSignature(_) => SwapError::Validation(err.to_string()),
            StoreError::NotFound(id) => SwapError::NotFound(id),
            StoreError::Transition(e) => SwapError::InvalidTransition(e),
            StoreError::Journal(e) => SwapError::Storage(e),
        }
    }
}

#[derive(Default)]
struct StoreIndex {
    trades: HashMap<TradeId, Arc<Mutex<Trade>>>,
    by_signature: HashMap<String, TradeId>,
}

pub struct TradeStateStore {
    index: RwLock<StoreIndex>,
    journal: Arc<dyn TradeJournal>,
}

impl TradeStateStore {
    /// Open the store and load every trade the journal holds
    pub async fn open(journal: Arc<dyn TradeJournal>) -> Result<Self, StoreError> {
        let mut index = StoreIndex::default();

        for trade in journal.load_all().await? {
            if let Some(signature) = &trade.tx_signature {
                if let Some(existing) = index.by_signature.get(signature) {
                    tracing::warn!(
                        "Journal holds trade {} with signature {} already owned by {}, skipping",
                        trade.id, signature, existing
                    );
                    continue;
                }
                index.by_signature.insert(signature.clone(), trade.id);
            }
            index.trades.insert(trade.id, Arc::new(Mutex::new(trade)));
        }

        tracing::info!("Trade store opened with {} trades", index.trades.len());

        Ok(Self {
            index: RwLock::new(index),
            journal,
        })
    }

    async fn entry(&self, id: TradeId) -> Option<Arc<Mutex<Trade>>> {
        self.index.read().await.trades.get(&id).cloned()
    }

    pub async fn get(&self, id: TradeId) -> Option<Trade> {
        let entry = self.entry(id).await?;
        let trade = entry.lock().await;
        Some(trade.clone())
    }

    pub async fn get_by_signature(&self, signature: &str) -> Option<Trade> {
        let id = self.index.read().await.by_signature.get(signature).copied()?;
        self.get(id).await
    }

    /// Insert a broadcast trade. Fails with `Conflict` if its signature is
    /// already tracked.
    pub async fn create(&self, trade: Trade) -> Result<Trade, StoreError> {
        let signature = trade
            .tx_signature
            .clone()
            .ok_or(StoreError::MissingSignature(trade.id))?;
        let id = trade.id;

        // Publish the entry already locked so readers wait for the journal
        let entry = Arc::new(Mutex::new(trade));
        let guard = Arc::clone(&entry).lock_owned().await;
        {
            let mut index = self.index.write().await;
            if let Some(existing) = index.by_signature.get(&signature) {
                return Err(StoreError::Conflict {
                    signature,
                    existing: *existing,
                });
            }
            if index.trades.contains_key(&id) {
                return Err(StoreError::DuplicateId(id));
            }
            index.by_signature.insert(signature.clone(), id);
            index.trades.insert(id, Arc::clone(&entry));
        }

        if let Err(e) = self.journal.save(&guard).await {
            let mut index = self.index.write().await;
            index.by_signature.remove(&signature);
            index.trades.remove(&id);
            return Err(e.into());
        }

        tracing::debug!("Trade {} created for signature {}", id, signature);
        Ok(guard.clone())
    }

    /// Apply `mutation` to a non-terminal trade under its lock.
    ///
    /// The mutation runs on a copy; the copy is journaled and only then
    /// becomes visible. A failed mutation or journal write leaves the trade
    /// untouched.
    pub async fn update<F>(&self, id: TradeId, mutation: F) -> Result<Trade, StoreError>
    where
        F: FnOnce(&mut Trade) -> Result<(), TransitionError>,
    {
        let entry = self.entry(id).await.ok_or(StoreError::NotFound(id))?;
        let mut current = entry.lock().await;

        if current.is_terminal() {
            return Err(StoreError::Immutable {
                id,
                status: current.status,
            });
        }

        let mut next = current.clone();
        mutation(&mut next)?;

        if next != *current {
            self.journal.save(&next).await?;
            *current = next;
        }
        Ok(current.clone())
    }

    /// Apply a terminal `mutation` even when the journal cannot record it.
    ///
    /// The outcome is committed in memory regardless, so the trade stops
    /// being active for this process. The journal keeps the last state it
    /// accepted; on restart that trade is recovered and expires again.
    pub async fn close_out<F>(&self, id: TradeId, mutation: F) -> Result<Trade, StoreError>
    where
        F: FnOnce(&mut Trade) -> Result<(), TransitionError>,
    {
        let entry = self.entry(id).await.ok_or(StoreError::NotFound(id))?;
        let mut current = entry.lock().await;

        if current.is_terminal() {
            return Err(StoreError::Immutable {
                id,
                status: current.status,
            });
        }

        let mut next = current.clone();
        mutation(&mut next)?;

        if next != *current {
            if let Err(e) = self.journal.save(&next).await {
                tracing::error!(
                    "Trade {} is {} but the journal still holds {}: {}",
                    id, next.status, current.status, e
                );
            }
            *current = next;
        }
        Ok(current.clone())
    }

    /// Trades that have not reached a terminal status
    pub async fn list_active(&self) -> Vec<Trade> {
        let entries: Vec<_> = self.index.read().await.trades.values().cloned().collect();

        let mut active = Vec::new();
        for entry in entries {
            let trade = entry.lock().await;
            if !trade.is_terminal() {
                active.push(trade.clone());
            }
        }
        active
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.trades.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
