use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::{Trade, TradeId, TradeStatus};
use crate::ports::{JournalError, TradeJournal};

/// In-memory journal that also records every write in order
#[derive(Debug, Default)]
pub struct MemoryJournal {
    trades: Mutex<HashMap<TradeId, Trade>>,
    writes: Mutex<Vec<Trade>>,
    fail_writes: AtomicBool,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Journal pre-populated with `trades`, as if left by an earlier run
    pub fn with_trades(trades: impl IntoIterator<Item = Trade>) -> Self {
        let journal = Self::new();
        if let Ok(mut stored) = journal.trades.lock() {
            stored.extend(trades.into_iter().map(|t| (t.id, t)));
        }
        journal
    }

    /// Make subsequent writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Latest stored copy of a trade
    pub fn saved(&self, id: TradeId) -> Option<Trade> {
        self.trades.lock().ok()?.get(&id).cloned()
    }

    /// Every copy of `id` written so far, oldest first
    pub fn writes_for(&self, id: TradeId) -> Vec<Trade> {
        self.writes
            .lock()
            .map(|writes| writes.iter().filter(|t| t.id == id).cloned().collect())
            .unwrap_or_default()
    }

    pub fn status_history(&self, id: TradeId) -> Vec<TradeStatus> {
        self.writes_for(id).iter().map(|t| t.status).collect()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| w.len()).unwrap_or_default()
    }
}

#[async_trait]
impl TradeJournal for MemoryJournal {
    async fn save(&self, trade: &Trade) -> Result<(), JournalError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(JournalError::WriteError("memory journal is read-only".into()));
        }

        let mut trades = self
            .trades
            .lock()
            .map_err(|e| JournalError::WriteError(e.to_string()))?;
        trades.insert(trade.id, trade.clone());
        drop(trades);

        self.writes
            .lock()
            .map_err(|e| JournalError::WriteError(e.to_string()))?
            .push(trade.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Trade>, JournalError> {
        let trades = self
            .trades
            .lock()
            .map_err(|e| JournalError::ReadError(e.to_string()))?;
        Ok(trades.values().cloned().collect())
    }
}
