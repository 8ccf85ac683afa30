//! Submitter
//!
//! Broadcasts a signed swap exactly once and opens its trade record. The
//! transaction's first signature identifies the trade, so resubmitting the
//! same payload returns the existing trade instead of broadcasting again.
//! Concurrent submits of one payload queue on a per-signature reservation;
//! only the first broadcasts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{signature::Signature, transaction::Transaction};
use tokio::sync::Mutex;

use super::error::SwapError;
use super::poller::{PollJob, PollerHandle};
use super::store::{StoreError, TradeStateStore};
use crate::domain::{Trade, TradeDraft, TradeStatus, TransitionError};
use crate::ports::{LedgerPort, MetricsSink};

/// Backoff for retriable broadcast errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: u32,
    /// Total attempts, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            multiplier: 2,
            max_attempts: 3,
        }
    }
}

/// A transaction signed by the external signer, with the draft it was
/// prepared from
#[derive(Debug, Clone)]
pub struct SignedSwap {
    pub transaction: Transaction,
    pub draft: TradeDraft,
}

impl SignedSwap {
    /// The signature that identifies this swap on the ledger and in the store
    pub fn canonical_signature(&self) -> Result<Signature, SwapError> {
        let signature = self
            .transaction
            .signatures
            .first()
            .copied()
            .ok_or_else(|| SwapError::Validation("Transaction has no signatures".into()))?;

        if signature == Signature::default() {
            return Err(SwapError::Validation("Transaction is not signed".into()));
        }
        self.transaction
            .verify()
            .map_err(|e| SwapError::Validation(format!("Signature verification failed: {}", e)))?;

        Ok(signature)
    }
}

pub struct Submitter {
    ledger: Arc<dyn LedgerPort>,
    store: Arc<TradeStateStore>,
    poller: PollerHandle,
    metrics: Arc<dyn MetricsSink>,
    retry: RetryPolicy,
    in_flight: Mutex<HashMap<Signature, Arc<Mutex<()>>>>,
}

impl Submitter {
    pub fn new(
        ledger: Arc<dyn LedgerPort>,
        store: Arc<TradeStateStore>,
        poller: PollerHandle,
        metrics: Arc<dyn MetricsSink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            store,
            poller,
            metrics,
            retry,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn submit(&self, swap: SignedSwap) -> Result<Trade, SwapError> {
        let result = self.submit_once(swap).await;
        if let Err(e) = &result {
            tracing::error!("Submit failed: {}", e);
            self.metrics.error_recorded(e.kind());
        }
        result
    }

    async fn submit_once(&self, swap: SignedSwap) -> Result<Trade, SwapError> {
        let signature = swap.canonical_signature()?;

        if !swap.draft.status.can_transition_to(TradeStatus::Submitted) {
            return Err(TransitionError {
                from: swap.draft.status,
                to: TradeStatus::Submitted,
            }
            .into());
        }

        let slot = {
            let mut in_flight = self.in_flight.lock().await;
            Arc::clone(in_flight.entry(signature).or_default())
        };
        let result = {
            let _reserved = slot.lock().await;
            self.submit_reserved(swap, signature).await
        };

        let mut in_flight = self.in_flight.lock().await;
        // Only the map and this call still hold the slot
        if Arc::strong_count(&slot) == 2 {
            in_flight.remove(&signature);
        }
        result
    }

    /// Broadcast and store `swap`; the caller holds the signature's slot
    async fn submit_reserved(
        &self,
        swap: SignedSwap,
        signature: Signature,
    ) -> Result<Trade, SwapError> {
        let key = signature.to_string();

        if let Some(existing) = self.store.get_by_signature(&key).await {
            tracing::info!("Signature {} already tracked as trade {}", key, existing.id);
            return Ok(existing);
        }

        let returned = self.broadcast(&swap.transaction).await?;
        if returned != signature {
            tracing::warn!(
                "Ledger returned signature {} for {}, keeping the transaction's own",
                returned, signature
            );
        }
        tracing::info!("Broadcast swap {}", key);

        let trade = swap.draft.into_submitted(key)?;
        let trade = match self.store.create(trade).await {
            Ok(trade) => trade,
            Err(StoreError::Conflict { existing, .. }) => {
                tracing::info!("Concurrent submit of {} resolved to trade {}", signature, existing);
                return self.store.get(existing).await.ok_or(SwapError::NotFound(existing));
            }
            Err(e) => {
                tracing::error!(
                    "Swap {} is on the ledger but its trade could not be stored: {}",
                    signature, e
                );
                return Err(e.into());
            }
        };
        self.metrics.trade_submitted(&trade);

        if let Err(e) = self.poller.schedule(PollJob::new(trade.id)).await {
            // The trade stays active in the store and is resumed on restart
            tracing::error!("Trade {} not scheduled for polling: {}", trade.id, e);
        }

        Ok(trade)
    }

    async fn broadcast(&self, transaction: &Transaction) -> Result<Signature, SwapError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut delay = self.retry.base_delay;
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.ledger.send_transaction(transaction).await {
                Ok(signature) => return Ok(signature),
                Err(e) if !e.is_retryable() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!("Broadcast attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = Some(e);

                    // Don't sleep after the last attempt
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                        delay *= self.retry.multiplier;
                    }
                }
            }
        }

        Err(SwapError::Unavailable(format!(
            "Broadcast failed after {} attempts: {}",
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}
