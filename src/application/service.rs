//! Swap Service
//!
//! Client-facing facade over the swap path. Owns the store and the poller
//! pool; on start it resumes polling for every trade a previous run left
//! unfinished.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use super::error::SwapError;
use super::poller::{ConfirmationPoller, PollJob, PollerConfig, PollerHandle, PollerPool};
use super::preparer::{DEFAULT_MAX_QUOTE_AGE, PreparedSwap, SwapRequest, TradePreparer};
use super::store::{StoreError, TradeStateStore};
use super::submitter::{RetryPolicy, SignedSwap, Submitter};
use crate::domain::{Trade, TradeId, TradeStatus, TransitionError};
use crate::ports::{LedgerPort, MetricsSink, QuotePort, TradeJournal};

/// Tunables for the whole swap path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    pub poller: PollerConfig,
    pub retry: RetryPolicy,
    pub max_quote_age: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            retry: RetryPolicy::default(),
            max_quote_age: DEFAULT_MAX_QUOTE_AGE,
        }
    }
}

pub struct SwapService {
    preparer: TradePreparer,
    submitter: Submitter,
    store: Arc<TradeStateStore>,
    pool: Mutex<PollerPool>,
    metrics: Arc<dyn MetricsSink>,
}

impl SwapService {
    /// Open the store, start the poller pool and resume unfinished trades
    pub async fn start(
        ledger: Arc<dyn LedgerPort>,
        quotes: Arc<dyn QuotePort>,
        journal: Arc<dyn TradeJournal>,
        metrics: Arc<dyn MetricsSink>,
        config: ServiceConfig,
    ) -> Result<Self, SwapError> {
        let store = Arc::new(TradeStateStore::open(journal).await?);

        let poller = Arc::new(ConfirmationPoller::new(
            ledger.clone(),
            store.clone(),
            metrics.clone(),
            config.poller,
        ));
        let (pool, handle) = PollerPool::spawn(poller);

        let service = Self {
            preparer: TradePreparer::new(ledger.clone(), quotes, config.max_quote_age),
            submitter: Submitter::new(
                ledger,
                store.clone(),
                handle.clone(),
                metrics.clone(),
                config.retry,
            ),
            store,
            pool: Mutex::new(pool),
            metrics,
        };

        service.recover(&handle).await?;
        Ok(service)
    }

    /// Re-enqueue every non-terminal trade, crediting the time already
    /// spent against its timeout
    async fn recover(&self, poller: &PollerHandle) -> Result<usize, SwapError> {
        let active = self.store.list_active().await;
        let now = Utc::now();

        for trade in &active {
            let age = (now - trade.created_at).to_std().unwrap_or(Duration::ZERO);
            tracing::info!("Resuming trade {} ({}, {:?} old)", trade.id, trade.status, age);
            poller.schedule(PollJob::resumed(trade.id, age)).await?;
        }

        if !active.is_empty() {
            tracing::info!("Resumed polling for {} trades", active.len());
        }
        Ok(active.len())
    }

    /// Build an unsigned transaction for `request`
    pub async fn prepare(&self, request: &SwapRequest) -> Result<PreparedSwap, SwapError> {
        self.preparer.prepare(request).await.inspect_err(|e| {
            tracing::warn!("Prepare failed: {}", e);
            self.metrics.error_recorded(e.kind());
        })
    }

    /// Broadcast a signed swap and start tracking it
    pub async fn submit(&self, swap: SignedSwap) -> Result<Trade, SwapError> {
        self.submitter.submit(swap).await
    }

    pub async fn get(&self, id: TradeId) -> Result<Trade, SwapError> {
        self.store.get(id).await.ok_or(SwapError::NotFound(id))
    }

    pub async fn get_by_signature(&self, signature: &str) -> Option<Trade> {
        self.store.get_by_signature(signature).await
    }

    /// Stop tracking a trade. The transaction itself may still land.
    pub async fn cancel(&self, id: TradeId) -> Result<Trade, SwapError> {
        match self
            .store
            .update(id, |t| t.transition(TradeStatus::Cancelled))
            .await
        {
            Ok(trade) => {
                tracing::info!("Trade {} cancelled", id);
                let latency = trade
                    .latency()
                    .and_then(|l| l.to_std().ok())
                    .unwrap_or_default();
                self.metrics.trade_completed(&trade, latency);
                Ok(trade)
            }
            Err(StoreError::Immutable { status, .. }) => Err(TransitionError {
                from: status,
                to: TradeStatus::Cancelled,
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Wait until the trade reaches a terminal status, checking every
    /// `check_every`
    pub async fn wait_for_terminal(
        &self,
        id: TradeId,
        check_every: Duration,
    ) -> Result<Trade, SwapError> {
        loop {
            let trade = self.get(id).await?;
            if trade.is_terminal() {
                return Ok(trade);
            }
            tokio::time::sleep(check_every).await;
        }
    }

    /// Like `wait_for_terminal`, but give up after `limit` with
    /// `SwapError::Timeout`. The trade itself keeps being tracked.
    pub async fn await_outcome(
        &self,
        id: TradeId,
        check_every: Duration,
        limit: Duration,
    ) -> Result<Trade, SwapError> {
        match tokio::time::timeout(limit, self.wait_for_terminal(id, check_every)).await {
            Ok(result) => result,
            Err(_) => {
                self.metrics.error_recorded("timeout");
                Err(SwapError::Timeout(format!(
                    "Trade {} not terminal after {}ms",
                    id,
                    limit.as_millis()
                )))
            }
        }
    }

    pub fn store(&self) -> &Arc<TradeStateStore> {
        &self.store
    }

    /// Stop the poller workers; unfinished trades resume on next start
    pub fn shutdown(&self) {
        match self.pool.lock() {
            Ok(mut pool) => pool.shutdown(),
            Err(poisoned) => poisoned.into_inner().shutdown(),
        }
        tracing::info!("Swap service stopped");
    }
}
