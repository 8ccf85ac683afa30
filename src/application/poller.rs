//! Confirmation Poller
//!
//! Drives a broadcast trade to a terminal status by polling the ledger for
//! its signature. The state machine step is the pure `advance` function; the
//! poller supplies observations and time, and the store applies the step
//! under the trade's lock.
//!
//! Jobs run on a fixed-size `PollerPool` fed through a bounded queue, so a
//! burst of submissions queues instead of spawning unbounded tasks.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::signature::Signature;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::error::SwapError;
use super::store::{StoreError, TradeStateStore};
use crate::domain::{Trade, TradeFailure, TradeId, TradeStatus, TransitionError};
use crate::ports::{LedgerPort, MetricsSink, SignatureStatus};

/// Polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    /// Confirmations at which a trade counts as final
    pub finality_threshold: u64,
    /// Time since submission after which an unfinished trade fails
    pub max_timeout: Duration,
    pub max_concurrent: usize,
    pub queue_capacity: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            finality_threshold: 32,
            max_timeout: Duration::from_secs(60),
            max_concurrent: 8,
            queue_capacity: 256,
        }
    }
}

/// Apply one ledger observation to `trade`.
///
/// `observed` is the latest signature status (`None` when the ledger has not
/// seen the signature) and `elapsed` the time since submission. Stale reads
/// that report fewer confirmations than already recorded are ignored.
pub fn advance(
    trade: &mut Trade,
    observed: Option<&SignatureStatus>,
    elapsed: Duration,
    config: &PollerConfig,
) -> Result<(), TransitionError> {
    if trade.is_terminal() {
        return Ok(());
    }

    if let Some(status) = observed {
        if let Some(err) = &status.err {
            return trade.fail(TradeFailure::rejected(err.clone()));
        }

        let landed = status.confirmations > 0 || status.finalized;
        if trade.status == TradeStatus::Submitted && landed {
            trade.transition(TradeStatus::Confirming)?;
        }

        if trade.status == TradeStatus::Confirming {
            trade.record_confirmations(status.confirmations);
            if status.finalized || trade.confirmations >= config.finality_threshold {
                return trade.transition(TradeStatus::Finalized);
            }
        }
    }

    if elapsed >= config.max_timeout {
        return trade.fail(TradeFailure::timeout(format!(
            "No finality after {}ms ({} of {} confirmations)",
            elapsed.as_millis(),
            trade.confirmations,
            config.finality_threshold
        )));
    }

    Ok(())
}

/// A trade to poll.
///
/// `prior_elapsed` is the tracking time already spent before `started_at`,
/// non-zero only for trades recovered after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollJob {
    pub trade_id: TradeId,
    pub started_at: Instant,
    pub prior_elapsed: Duration,
}

impl PollJob {
    pub fn new(trade_id: TradeId) -> Self {
        Self {
            trade_id,
            started_at: Instant::now(),
            prior_elapsed: Duration::ZERO,
        }
    }

    pub fn resumed(trade_id: TradeId, prior_elapsed: Duration) -> Self {
        Self {
            prior_elapsed,
            ..Self::new(trade_id)
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.prior_elapsed + self.started_at.elapsed()
    }

    fn deadline(&self, max_timeout: Duration) -> Instant {
        self.started_at + max_timeout.saturating_sub(self.prior_elapsed)
    }
}

pub struct ConfirmationPoller {
    ledger: Arc<dyn LedgerPort>,
    store: Arc<TradeStateStore>,
    metrics: Arc<dyn MetricsSink>,
    config: PollerConfig,
}

impl ConfirmationPoller {
    pub fn new(
        ledger: Arc<dyn LedgerPort>,
        store: Arc<TradeStateStore>,
        metrics: Arc<dyn MetricsSink>,
        config: PollerConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Poll until the trade is terminal. Returns the last known trade.
    pub async fn run(&self, job: PollJob) -> Option<Trade> {
        let deadline = job.deadline(self.config.max_timeout);

        loop {
            let trade = match self.store.get(job.trade_id).await {
                Some(trade) => trade,
                None => {
                    tracing::warn!("Trade {} vanished from the store, stop polling", job.trade_id);
                    return None;
                }
            };
            if trade.is_terminal() {
                tracing::debug!("Trade {} already {}, stop polling", trade.id, trade.status);
                return Some(trade);
            }

            let observed = match self.observe(&trade).await {
                Ok(observed) => observed,
                Err(failure) => {
                    return self.finish(job, |t| t.fail(failure)).await;
                }
            };

            let elapsed = job.elapsed();
            let previous = (trade.status, trade.confirmations);
            match self
                .store
                .update(job.trade_id, |t| advance(t, observed.as_ref(), elapsed, &self.config))
                .await
            {
                Ok(updated) => {
                    if let Some(status) = &observed {
                        if status.confirmations < previous.1 && !status.finalized {
                            tracing::warn!(
                                "Trade {}: stale read of {} confirmations ignored (have {})",
                                updated.id, status.confirmations, previous.1
                            );
                        }
                    }
                    if updated.status != previous.0 {
                        tracing::info!(
                            "Trade {}: {} -> {} ({} confirmations)",
                            updated.id, previous.0, updated.status, updated.confirmations
                        );
                    }
                    if updated.is_terminal() {
                        self.completed(&updated, elapsed);
                        return Some(updated);
                    }
                }
                Err(StoreError::Immutable { id, status }) => {
                    tracing::info!("Trade {} became {} elsewhere, stop polling", id, status);
                    return self.store.get(id).await;
                }
                Err(e) => {
                    tracing::error!("Trade {}: failed to record poll result: {}", job.trade_id, e);
                    self.metrics.error_recorded(SwapError::from(e).kind());
                    if Instant::now() >= deadline {
                        let elapsed = job.elapsed();
                        return self
                            .finish(job, |t| advance(t, observed.as_ref(), elapsed, &self.config))
                            .await;
                    }
                }
            }

            let wake = (Instant::now() + self.config.poll_interval).min(deadline);
            tokio::time::sleep_until(wake).await;
        }
    }

    /// Query the ledger. Transport errors count as "not seen yet"; only an
    /// unusable signature ends the trade here.
    async fn observe(&self, trade: &Trade) -> Result<Option<SignatureStatus>, TradeFailure> {
        let raw = trade.tx_signature.as_deref().unwrap_or_default();
        let signature = Signature::from_str(raw)
            .map_err(|e| TradeFailure::validation(format!("Invalid signature {:?}: {}", raw, e)))?;

        match self.ledger.get_signature_status(&signature).await {
            Ok(status) => {
                tracing::debug!("Trade {}: status {:?}", trade.id, status);
                Ok(status)
            }
            Err(e) => {
                tracing::warn!("Trade {}: status query failed, retrying next tick: {}", trade.id, e);
                self.metrics.error_recorded("unavailable");
                Ok(None)
            }
        }
    }

    /// Commit a terminal outcome, in memory at least if the journal is down
    async fn finish<F>(&self, job: PollJob, mutation: F) -> Option<Trade>
    where
        F: FnOnce(&mut Trade) -> Result<(), TransitionError>,
    {
        match self.store.close_out(job.trade_id, mutation).await {
            Ok(trade) => {
                self.completed(&trade, job.elapsed());
                Some(trade)
            }
            Err(StoreError::Immutable { id, status }) => {
                tracing::info!("Trade {} became {} elsewhere, stop polling", id, status);
                self.store.get(id).await
            }
            Err(e) => {
                tracing::error!("Trade {}: failed to close out: {}", job.trade_id, e);
                self.store.get(job.trade_id).await
            }
        }
    }

    fn completed(&self, trade: &Trade, elapsed: Duration) {
        match &trade.error {
            Some(failure) => tracing::error!("Trade {} failed: {}", trade.id, failure),
            None => tracing::info!("Trade {} {} after {:?}", trade.id, trade.status, elapsed),
        }
        self.metrics.trade_completed(trade, elapsed);
    }
}

/// Cloneable entry point for enqueueing poll jobs
#[derive(Debug, Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollJob>,
}

impl PollerHandle {
    /// Enqueue `job`, waiting for queue space if the pool is saturated
    pub async fn schedule(&self, job: PollJob) -> Result<(), SwapError> {
        self.sender
            .send(job)
            .await
            .map_err(|e| SwapError::Unavailable(format!("Poller pool stopped, dropped {}", e.0.trade_id)))
    }

    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Handle backed by a plain channel, for observing scheduled jobs
    #[cfg(test)]
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<PollJob>) {
        let (sender, receiver) = mpsc::channel::<PollJob>(capacity);
        (Self { sender }, receiver)
    }
}

/// Fixed set of workers draining the poll queue
pub struct PollerPool {
    workers: Vec<JoinHandle<()>>,
}

impl PollerPool {
    pub fn spawn(poller: Arc<ConfirmationPoller>) -> (Self, PollerHandle) {
        let config = *poller.config();
        let (sender, receiver) = mpsc::channel::<PollJob>(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..config.max_concurrent.max(1))
            .map(|worker| {
                let poller = Arc::clone(&poller);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else {
                            break;
                        };
                        tracing::debug!("Poller worker {} picked up trade {}", worker, job.trade_id);
                        poller.run(job).await;
                    }
                    tracing::debug!("Poller worker {} exiting", worker);
                })
            })
            .collect();

        tracing::info!(
            "Started {} confirmation pollers (queue {})",
            config.max_concurrent.max(1),
            config.queue_capacity.max(1)
        );

        (Self { workers }, PollerHandle { sender })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop all workers. In-flight trades stay non-terminal in the store and
    /// are picked up again by restart recovery.
    pub fn shutdown(&mut self) {
        for worker in self.workers.drain(..) {
            worker.abort();
        }
    }
}

impl Drop for PollerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryJournal;
    use crate::domain::{FailureKind, TradeDraft};
    use crate::ports::NoopMetrics;
    use crate::ports::mocks::MockLedger;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rust_decimal_macros::dec;

    fn submitted(signature: &str) -> Trade {
        TradeDraft {
            owner: "wallet".to_string(),
            from_mint: "So11111111111111111111111111111111111111112".to_string(),
            to_mint: "MemeMint".to_string(),
            amount: 100_000_000,
            expected_out_amount: 5_000_000,
            min_out_amount: 4_975_000,
            price: dec!(0.05),
            fee: 0,
            slippage_bps: 50,
            status: TradeStatus::Pending,
            created_at: Utc::now(),
        }
        .into_submitted(signature.to_string())
        .unwrap()
    }

    fn rank(status: TradeStatus) -> u8 {
        match status {
            TradeStatus::Pending => 0,
            TradeStatus::Submitted => 1,
            TradeStatus::Confirming => 2,
            _ => 3,
        }
    }

    #[test]
    fn test_first_confirmation_moves_to_confirming() {
        let config = PollerConfig::default();
        let mut trade = submitted("sig");

        advance(&mut trade, None, Duration::from_secs(2), &config).unwrap();
        assert_eq!(trade.status, TradeStatus::Submitted);

        advance(&mut trade, Some(&SignatureStatus::confirmed(0)), Duration::from_secs(4), &config)
            .unwrap();
        assert_eq!(trade.status, TradeStatus::Submitted);

        advance(&mut trade, Some(&SignatureStatus::confirmed(1)), Duration::from_secs(6), &config)
            .unwrap();
        assert_eq!(trade.status, TradeStatus::Confirming);
        assert_eq!(trade.confirmations, 1);
    }

    #[test]
    fn test_threshold_finalizes() {
        let config = PollerConfig::default();
        let mut trade = submitted("sig");

        advance(&mut trade, Some(&SignatureStatus::confirmed(31)), Duration::ZERO, &config).unwrap();
        assert_eq!(trade.status, TradeStatus::Confirming);

        advance(&mut trade, Some(&SignatureStatus::confirmed(32)), Duration::ZERO, &config).unwrap();
        assert_eq!(trade.status, TradeStatus::Finalized);
        assert_eq!(trade.confirmations, 32);
        assert!(trade.completed_at.is_some());
    }

    #[test]
    fn test_rooted_report_finalizes_from_submitted() {
        let config = PollerConfig::default();
        let mut trade = submitted("sig");

        advance(&mut trade, Some(&SignatureStatus::finalized()), Duration::ZERO, &config).unwrap();
        assert_eq!(trade.status, TradeStatus::Finalized);
    }

    #[test]
    fn test_execution_error_fails_as_rejected() {
        let config = PollerConfig::default();
        let mut trade = submitted("sig");
        advance(&mut trade, Some(&SignatureStatus::confirmed(3)), Duration::ZERO, &config).unwrap();

        advance(
            &mut trade,
            Some(&SignatureStatus::failed("InstructionError(1, Custom(6001))")),
            Duration::ZERO,
            &config,
        )
        .unwrap();

        assert_eq!(trade.status, TradeStatus::Failed);
        let failure = trade.error.unwrap();
        assert_eq!(failure.kind, FailureKind::Rejected);
        assert!(failure.message.contains("6001"));
    }

    #[test]
    fn test_timeout_boundary() {
        let config = PollerConfig::default();

        let mut before = submitted("sig");
        advance(&mut before, None, Duration::from_millis(59_999), &config).unwrap();
        assert_eq!(before.status, TradeStatus::Submitted);

        let mut at = submitted("sig");
        advance(&mut at, None, Duration::from_secs(60), &config).unwrap();
        assert_eq!(at.status, TradeStatus::Failed);
        assert_eq!(at.error.unwrap().kind, FailureKind::Timeout);
    }

    #[test]
    fn test_finality_wins_over_timeout_on_same_tick() {
        let config = PollerConfig::default();
        let mut trade = submitted("sig");

        advance(&mut trade, Some(&SignatureStatus::confirmed(32)), Duration::from_secs(60), &config)
            .unwrap();
        assert_eq!(trade.status, TradeStatus::Finalized);
    }

    #[test]
    fn test_terminal_trade_is_left_alone() {
        let config = PollerConfig::default();
        let mut trade = submitted("sig");
        trade.transition(TradeStatus::Cancelled).unwrap();
        let snapshot = trade.clone();

        advance(&mut trade, Some(&SignatureStatus::confirmed(40)), Duration::from_secs(90), &config)
            .unwrap();
        assert_eq!(trade, snapshot);
    }

    #[test]
    fn test_random_sequences_never_move_backward() {
        let config = PollerConfig {
            finality_threshold: 1_000,
            ..PollerConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..200 {
            let mut trade = submitted("sig");
            let mut last_confirmations = 0;
            let mut last_rank = rank(trade.status);
            let mut truth = 0u64;

            for tick in 0..40u64 {
                // Ledger truth rises; reads may lag behind it or go missing
                truth += rng.gen_range(0..4);
                let observed = match rng.gen_range(0..10) {
                    0 => None,
                    1 | 2 => Some(SignatureStatus::confirmed(rng.gen_range(0..=truth))),
                    _ => Some(SignatureStatus::confirmed(truth)),
                };

                advance(&mut trade, observed.as_ref(), Duration::from_secs(tick), &config).unwrap();

                assert!(trade.confirmations >= last_confirmations);
                assert!(rank(trade.status) >= last_rank);
                last_confirmations = trade.confirmations;
                last_rank = rank(trade.status);
            }
        }
    }

    async fn setup(
        config: PollerConfig,
    ) -> (ConfirmationPoller, Arc<TradeStateStore>, Arc<MockLedger>, Trade, Signature) {
        let ledger = Arc::new(MockLedger::new());
        let store = Arc::new(
            TradeStateStore::open(Arc::new(MemoryJournal::new()))
                .await
                .unwrap(),
        );
        let signature = Signature::new_unique();
        let trade = store.create(submitted(&signature.to_string())).await.unwrap();
        let poller = ConfirmationPoller::new(
            ledger.clone(),
            store.clone(),
            Arc::new(NoopMetrics),
            config,
        );
        (poller, store, ledger, trade, signature)
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_finalizes() {
        let (poller, store, ledger, trade, signature) = setup(PollerConfig::default()).await;
        let script = [0, 1, 4, 12, 20, 31, 32]
            .into_iter()
            .map(|n| (n > 0).then(|| SignatureStatus::confirmed(n)))
            .collect();
        ledger.script_statuses(signature, script);

        let done = poller.run(PollJob::new(trade.id)).await.unwrap();

        assert_eq!(done.status, TradeStatus::Finalized);
        assert_eq!(done.confirmations, 32);
        assert_eq!(store.get(trade.id).await.unwrap(), done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out_exactly_at_limit() {
        let (poller, _store, ledger, trade, signature) = setup(PollerConfig::default()).await;
        ledger.script_statuses(signature, vec![None]);

        let started = Instant::now();
        let done = poller.run(PollJob::new(trade.id)).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(60));
        assert_eq!(done.status, TradeStatus::Failed);
        assert_eq!(done.error.unwrap().kind, FailureKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_not_aligned_to_interval() {
        let config = PollerConfig {
            poll_interval: Duration::from_secs(7),
            max_timeout: Duration::from_secs(10),
            ..PollerConfig::default()
        };
        let (poller, _store, ledger, trade, signature) = setup(config).await;
        ledger.script_statuses(signature, vec![Some(SignatureStatus::confirmed(4))]);

        let started = Instant::now();
        let done = poller.run(PollJob::new(trade.id)).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(done.status, TradeStatus::Failed);
        assert_eq!(done.confirmations, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumed_job_keeps_original_deadline() {
        let (poller, _store, ledger, trade, signature) = setup(PollerConfig::default()).await;
        ledger.script_statuses(signature, vec![None]);

        let started = Instant::now();
        let done = poller
            .run(PollJob::resumed(trade.id, Duration::from_secs(50)))
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(done.status, TradeStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let (poller, store, ledger, trade, signature) = setup(PollerConfig::default()).await;
        ledger.script_statuses(signature, vec![None]);

        let store_clone = store.clone();
        let id = trade.id;
        let cancel = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            store_clone
                .update(id, |t| t.transition(TradeStatus::Cancelled))
                .await
                .unwrap();
        });

        let done = poller.run(PollJob::new(trade.id)).await.unwrap();
        cancel.await.unwrap();

        assert_eq!(done.status, TradeStatus::Cancelled);
        let queries = ledger.status_queries();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ledger.status_queries(), queries);
    }

    #[tokio::test(start_paused = true)]
    async fn test_journal_outage_still_times_out_at_deadline() {
        let ledger = Arc::new(MockLedger::new());
        let journal = Arc::new(MemoryJournal::new());
        let store = Arc::new(TradeStateStore::open(journal.clone()).await.unwrap());
        let signature = Signature::new_unique();
        let trade = store.create(submitted(&signature.to_string())).await.unwrap();
        ledger.script_statuses(signature, vec![Some(SignatureStatus::confirmed(3))]);
        journal.fail_writes(true);
        let poller = ConfirmationPoller::new(
            ledger.clone(),
            store.clone(),
            Arc::new(NoopMetrics),
            PollerConfig::default(),
        );

        let started = Instant::now();
        let done = poller.run(PollJob::new(trade.id)).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(60));
        assert_eq!(done.status, TradeStatus::Failed);
        assert_eq!(done.error.unwrap().kind, FailureKind::Timeout);
        assert_eq!(done.confirmations, 3);
        assert!(store.list_active().await.is_empty());

        // Nothing keeps polling once the trade is closed out
        let queries = ledger.status_queries();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ledger.status_queries(), queries);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_signature_fails_trade() {
        let ledger = Arc::new(MockLedger::new());
        let store = Arc::new(TradeStateStore::open(Arc::new(MemoryJournal::new())).await.unwrap());
        let trade = store.create(submitted("not-a-signature")).await.unwrap();
        let poller = ConfirmationPoller::new(ledger, store, Arc::new(NoopMetrics), PollerConfig::default());

        let done = poller.run(PollJob::new(trade.id)).await.unwrap();
        assert_eq!(done.status, TradeStatus::Failed);
        assert_eq!(done.error.unwrap().kind, FailureKind::Validation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_bounds_concurrency() {
        let config = PollerConfig {
            max_concurrent: 2,
            queue_capacity: 8,
            ..PollerConfig::default()
        };
        let ledger = Arc::new(MockLedger::new());
        let store = Arc::new(TradeStateStore::open(Arc::new(MemoryJournal::new())).await.unwrap());
        let poller = Arc::new(ConfirmationPoller::new(
            ledger.clone(),
            store.clone(),
            Arc::new(NoopMetrics),
            config,
        ));
        let (mut pool, handle) = PollerPool::spawn(poller);
        assert_eq!(pool.worker_count(), 2);

        let mut ids = Vec::new();
        for _ in 0..4 {
            let signature = Signature::new_unique();
            ledger.script_statuses(signature, vec![None, Some(SignatureStatus::finalized())]);
            let trade = store.create(submitted(&signature.to_string())).await.unwrap();
            handle.schedule(PollJob::new(trade.id)).await.unwrap();
            ids.push(trade.id);
        }

        tokio::time::sleep(Duration::from_secs(10)).await;
        for id in ids {
            assert_eq!(store.get(id).await.unwrap().status, TradeStatus::Finalized);
        }
        pool.shutdown();
    }
}
