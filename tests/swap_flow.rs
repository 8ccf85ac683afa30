//! Swap Flow Integration Tests
//!
//! Drive the whole swap path through `SwapService`:
//! 1. prepare -> sign -> submit -> poll until terminal
//! 2. broadcast retry, rejection and idempotent resubmission
//! 3. cancellation and restart recovery
//!
//! All tests are deterministic (no real network calls). Time is paused, so
//! polling intervals and timeouts elapse instantly and exactly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use tokio::time::Instant;

use swap_tracker::adapters::solana::LocalSigner;
use swap_tracker::adapters::storage::MemoryJournal;
use swap_tracker::application::{
    PollerConfig, ServiceConfig, SignedSwap, SwapError, SwapRequest, SwapService,
};
use swap_tracker::domain::known_programs::{ASSOCIATED_TOKEN_PROGRAM_ID, JUPITER_V6_PROGRAM_ID};
use swap_tracker::domain::{FailureKind, Trade, TradeStatus, native_mint};
use swap_tracker::ports::mocks::{MockLedger, MockQuotes, RecordingMetrics};
use swap_tracker::ports::{LedgerError, MetricsSink, NoopMetrics, SignatureStatus};

// ============================================================================
// Test Fixtures
// ============================================================================

const ONE_TENTH_SOL: u64 = 100_000_000;
const CHECK_EVERY: Duration = Duration::from_millis(100);

struct Harness {
    service: SwapService,
    ledger: Arc<MockLedger>,
    journal: Arc<MemoryJournal>,
    signer: LocalSigner,
}

fn fast_polling() -> ServiceConfig {
    ServiceConfig {
        poller: PollerConfig {
            poll_interval: Duration::from_millis(500),
            ..PollerConfig::default()
        },
        ..ServiceConfig::default()
    }
}

async fn start(
    ledger: Arc<MockLedger>,
    journal: Arc<MemoryJournal>,
    metrics: Arc<dyn MetricsSink>,
    config: ServiceConfig,
) -> SwapService {
    SwapService::start(ledger, Arc::new(MockQuotes::new()), journal, metrics, config)
        .await
        .unwrap()
}

async fn harness_with(ledger: MockLedger, config: ServiceConfig) -> Harness {
    let ledger = Arc::new(ledger);
    let journal = Arc::new(MemoryJournal::new());
    let service = start(ledger.clone(), journal.clone(), Arc::new(NoopMetrics), config).await;
    Harness {
        service,
        ledger,
        journal,
        signer: LocalSigner::new_random(),
    }
}

async fn harness() -> Harness {
    harness_with(MockLedger::new(), ServiceConfig::default()).await
}

fn buy(owner: Pubkey, mint: Pubkey) -> SwapRequest {
    SwapRequest {
        owner,
        from_mint: native_mint(),
        to_mint: mint,
        amount: ONE_TENTH_SOL,
        slippage_bps: 50,
    }
}

async fn signed(h: &Harness, request: &SwapRequest) -> SignedSwap {
    let prepared = h.service.prepare(request).await.unwrap();
    h.signer.sign(prepared).unwrap()
}

fn script(h: &Harness, swap: &SignedSwap, statuses: Vec<Option<SignatureStatus>>) {
    h.ledger
        .script_statuses(swap.canonical_signature().unwrap(), statuses);
}

fn collapse(statuses: Vec<TradeStatus>) -> Vec<TradeStatus> {
    let mut out: Vec<TradeStatus> = Vec::new();
    for status in statuses {
        if out.last() != Some(&status) {
            out.push(status);
        }
    }
    out
}

// ============================================================================
// End-to-end
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_buy_creates_destination_account_and_finalizes() {
    let h = harness_with(MockLedger::new(), fast_polling()).await;
    let mint = Pubkey::new_unique();
    let request = buy(h.signer.pubkey(), mint);

    let prepared = h.service.prepare(&request).await.unwrap();
    assert_eq!(prepared.account_creation_count(), 1);
    assert_eq!(prepared.requirements[0].mint, mint);
    assert_eq!(prepared.draft.status, TradeStatus::Pending);
    assert_eq!(prepared.draft.expected_out_amount, 5_000_000);

    let message = &prepared.transaction.message;
    let programs: Vec<Pubkey> = message
        .instructions
        .iter()
        .map(|ix| *ix.program_id(&message.account_keys))
        .collect();
    assert_eq!(programs, vec![ASSOCIATED_TOKEN_PROGRAM_ID, JUPITER_V6_PROGRAM_ID]);

    let swap = h.signer.sign(prepared).unwrap();
    script(&h, &swap, (1..=32).map(|n| Some(SignatureStatus::confirmed(n))).collect());

    let trade = h.service.submit(swap).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Submitted);

    let done = h.service.wait_for_terminal(trade.id, CHECK_EVERY).await.unwrap();
    assert_eq!(done.status, TradeStatus::Finalized);
    assert_eq!(done.confirmations, 32);
    assert!(done.completed_at.is_some());
    assert!(done.error.is_none());

    assert_eq!(
        collapse(h.journal.status_history(trade.id)),
        vec![TradeStatus::Submitted, TradeStatus::Confirming, TradeStatus::Finalized]
    );
    let counts: Vec<u64> = h.journal.writes_for(trade.id).iter().map(|t| t.confirmations).collect();
    assert!(counts.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_sell_with_existing_account_needs_no_creation() {
    let owner = LocalSigner::new_random();
    let mint = Pubkey::new_unique();
    let ledger = MockLedger::new().with_token_account(&owner.pubkey(), &mint);
    let h = Harness {
        signer: owner,
        ..harness_with(ledger, ServiceConfig::default()).await
    };

    let request = SwapRequest {
        owner: h.signer.pubkey(),
        from_mint: mint,
        to_mint: native_mint(),
        amount: 5_000_000,
        slippage_bps: 100,
    };
    let prepared = h.service.prepare(&request).await.unwrap();

    assert_eq!(prepared.account_creation_count(), 0);
    assert_eq!(prepared.transaction.message.instructions.len(), 1);
    assert!(prepared.requirements.iter().all(|r| r.exists));
}

#[tokio::test(start_paused = true)]
async fn test_native_mint_never_required() {
    let h = harness().await;
    let mint = Pubkey::new_unique();

    for (from, to) in [(native_mint(), mint), (mint, native_mint())] {
        let request = SwapRequest {
            owner: h.signer.pubkey(),
            from_mint: from,
            to_mint: to,
            amount: 1_000,
            slippage_bps: 50,
        };
        let prepared = h.service.prepare(&request).await.unwrap();
        assert!(prepared.requirements.iter().all(|r| r.mint != native_mint()));
        assert_eq!(prepared.requirements.len(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_rooted_report_finalizes_early() {
    let h = harness().await;
    let swap = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;
    script(
        &h,
        &swap,
        vec![None, Some(SignatureStatus::confirmed(3)), Some(SignatureStatus::finalized())],
    );

    let trade = h.service.submit(swap).await.unwrap();
    let done = h.service.wait_for_terminal(trade.id, CHECK_EVERY).await.unwrap();

    assert_eq!(done.status, TradeStatus::Finalized);
    assert_eq!(done.confirmations, 3);
}

#[tokio::test(start_paused = true)]
async fn test_execution_failure_marks_trade_rejected() {
    let h = harness().await;
    let swap = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;
    script(
        &h,
        &swap,
        vec![None, Some(SignatureStatus::failed("custom program error: 0x1771"))],
    );

    let trade = h.service.submit(swap).await.unwrap();
    let done = h.service.wait_for_terminal(trade.id, CHECK_EVERY).await.unwrap();

    assert_eq!(done.status, TradeStatus::Failed);
    let error = done.error.unwrap();
    assert_eq!(error.kind, FailureKind::Rejected);
    assert!(error.message.contains("0x1771"));
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_resubmitting_same_payload_is_idempotent() {
    let h = harness().await;
    let swap = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;

    let first = h.service.submit(swap.clone()).await.unwrap();
    let second = h.service.submit(swap).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(h.service.store().len().await, 1);
    assert_eq!(h.ledger.send_attempts(), 1);
    assert_eq!(
        h.service.get_by_signature(first.tx_signature.as_deref().unwrap()).await.map(|t| t.id),
        Some(first.id)
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_resubmits_broadcast_once() {
    let h = harness_with(
        MockLedger::new().with_send_delay(Duration::from_millis(250)),
        ServiceConfig::default(),
    )
    .await;
    let swap = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;

    let (a, b) = tokio::join!(h.service.submit(swap.clone()), h.service.submit(swap));

    assert_eq!(a.unwrap().id, b.unwrap().id);
    assert_eq!(h.ledger.send_attempts(), 1);
    assert_eq!(h.service.store().len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_broadcast_errors_back_off() {
    let h = harness().await;
    let swap = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;
    h.ledger.push_send_result(Err(LedgerError::Timeout));
    h.ledger.push_send_result(Err(LedgerError::Connection("reset by peer".into())));

    let started = Instant::now();
    let trade = h.service.submit(swap).await.unwrap();

    // 500ms + 1000ms of backoff before the third attempt
    assert!(started.elapsed() >= Duration::from_millis(1500));
    assert!(started.elapsed() < Duration::from_millis(1600));
    assert_eq!(h.ledger.send_attempts(), 3);
    assert_eq!(trade.status, TradeStatus::Submitted);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_ledger_surfaces_unavailable() {
    let h = harness().await;
    let swap = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;
    for _ in 0..3 {
        h.ledger.push_send_result(Err(LedgerError::RateLimited));
    }

    let err = h.service.submit(swap).await.unwrap_err();

    assert!(matches!(err, SwapError::Unavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(h.ledger.send_attempts(), 3);
    assert!(h.service.store().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_broadcast_is_not_retried() {
    let h = harness().await;
    let swap = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;
    h.ledger
        .push_send_result(Err(LedgerError::Rejected("insufficient funds for fee".into())));

    let err = h.service.submit(swap).await.unwrap_err();

    assert!(matches!(err, SwapError::Transaction(_)));
    assert_eq!(h.ledger.send_attempts(), 1);
    assert!(h.service.store().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_unsigned_payload_never_broadcast() {
    let h = harness().await;
    let prepared = h
        .service
        .prepare(&buy(h.signer.pubkey(), Pubkey::new_unique()))
        .await
        .unwrap();
    let unsigned = SignedSwap {
        transaction: prepared.transaction,
        draft: prepared.draft,
    };

    let err = h.service.submit(unsigned).await.unwrap_err();

    assert!(matches!(err, SwapError::Validation(_)));
    assert_eq!(h.ledger.send_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_quote_rejected() {
    let ledger = Arc::new(MockLedger::new());
    let service = SwapService::start(
        ledger.clone(),
        Arc::new(MockQuotes::new().with_age(chrono::Duration::seconds(30))),
        Arc::new(MemoryJournal::new()),
        Arc::new(NoopMetrics),
        ServiceConfig::default(),
    )
    .await
    .unwrap();

    let err = service
        .prepare(&buy(Pubkey::new_unique(), Pubkey::new_unique()))
        .await
        .unwrap_err();
    assert!(matches!(err, SwapError::Validation(_)));
}

// ============================================================================
// Confirmation window
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_trade_times_out_at_boundary() {
    let h = harness().await;
    let swap = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;
    let trade = h.service.submit(swap).await.unwrap();

    tokio::time::sleep(Duration::from_millis(59_900)).await;
    let before = h.service.get(trade.id).await.unwrap();
    assert_eq!(before.status, TradeStatus::Submitted);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let after = h.service.get(trade.id).await.unwrap();
    assert_eq!(after.status, TradeStatus::Failed);
    assert_eq!(after.error.unwrap().kind, FailureKind::Timeout);
}

#[tokio::test(start_paused = true)]
async fn test_confirming_trade_that_stalls_times_out() {
    let h = harness().await;
    let swap = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;
    script(
        &h,
        &swap,
        vec![Some(SignatureStatus::confirmed(5)), Some(SignatureStatus::confirmed(2))],
    );

    let started = Instant::now();
    let trade = h.service.submit(swap).await.unwrap();
    let done = h.service.wait_for_terminal(trade.id, CHECK_EVERY).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(60));
    assert!(started.elapsed() <= Duration::from_secs(60) + CHECK_EVERY);
    assert_eq!(done.status, TradeStatus::Failed);
    assert_eq!(done.confirmations, 5);
    assert_eq!(done.error.unwrap().kind, FailureKind::Timeout);
}

#[tokio::test(start_paused = true)]
async fn test_journal_outage_still_ends_trade_at_deadline() {
    let h = harness_with(MockLedger::new(), fast_polling()).await;
    let swap = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;
    script(&h, &swap, vec![Some(SignatureStatus::confirmed(3))]);

    let trade = h.service.submit(swap).await.unwrap();
    h.journal.fail_writes(true);

    tokio::time::sleep(Duration::from_millis(60_100)).await;
    let done = h.service.get(trade.id).await.unwrap();
    assert_eq!(done.status, TradeStatus::Failed);
    assert_eq!(done.error.unwrap().kind, FailureKind::Timeout);
    assert!(h.service.store().list_active().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_bounded_wait_reports_timeout() {
    let h = harness().await;
    let swap = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;
    let trade = h.service.submit(swap).await.unwrap();

    let err = h
        .service
        .await_outcome(trade.id, CHECK_EVERY, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, SwapError::Timeout(_)));
    assert_eq!(err.kind(), "timeout");
    assert_eq!(h.service.get(trade.id).await.unwrap().status, TradeStatus::Submitted);

    let done = h
        .service
        .await_outcome(trade.id, CHECK_EVERY, Duration::from_secs(120))
        .await
        .unwrap();
    assert_eq!(done.error.unwrap().kind, FailureKind::Timeout);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_tracking() {
    let h = harness().await;
    let swap = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;
    let trade = h.service.submit(swap).await.unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    let cancelled = h.service.cancel(trade.id).await.unwrap();
    assert_eq!(cancelled.status, TradeStatus::Cancelled);

    let queries = h.ledger.status_queries();
    tokio::time::sleep(Duration::from_secs(10)).await;
    // At most the poll already in flight when the cancel landed
    assert!(h.ledger.status_queries() <= queries + 1);
    assert_eq!(h.service.get(trade.id).await.unwrap().status, TradeStatus::Cancelled);

    let again = h.service.cancel(trade.id).await.unwrap_err();
    assert!(matches!(again, SwapError::InvalidTransition(_)));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_unknown_trade() {
    let h = harness().await;
    let err = h.service.cancel(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, SwapError::NotFound(_)));
}

// ============================================================================
// Restart recovery
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unfinished_trade_resumes_after_restart() {
    let h = harness().await;
    let swap = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;
    let trade = h.service.submit(swap.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    h.service.shutdown();
    assert_eq!(
        h.journal.saved(trade.id).map(|t| t.status),
        Some(TradeStatus::Submitted)
    );

    script(&h, &swap, vec![Some(SignatureStatus::finalized())]);
    let restarted = start(
        h.ledger.clone(),
        h.journal.clone(),
        Arc::new(NoopMetrics),
        ServiceConfig::default(),
    )
    .await;

    let done = restarted.wait_for_terminal(trade.id, CHECK_EVERY).await.unwrap();
    assert_eq!(done.status, TradeStatus::Finalized);
    assert_eq!(restarted.store().len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_trade_fails_on_restart() {
    let h = harness().await;
    let swap = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;
    let signature = swap.canonical_signature().unwrap().to_string();

    let mut stale: Trade = swap.draft.clone().into_submitted(signature).unwrap();
    stale.created_at = Utc::now() - chrono::Duration::minutes(2);
    let journal = Arc::new(MemoryJournal::with_trades([stale.clone()]));

    let started = Instant::now();
    let service = start(
        Arc::new(MockLedger::new()),
        journal,
        Arc::new(NoopMetrics),
        ServiceConfig::default(),
    )
    .await;
    let done = service.wait_for_terminal(stale.id, CHECK_EVERY).await.unwrap();

    assert!(started.elapsed() <= CHECK_EVERY);
    assert_eq!(done.status, TradeStatus::Failed);
    assert_eq!(done.error.unwrap().kind, FailureKind::Timeout);
}

// ============================================================================
// Metrics
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_metrics_follow_outcomes() {
    let metrics = Arc::new(RecordingMetrics::new());
    let ledger = Arc::new(MockLedger::new());
    let journal = Arc::new(MemoryJournal::new());
    let h = Harness {
        service: start(ledger.clone(), journal.clone(), metrics.clone(), ServiceConfig::default()).await,
        ledger,
        journal,
        signer: LocalSigner::new_random(),
    };

    let ok = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;
    script(&h, &ok, vec![Some(SignatureStatus::finalized())]);
    let ok = h.service.submit(ok).await.unwrap();

    let rejected = signed(&h, &buy(h.signer.pubkey(), Pubkey::new_unique())).await;
    h.ledger.push_send_result(Err(LedgerError::Rejected("blockhash not found".into())));
    assert!(h.service.submit(rejected).await.is_err());

    h.service.wait_for_terminal(ok.id, CHECK_EVERY).await.unwrap();

    assert_eq!(metrics.submitted(), 1);
    assert_eq!(metrics.completed_with(TradeStatus::Finalized), 1);
    assert_eq!(metrics.errors(), vec!["transaction"]);
}
