//! Deterministic port doubles
//!
//! Scriptable ledger, quote service and metrics sink used by unit and
//! integration tests. They record calls and replay configured responses
//! without touching the network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use solana_sdk::{
    account::Account,
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use spl_token::solana_program::{program_option::COption, program_pack::Pack};

use super::ledger::{LedgerError, LedgerPort, SignatureStatus};
use super::metrics::MetricsSink;
use super::quote::{QuoteError, QuotePort, Route, RouteRequest};
use crate::domain::accounts::derive_associated_token_address;
use crate::domain::known_programs::{JUPITER_V6_PROGRAM_ID, is_native_mint, token_program_id};
use crate::domain::{Trade, TradeStatus};

/// Ledger double with scripted broadcast results and status sequences
#[derive(Debug, Default)]
pub struct MockLedger {
    accounts: Arc<Mutex<HashMap<Pubkey, Account>>>,
    unreachable: Arc<Mutex<HashSet<Pubkey>>>,
    send_results: Arc<Mutex<VecDeque<Result<(), LedgerError>>>>,
    send_attempts: Arc<Mutex<u32>>,
    sent: Arc<Mutex<Vec<Signature>>>,
    statuses: Arc<Mutex<HashMap<Signature, VecDeque<Option<SignatureStatus>>>>>,
    status_queries: Arc<Mutex<u32>>,
    send_delay: Duration,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to make every broadcast take `delay`, like a real
    /// round trip
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Builder method to place an initialized token account at the
    /// associated address of `(owner, mint)`
    pub fn with_token_account(self, owner: &Pubkey, mint: &Pubkey) -> Self {
        let account = spl_token::state::Account {
            mint: *mint,
            owner: *owner,
            amount: 1_000_000,
            delegate: COption::None,
            state: spl_token::state::AccountState::Initialized,
            is_native: COption::None,
            delegated_amount: 0,
            close_authority: COption::None,
        };
        let mut data = vec![0u8; spl_token::state::Account::LEN];
        spl_token::state::Account::pack(account, &mut data).unwrap();

        let address = derive_associated_token_address(owner, mint);
        self.accounts.lock().unwrap().insert(
            address,
            Account {
                lamports: 2_039_280,
                data,
                owner: token_program_id(),
                executable: false,
                rent_epoch: 0,
            },
        );
        self
    }

    /// Builder method to make lookups of `address` fail with a timeout
    pub fn with_unreachable_account(self, address: Pubkey) -> Self {
        self.unreachable.lock().unwrap().insert(address);
        self
    }

    /// Queue the outcome of the next broadcast; once the queue is empty
    /// broadcasts succeed
    pub fn push_send_result(&self, result: Result<(), LedgerError>) {
        self.send_results.lock().unwrap().push_back(result);
    }

    /// Script the statuses returned for `signature`, one per query. The last
    /// entry repeats once the script runs out.
    pub fn script_statuses(&self, signature: Signature, script: Vec<Option<SignatureStatus>>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(signature, script.into_iter().collect());
    }

    /// Number of broadcast attempts, successful or not
    pub fn send_attempts(&self) -> u32 {
        *self.send_attempts.lock().unwrap()
    }

    /// Signatures that were broadcast successfully
    pub fn sent_signatures(&self) -> Vec<Signature> {
        self.sent.lock().unwrap().clone()
    }

    pub fn status_queries(&self) -> u32 {
        *self.status_queries.lock().unwrap()
    }
}

#[async_trait]
impl LedgerPort for MockLedger {
    async fn get_account_info(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        if self.unreachable.lock().unwrap().contains(address) {
            return Err(LedgerError::Timeout);
        }
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        *self.send_attempts.lock().unwrap() += 1;
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }

        if let Some(Err(e)) = self.send_results.lock().unwrap().pop_front() {
            return Err(e);
        }

        let signature = transaction.signatures.first().copied().unwrap_or_default();
        self.sent.lock().unwrap().push(signature);
        Ok(signature)
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, LedgerError> {
        *self.status_queries.lock().unwrap() += 1;

        let mut statuses = self.statuses.lock().unwrap();
        let Some(script) = statuses.get_mut(signature) else {
            return Ok(None);
        };
        let next = if script.len() > 1 {
            script.pop_front().flatten()
        } else {
            script.front().cloned().flatten()
        };
        Ok(next)
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, LedgerError> {
        Ok(Hash::new_unique())
    }
}

/// Quote double that prices every request at a fixed rate
#[derive(Debug)]
pub struct MockQuotes {
    /// Output base units per 1_000 input base units
    rate_per_mille: u64,
    age: chrono::Duration,
    empty_route: bool,
    native_wrapping: bool,
    error: Option<QuoteError>,
    calls: Arc<Mutex<Vec<RouteRequest>>>,
}

impl Default for MockQuotes {
    fn default() -> Self {
        Self {
            rate_per_mille: 50,
            age: chrono::Duration::zero(),
            empty_route: false,
            native_wrapping: false,
            error: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to backdate every quote by `age`
    pub fn with_age(mut self, age: chrono::Duration) -> Self {
        self.age = age;
        self
    }

    /// Builder method to return routes with no hops
    pub fn with_empty_route(mut self) -> Self {
        self.empty_route = true;
        self
    }

    /// Builder method to attach wrapped-SOL setup and cleanup instructions
    /// when either side of the swap is the native mint, the way the
    /// aggregator does. Setup also repeats the creation of the user's
    /// destination token account.
    pub fn with_native_wrapping(mut self) -> Self {
        self.native_wrapping = true;
        self
    }

    /// Builder method to fail every request with `error`
    pub fn with_error(mut self, error: QuoteError) -> Self {
        self.error = Some(error);
        self
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<RouteRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuotePort for MockQuotes {
    async fn get_quote(&self, request: &RouteRequest) -> Result<Route, QuoteError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(e) = &self.error {
            return Err(e.clone());
        }

        let out_amount = request.amount.saturating_mul(self.rate_per_mille) / 1_000;
        let min_out_amount =
            out_amount - out_amount * u64::from(request.slippage_bps) / 10_000;
        let swap_instruction = Instruction::new_with_bytes(
            JUPITER_V6_PROGRAM_ID,
            &[0xe5, 0x17, 0xcb, 0x97],
            vec![
                AccountMeta::new(request.user, true),
                AccountMeta::new(derive_associated_token_address(&request.user, &request.input_mint), false),
                AccountMeta::new(derive_associated_token_address(&request.user, &request.output_mint), false),
            ],
        );

        let (setup_instructions, cleanup_instruction) = if self.native_wrapping {
            native_wrapping(request)
        } else {
            (Vec::new(), None)
        };

        Ok(Route {
            input_mint: request.input_mint,
            output_mint: request.output_mint,
            in_amount: request.amount,
            out_amount,
            min_out_amount,
            price_impact_pct: 0.05,
            fee_amount: request.amount / 400,
            hops: if self.empty_route {
                Vec::new()
            } else {
                vec!["Raydium".to_string()]
            },
            setup_instructions,
            swap_instruction,
            cleanup_instruction,
            quoted_at: Utc::now() - self.age,
        })
    }
}

/// Setup and cleanup the aggregator returns around a swap touching SOL
fn native_wrapping(request: &RouteRequest) -> (Vec<Instruction>, Option<Instruction>) {
    let native = crate::domain::native_mint();
    if !is_native_mint(&request.input_mint) && !is_native_mint(&request.output_mint) {
        return (Vec::new(), None);
    }
    let other = if is_native_mint(&request.input_mint) {
        request.output_mint
    } else {
        request.input_mint
    };
    let wsol_account = derive_associated_token_address(&request.user, &native);
    let token = token_program_id();
    let create = |mint: &Pubkey| {
        spl_associated_token_account::instruction::create_associated_token_account_idempotent(
            &request.user,
            &request.user,
            mint,
            &token,
        )
    };

    let mut setup = vec![create(&native), create(&other)];
    if is_native_mint(&request.input_mint) {
        setup.push(solana_sdk::system_instruction::transfer(
            &request.user,
            &wsol_account,
            request.amount,
        ));
        setup.push(
            spl_token::instruction::sync_native(&token, &wsol_account)
                .expect("sync_native with the classic token program"),
        );
    }
    let cleanup = spl_token::instruction::close_account(
        &token,
        &wsol_account,
        &request.user,
        &request.user,
        &[],
    )
    .expect("close_account with the classic token program");

    (setup, Some(cleanup))
}

/// Metrics sink that keeps every event, for asserting on outcomes
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    submitted: Mutex<Vec<Trade>>,
    completed: Mutex<Vec<(Trade, Duration)>>,
    errors: Mutex<Vec<&'static str>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    /// Completions that ended in `status`
    pub fn completed_with(&self, status: TradeStatus) -> usize {
        self.completed
            .lock()
            .unwrap()
            .iter()
            .filter(|(trade, _)| trade.status == status)
            .count()
    }

    pub fn errors(&self) -> Vec<&'static str> {
        self.errors.lock().unwrap().clone()
    }
}

impl MetricsSink for RecordingMetrics {
    fn trade_submitted(&self, trade: &Trade) {
        self.submitted.lock().unwrap().push(trade.clone());
    }

    fn trade_completed(&self, trade: &Trade, latency: Duration) {
        self.completed.lock().unwrap().push((trade.clone(), latency));
    }

    fn error_recorded(&self, kind: &'static str) {
        self.errors.lock().unwrap().push(kind);
    }
}
