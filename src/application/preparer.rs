//! Trade Preparer
//!
//! Turns a swap request into an unsigned transaction plus the draft of the
//! trade it would create. Nothing is written anywhere; calling `prepare`
//! twice with the same inputs is harmless.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::Utc;
use solana_sdk::{
    instruction::Instruction, message::Message, pubkey::Pubkey, transaction::Transaction,
};

use super::error::SwapError;
use super::resolver::AccountResolver;
use crate::domain::known_programs::ASSOCIATED_TOKEN_PROGRAM_ID;
use crate::domain::{TokenAccountRequirement, TradeDraft, TradeStatus};
use crate::ports::{LedgerPort, QuotePort, RouteRequest};

/// Slippage cannot exceed 100%
pub const MAX_SLIPPAGE_BPS: u16 = 10_000;

/// Quotes older than this are refused by default
pub const DEFAULT_MAX_QUOTE_AGE: Duration = Duration::from_secs(10);

/// A swap request from a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub owner: Pubkey,
    pub from_mint: Pubkey,
    pub to_mint: Pubkey,
    /// Input amount in base units
    pub amount: u64,
    pub slippage_bps: u16,
}

impl SwapRequest {
    pub fn validate(&self) -> Result<(), SwapError> {
        if self.amount == 0 {
            return Err(SwapError::Validation("Amount must be greater than zero".into()));
        }
        if self.from_mint == self.to_mint {
            return Err(SwapError::Validation(format!(
                "Cannot swap {} into itself",
                self.from_mint
            )));
        }
        if self.slippage_bps > MAX_SLIPPAGE_BPS {
            return Err(SwapError::Validation(format!(
                "Slippage {} bps exceeds maximum {} bps",
                self.slippage_bps, MAX_SLIPPAGE_BPS
            )));
        }
        Ok(())
    }
}

/// Unsigned transaction ready for the external signer
#[derive(Debug, Clone)]
pub struct PreparedSwap {
    pub transaction: Transaction,
    pub required_signers: Vec<Pubkey>,
    pub draft: TradeDraft,
    pub requirements: Vec<TokenAccountRequirement>,
}

impl PreparedSwap {
    pub fn account_creation_count(&self) -> usize {
        self.requirements.iter().filter(|r| r.needs_creation()).count()
    }

    /// Wire encoding handed to signers: bincode, then base64
    pub fn encode_transaction(&self) -> Result<String, bincode::Error> {
        let bytes = bincode::serialize(&self.transaction)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

pub struct TradePreparer {
    resolver: AccountResolver,
    quotes: Arc<dyn QuotePort>,
    ledger: Arc<dyn LedgerPort>,
    max_quote_age: Duration,
}

impl TradePreparer {
    pub fn new(
        ledger: Arc<dyn LedgerPort>,
        quotes: Arc<dyn QuotePort>,
        max_quote_age: Duration,
    ) -> Self {
        Self {
            resolver: AccountResolver::new(ledger.clone()),
            quotes,
            ledger,
            max_quote_age,
        }
    }

    pub async fn prepare(&self, request: &SwapRequest) -> Result<PreparedSwap, SwapError> {
        request.validate()?;

        let route = self
            .quotes
            .get_quote(&RouteRequest {
                user: request.owner,
                input_mint: request.from_mint,
                output_mint: request.to_mint,
                amount: request.amount,
                slippage_bps: request.slippage_bps,
            })
            .await?;

        if route.is_empty() {
            return Err(SwapError::Validation(format!(
                "No route from {} to {}",
                request.from_mint, request.to_mint
            )));
        }
        if route.input_mint != request.from_mint || route.output_mint != request.to_mint {
            return Err(SwapError::Validation(format!(
                "Quote is for {} -> {}, requested {} -> {}",
                route.input_mint, route.output_mint, request.from_mint, request.to_mint
            )));
        }

        let age = route.age(Utc::now());
        let max_age = chrono::Duration::from_std(self.max_quote_age)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        if age > max_age {
            return Err(SwapError::Validation(format!(
                "Quote is {}ms old, limit is {}ms",
                age.num_milliseconds(),
                max_age.num_milliseconds()
            )));
        }

        let requirements = self
            .resolver
            .resolve_requirements(&request.owner, &[request.from_mint, request.to_mint])
            .await?;

        let mut instructions: Vec<Instruction> = requirements
            .iter()
            .filter(|r| r.needs_creation())
            .map(|r| AccountResolver::create_instruction(&request.owner, r))
            .collect();
        let creations = instructions.len();
        let covered: Vec<Pubkey> = requirements.iter().map(|r| r.derived_address).collect();
        instructions.extend(
            route
                .setup_instructions
                .iter()
                .filter(|ix| !creates_covered_account(ix, &covered))
                .cloned(),
        );
        instructions.push(route.swap_instruction.clone());
        instructions.extend(route.cleanup_instruction.clone());

        let blockhash = self.ledger.get_latest_blockhash().await?;
        let message = Message::new_with_blockhash(&instructions, Some(&request.owner), &blockhash);
        let signer_count = usize::from(message.header.num_required_signatures);
        let required_signers = message.account_keys[..signer_count].to_vec();
        let transaction = Transaction::new_unsigned(message);

        let draft = TradeDraft {
            owner: request.owner.to_string(),
            from_mint: request.from_mint.to_string(),
            to_mint: request.to_mint.to_string(),
            amount: request.amount,
            expected_out_amount: route.out_amount,
            min_out_amount: route.min_out_amount,
            price: route.price(),
            fee: route.fee_amount,
            slippage_bps: request.slippage_bps,
            status: TradeStatus::Pending,
            created_at: Utc::now(),
        };

        tracing::info!(
            "Prepared swap {} {} -> {} for {}: {} account creation(s), {} instruction(s), route {}",
            request.amount,
            request.from_mint,
            request.to_mint,
            request.owner,
            creations,
            instructions.len(),
            route.hops.join(" -> ")
        );

        Ok(PreparedSwap {
            transaction,
            required_signers,
            draft,
            requirements,
        })
    }
}

/// Whether `ix` creates one of the token accounts already resolved
fn creates_covered_account(ix: &Instruction, covered: &[Pubkey]) -> bool {
    ix.program_id == ASSOCIATED_TOKEN_PROGRAM_ID
        && ix
            .accounts
            .get(1)
            .is_some_and(|account| covered.contains(&account.pubkey))
}
