//! Account Resolver
//!
//! Works out which associated token accounts a swap depends on and whether
//! each one already exists on the ledger.

use std::sync::Arc;

use solana_sdk::{instruction::Instruction, pubkey::Pubkey};

use super::error::SwapError;
use crate::domain::{
    TokenAccountRequirement, derive_associated_token_address, is_initialized_token_account,
    is_native_mint,
};
use crate::ports::LedgerPort;

pub struct AccountResolver {
    ledger: Arc<dyn LedgerPort>,
}

impl AccountResolver {
    pub fn new(ledger: Arc<dyn LedgerPort>) -> Self {
        Self { ledger }
    }

    /// One requirement per distinct non-native mint, in first-seen order.
    ///
    /// A failed lookup is surfaced as `Unavailable`; an account is never
    /// assumed missing because the ledger could not be asked.
    pub async fn resolve_requirements(
        &self,
        owner: &Pubkey,
        mints: &[Pubkey],
    ) -> Result<Vec<TokenAccountRequirement>, SwapError> {
        let mut seen: Vec<Pubkey> = Vec::with_capacity(mints.len());
        for mint in mints {
            if is_native_mint(mint) || seen.contains(mint) {
                continue;
            }
            seen.push(*mint);
        }

        let mut requirements = Vec::with_capacity(seen.len());
        for mint in seen {
            let derived_address = derive_associated_token_address(owner, &mint);
            let account = self
                .ledger
                .get_account_info(&derived_address)
                .await
                .map_err(|e| {
                    tracing::warn!("Account lookup for {} failed: {}", derived_address, e);
                    SwapError::Unavailable(format!(
                        "Token account lookup for mint {} failed: {}",
                        mint, e
                    ))
                })?;

            let exists = account.as_ref().is_some_and(is_initialized_token_account);
            tracing::debug!(
                "Token account {} for mint {}: {}",
                derived_address,
                mint,
                if exists { "exists" } else { "missing" }
            );

            requirements.push(TokenAccountRequirement {
                owner: *owner,
                mint,
                derived_address,
                exists,
            });
        }

        Ok(requirements)
    }

    /// `CreateIdempotent` instruction for `requirement`, paid by `payer`
    pub fn create_instruction(payer: &Pubkey, requirement: &TokenAccountRequirement) -> Instruction {
        requirement.create_instruction(payer)
    }
}
