//! Associated Token Accounts
//!
//! Derivation of the per-(owner, mint) token account and the instruction
//! that creates it. Everything here is pure; existence checks live in the
//! application layer behind the ledger port.

use serde::{Deserialize, Serialize};
use solana_sdk::{account::Account, instruction::Instruction, pubkey::Pubkey};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use spl_token::solana_program::program_pack::Pack;

use super::known_programs::token_program_id;

/// A token account a swap depends on, and whether it is already on-chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccountRequirement {
    pub owner: Pubkey,
    pub mint: Pubkey,
    pub derived_address: Pubkey,
    pub exists: bool,
}

impl TokenAccountRequirement {
    /// Whether an account-creation instruction must precede the swap
    pub fn needs_creation(&self) -> bool {
        !self.exists
    }

    /// `CreateIdempotent` for this account, paid by `payer`. It still
    /// succeeds if the account appears between the lookup and the broadcast.
    pub fn create_instruction(&self, payer: &Pubkey) -> Instruction {
        create_associated_token_account_idempotent(
            payer,
            &self.owner,
            &self.mint,
            &token_program_id(),
        )
    }
}

/// Associated token account address for `(owner, mint)` under the classic
/// token program
pub fn derive_associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    get_associated_token_address(owner, mint)
}

/// An account counts as present only when the token program owns it and it
/// unpacks as an initialized token account.
pub fn is_initialized_token_account(account: &Account) -> bool {
    account.owner == token_program_id()
        && spl_token::state::Account::unpack(&account.data).is_ok()
}
