//! Known Program Addresses
//!
//! Program IDs the swap path builds instructions against.

use solana_sdk::pubkey::Pubkey;

/// Associated Token Account program
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = spl_associated_token_account::ID;

/// Jupiter Aggregator v6
pub const JUPITER_V6_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4");

/// Native SOL mint (wrapped SOL)
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// SPL Token program (classic)
pub fn token_program_id() -> Pubkey {
    spl_token::id()
}

/// The ledger's native-asset marker mint
pub fn native_mint() -> Pubkey {
    spl_token::native_mint::id()
}

/// Check if a mint is the native-asset marker
pub fn is_native_mint(mint: &Pubkey) -> bool {
    *mint == native_mint()
}
