//! Domain Layer - Core types for swap execution
//!
//! Pure types and rules with no I/O. All external interactions happen
//! through the ports layer.
//!
//! - `trade`: Trade record and its forward-only status machine
//! - `accounts`: Associated token account derivation and creation
//! - `known_programs`: Program IDs and the native-asset marker

pub mod accounts;
pub mod known_programs;
pub mod trade;

pub use accounts::{
    TokenAccountRequirement, derive_associated_token_address, is_initialized_token_account,
};
pub use known_programs::{is_native_mint, native_mint};
pub use trade::{
    FailureKind, Trade, TradeDraft, TradeFailure, TradeId, TradeStatus, TransitionError,
};
