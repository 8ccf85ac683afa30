//! Jupiter Adapter
//!
//! Implementation of the QuotePort for the Jupiter DEX aggregator.
//! Fetches quotes and the matching swap instruction.

mod client;
mod instructions;
mod quote;

pub use client::{JupiterClient, JupiterConfig, build_route};
pub use instructions::{InstructionData, SwapInstructionsRequest, SwapInstructionsResponse};
pub use quote::{QuoteRequest, QuoteResponse};
