//! Application Layer - Swap path orchestration
//!
//! - `resolver`: which token accounts a swap needs
//! - `preparer`: unsigned transaction + trade draft
//! - `submitter`: idempotent broadcast with retry
//! - `poller`: confirmation state machine and worker pool
//! - `store`: per-trade locked source of truth
//! - `service`: client facade and restart recovery

pub mod error;
pub mod poller;
pub mod preparer;
pub mod resolver;
pub mod service;
pub mod store;
pub mod submitter;

pub use error::SwapError;
pub use poller::{ConfirmationPoller, PollJob, PollerConfig, PollerHandle, PollerPool, advance};
pub use preparer::{PreparedSwap, SwapRequest, TradePreparer, MAX_SLIPPAGE_BPS};
pub use resolver::AccountResolver;
pub use service::{ServiceConfig, SwapService};
pub use store::{StoreError, TradeStateStore};
pub use submitter::{RetryPolicy, SignedSwap, Submitter};
