//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - The ledger (account lookups, broadcast, signature status)
//! - The quote service (routes with swap instructions)
//! - Trade persistence
//! - Metrics

pub mod journal;
pub mod ledger;
pub mod metrics;
#[cfg(any(test, feature = "test-util"))]
pub mod mocks;
pub mod quote;

pub use journal::{JournalError, TradeJournal};
pub use ledger::{LedgerError, LedgerPort, SignatureStatus};
pub use self::metrics::{MetricsSink, NoopMetrics};
pub use quote::{QuoteError, QuotePort, Route, RouteRequest};
