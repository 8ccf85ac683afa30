//! swap-tracker - Swap execution and confirmation tracking for Solana
//!
//! Prepares Jupiter swaps as unsigned transactions, broadcasts externally
//! signed ones, and tracks each trade until it is finalized or fails.
//!
//! # Modules
//!
//! - `domain`: Trade lifecycle, token account derivation, known programs
//! - `ports`: Trait abstractions (LedgerPort, QuotePort, TradeJournal, MetricsSink)
//! - `application`: Resolver, preparer, submitter, poller, store and service
//! - `adapters`: External implementations (Solana, Jupiter, storage, CLI)
//! - `config`: Configuration loading and validation

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
