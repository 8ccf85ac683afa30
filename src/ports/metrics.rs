//! Metrics Port
//!
//! Fire-and-forget counters. Implementations must return immediately and
//! must not fail; the swap path never waits on them.

use std::time::Duration;

use crate::domain::Trade;

pub trait MetricsSink: Send + Sync {
    fn trade_submitted(&self, trade: &Trade);

    /// Trade reached a terminal status after `latency` of tracking
    fn trade_completed(&self, trade: &Trade, latency: Duration);

    /// An error of `kind` surfaced on the swap path
    fn error_recorded(&self, kind: &'static str);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn trade_submitted(&self, _trade: &Trade) {}

    fn trade_completed(&self, _trade: &Trade, _latency: Duration) {}

    fn error_recorded(&self, _kind: &'static str) {}
}
