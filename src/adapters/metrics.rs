//! Metrics Adapter
//!
//! Publishes trade outcomes through the `metrics` facade and mirrors each
//! event to the log. Whatever recorder the binary installs (Prometheus
//! exporter, debugging recorder in tests) receives the values; with none
//! installed the calls are no-ops.

use std::time::Duration;

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};

use crate::domain::Trade;
use crate::ports::MetricsSink;

pub const TRADES_SUBMITTED: &str = "swap_trades_submitted_total";
pub const TRADES_COMPLETED: &str = "swap_trades_completed_total";
pub const TRADE_LATENCY: &str = "swap_trade_latency_seconds";
pub const ERRORS: &str = "swap_errors_total";

#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderMetrics;

impl RecorderMetrics {
    /// Create the sink and describe its metrics to the current recorder
    pub fn new() -> Self {
        describe_counter!(TRADES_SUBMITTED, Unit::Count, "Trades broadcast and stored");
        describe_counter!(TRADES_COMPLETED, Unit::Count, "Trades that reached a terminal status");
        describe_histogram!(
            TRADE_LATENCY,
            Unit::Seconds,
            "Time from submission to terminal status"
        );
        describe_counter!(ERRORS, Unit::Count, "Errors surfaced on the swap path, by kind");
        Self
    }
}

impl MetricsSink for RecorderMetrics {
    fn trade_submitted(&self, trade: &Trade) {
        counter!(TRADES_SUBMITTED).increment(1);
        tracing::info!(
            trade_id = %trade.id,
            from = %trade.from_mint,
            to = %trade.to_mint,
            amount = trade.amount,
            "trade submitted"
        );
    }

    fn trade_completed(&self, trade: &Trade, latency: Duration) {
        if !trade.is_terminal() {
            return;
        }
        let status = trade.status.as_str();
        counter!(TRADES_COMPLETED, "status" => status).increment(1);
        histogram!(TRADE_LATENCY, "status" => status).record(latency.as_secs_f64());

        tracing::info!(
            trade_id = %trade.id,
            status,
            failure = trade.error.as_ref().map(|e| e.kind.as_str()),
            latency_ms = latency.as_millis() as u64,
            confirmations = trade.confirmations,
            "trade completed"
        );
    }

    fn error_recorded(&self, kind: &'static str) {
        counter!(ERRORS, "kind" => kind).increment(1);
        tracing::debug!(kind, "swap error recorded");
    }
}
