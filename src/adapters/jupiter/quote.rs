//! Jupiter Quote Types
//!
//! Request and response structures for the Jupiter quote API.

use serde::{Deserialize, Serialize};

use crate::ports::RouteRequest;

/// Query parameters for `/quote`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    /// Amount in base units (lamports for SOL)
    pub amount: u64,
    /// Slippage tolerance in basis points (1 = 0.01%)
    pub slippage_bps: u16,
    /// Only use direct routes (no intermediate tokens)
    #[serde(default)]
    pub only_direct_routes: bool,
    /// Restrict the route to what fits a legacy transaction
    #[serde(default)]
    pub as_legacy_transaction: bool,
}

impl QuoteRequest {
    /// Query string pairs in the order the API documents them
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("inputMint", self.input_mint.clone()),
            ("outputMint", self.output_mint.clone()),
            ("amount", self.amount.to_string()),
            ("slippageBps", self.slippage_bps.to_string()),
            ("onlyDirectRoutes", self.only_direct_routes.to_string()),
            ("asLegacyTransaction", self.as_legacy_transaction.to_string()),
        ]
    }
}

impl From<&RouteRequest> for QuoteRequest {
    fn from(request: &RouteRequest) -> Self {
        Self {
            input_mint: request.input_mint.to_string(),
            output_mint: request.output_mint.to_string(),
            amount: request.amount,
            slippage_bps: request.slippage_bps,
            only_direct_routes: false,
            // Swaps are assembled as legacy transactions without lookup tables
            as_legacy_transaction: true,
        }
    }
}

/// Response from Jupiter quote API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: String,
    pub out_amount: String,
    /// Minimum output amount after slippage
    pub other_amount_threshold: String,
    /// Swap mode (ExactIn or ExactOut)
    pub swap_mode: String,
    pub slippage_bps: u16,
    #[serde(default)]
    pub price_impact_pct: String,
    pub route_plan: Vec<RoutePlanStep>,
    #[serde(default)]
    pub context_slot: Option<u64>,
    /// Unknown fields are kept so the quote can be echoed back verbatim
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, serde_json::Value>,
}

impl QuoteResponse {
    pub fn input_amount(&self) -> Option<u64> {
        self.in_amount.parse().ok()
    }

    pub fn output_amount(&self) -> Option<u64> {
        self.out_amount.parse().ok()
    }

    pub fn min_output_amount(&self) -> Option<u64> {
        self.other_amount_threshold.parse().ok()
    }

    pub fn price_impact(&self) -> f64 {
        self.price_impact_pct.parse().unwrap_or(0.0)
    }

    /// DEX label of every hop
    pub fn hops(&self) -> Vec<String> {
        self.route_plan
            .iter()
            .map(|step| step.swap_info.label.clone())
            .collect()
    }

    /// Fees charged in the input mint, summed over hops
    pub fn input_fee_total(&self) -> u64 {
        self.route_plan
            .iter()
            .filter(|step| step.swap_info.fee_mint.as_deref() == Some(self.input_mint.as_str()))
            .filter_map(|step| step.swap_info.fee_amount.as_deref()?.parse::<u64>().ok())
            .fold(0u64, u64::saturating_add)
    }
}

/// A step in the route plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlanStep {
    pub swap_info: SwapInfo,
    /// Percentage of the trade going through this route
    pub percent: u8,
}

/// Information about a single swap in the route
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInfo {
    pub amm_key: String,
    /// Label for the DEX (e.g., "Raydium", "Orca")
    pub label: String,
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: String,
    pub out_amount: String,
    /// Not always returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_mint: Option<String>,
}
