//! Jupiter API Client
//!
//! HTTP client for the Jupiter swap API. Fetches a quote, then the swap
//! instruction for that quote, and hands both to the core as a `Route`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};

use super::instructions::{SwapInstructionsRequest, SwapInstructionsResponse};
use super::quote::{QuoteRequest, QuoteResponse};
use crate::ports::{QuoteError, QuotePort, Route, RouteRequest};

/// Jupiter API client configuration
#[derive(Debug, Clone)]
pub struct JupiterConfig {
    pub api_base_url: String,
    /// Optional API key for higher rate limits
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.jup.ag/swap/v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Jupiter DEX aggregator client
#[derive(Debug, Clone)]
pub struct JupiterClient {
    config: JupiterConfig,
    http: Client,
}

impl JupiterClient {
    /// Create a new Jupiter client with default configuration
    pub fn new() -> Result<Self, QuoteError> {
        Self::with_config(JupiterConfig::default())
    }

    pub fn with_config(config: JupiterConfig) -> Result<Self, QuoteError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| QuoteError::ApiError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub async fn fetch_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, QuoteError> {
        let url = format!("{}/quote", self.config.api_base_url);

        let mut req = self.http.get(&url).query(&request.query_pairs());
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-api-key", api_key);
        }

        let response = self
            .execute_with_retry(|| async {
                req.try_clone()
                    .ok_or_else(|| QuoteError::ApiError("Failed to clone request".into()))?
                    .send()
                    .await
                    .map_err(|e| QuoteError::ApiError(e.to_string()))
            })
            .await?;

        self.handle_response(response).await
    }

    pub async fn get_swap_instructions(
        &self,
        request: &SwapInstructionsRequest,
    ) -> Result<SwapInstructionsResponse, QuoteError> {
        let url = format!("{}/swap-instructions", self.config.api_base_url);

        let mut req = self.http.post(&url).json(request);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-api-key", api_key);
        }

        let response = self
            .execute_with_retry(|| async {
                req.try_clone()
                    .ok_or_else(|| QuoteError::ApiError("Failed to clone request".into()))?
                    .send()
                    .await
                    .map_err(|e| QuoteError::ApiError(e.to_string()))
            })
            .await?;

        self.handle_response(response).await
    }

    /// Execute request with retry logic and rate limit handling
    async fn execute_with_retry<F, Fut>(&self, request_fn: F) -> Result<reqwest::Response, QuoteError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, QuoteError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.config.max_retries {
            match request_fn().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let backoff = Duration::from_secs(2u64.pow(attempt + 1)); // 2s, 4s, 8s
                        tracing::warn!(
                            "Rate limited (429), backing off for {:?} (attempt {}/{})",
                            backoff, attempt + 1, self.config.max_retries
                        );
                        last_error = Some(QuoteError::RateLimited);
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    if status.is_server_error() {
                        last_error = Some(QuoteError::ApiError(format!("Server error: {}", status)));
                        tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(e) => {
                    tracing::warn!("Jupiter request failed (attempt {}): {}", attempt + 1, e);
                    last_error = Some(e);
                    tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| QuoteError::ApiError("Max retries exceeded".into())))
    }

    /// Handle API response and deserialize
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, QuoteError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(QuoteError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_error_body(status, error_text));
        }

        response
            .json()
            .await
            .map_err(|e| QuoteError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    pub fn api_base_url(&self) -> &str {
        &self.config.api_base_url
    }
}

fn classify_error_body(status: StatusCode, body: String) -> QuoteError {
    if body.contains("COULD_NOT_FIND_ANY_ROUTE") || body.contains("No routes found") {
        return QuoteError::NoRoute(body);
    }
    if status.is_client_error() {
        return QuoteError::InvalidParameters(format!("API error {}: {}", status, body));
    }
    QuoteError::ApiError(format!("API error {}: {}", status, body))
}

/// Combine a quote and its swap instruction into a `Route`
pub fn build_route(
    quote: &QuoteResponse,
    instructions: &SwapInstructionsResponse,
) -> Result<Route, QuoteError> {
    let parse_mint = |mint: &str| {
        Pubkey::from_str(mint)
            .map_err(|_| QuoteError::InvalidResponse(format!("Invalid mint in quote: {}", mint)))
    };
    let amount = |value: Option<u64>, field: &str| {
        value.ok_or_else(|| QuoteError::InvalidResponse(format!("Unparseable {} in quote", field)))
    };

    let decode = |raw, what: &str| {
        Instruction::try_from(raw)
            .map_err(|e| QuoteError::InvalidResponse(format!("{} instruction: {}", what, e)))
    };

    let setup_instructions = instructions
        .setup_instructions
        .iter()
        .map(|raw| decode(raw, "Setup"))
        .collect::<Result<Vec<_>, _>>()?;
    let swap_instruction = decode(&instructions.swap_instruction, "Swap")?;
    let cleanup_instruction = instructions
        .cleanup_instruction
        .as_ref()
        .map(|raw| decode(raw, "Cleanup"))
        .transpose()?;

    Ok(Route {
        input_mint: parse_mint(&quote.input_mint)?,
        output_mint: parse_mint(&quote.output_mint)?,
        in_amount: amount(quote.input_amount(), "inAmount")?,
        out_amount: amount(quote.output_amount(), "outAmount")?,
        min_out_amount: amount(quote.min_output_amount(), "otherAmountThreshold")?,
        price_impact_pct: quote.price_impact(),
        fee_amount: quote.input_fee_total(),
        hops: quote.hops(),
        setup_instructions,
        swap_instruction,
        cleanup_instruction,
        quoted_at: Utc::now(),
    })
}

#[async_trait]
impl QuotePort for JupiterClient {
    async fn get_quote(&self, request: &RouteRequest) -> Result<Route, QuoteError> {
        let quote = self.fetch_quote(&QuoteRequest::from(request)).await?;
        let quoted_at = Utc::now();

        if quote.route_plan.is_empty() {
            return Err(QuoteError::NoRoute(format!(
                "{} -> {}",
                request.input_mint, request.output_mint
            )));
        }

        let body = SwapInstructionsRequest::new(
            request.user.to_string(),
            serde_json::to_value(&quote)
                .map_err(|e| QuoteError::InvalidParameters(e.to_string()))?,
        );
        let instructions = self.get_swap_instructions(&body).await?;

        if !instructions.compute_budget_instructions.is_empty() {
            tracing::debug!(
                "Ignoring {} compute budget instruction(s) for {} -> {}",
                instructions.compute_budget_instructions.len(),
                request.input_mint,
                request.output_mint
            );
        }

        let mut route = build_route(&quote, &instructions)?;
        route.quoted_at = quoted_at;
        Ok(route)
    }
}
