use async_trait::async_trait;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_request::RpcError;
use solana_sdk::{
    account::Account,
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{Transaction, TransactionError},
};
use solana_transaction_status::{TransactionConfirmationStatus, TransactionStatus};
use std::sync::Arc;
use std::time::Duration;

use crate::ports::{LedgerError, LedgerPort, SignatureStatus};

/// JSON-RPC code for "node is behind"; the request may succeed elsewhere
const NODE_UNHEALTHY: i64 = -32005;
const HTTP_TOO_MANY_REQUESTS: u16 = 429;

/// Parse a commitment level name (`processed`, `confirmed`, `finalized`)
pub fn parse_commitment(level: &str) -> Option<CommitmentConfig> {
    let commitment = match level.trim().to_ascii_lowercase().as_str() {
        "processed" => CommitmentLevel::Processed,
        "confirmed" => CommitmentLevel::Confirmed,
        "finalized" => CommitmentLevel::Finalized,
        _ => return None,
    };
    Some(CommitmentConfig { commitment })
}

/// Map an RPC client error onto the ledger error kinds the swap path acts on
pub fn classify_client_error(err: &ClientError) -> LedgerError {
    match err.kind() {
        ClientErrorKind::Io(e) => match e.kind() {
            std::io::ErrorKind::TimedOut => LedgerError::Timeout,
            _ => LedgerError::Connection(e.to_string()),
        },
        ClientErrorKind::Reqwest(e) => {
            if e.status().map(|s| s.as_u16()) == Some(HTTP_TOO_MANY_REQUESTS) {
                LedgerError::RateLimited
            } else if e.is_timeout() {
                LedgerError::Timeout
            } else {
                LedgerError::Connection(e.to_string())
            }
        }
        ClientErrorKind::RpcError(RpcError::RpcResponseError { code, message, .. }) => {
            if *code == NODE_UNHEALTHY {
                LedgerError::Connection(message.clone())
            } else {
                LedgerError::Rejected(message.clone())
            }
        }
        ClientErrorKind::RpcError(e) => LedgerError::Connection(e.to_string()),
        ClientErrorKind::TransactionError(e) => LedgerError::Rejected(e.to_string()),
        ClientErrorKind::SigningError(e) => LedgerError::Rejected(e.to_string()),
        _ => LedgerError::Connection(err.to_string()),
    }
}

/// Reduce an RPC transaction status to what the poller needs
pub fn to_signature_status(status: TransactionStatus) -> SignatureStatus {
    if let Some(err) = status.err {
        return SignatureStatus::failed(err.to_string());
    }

    // Rooted transactions report no confirmation count
    let finalized = status.confirmations.is_none()
        || matches!(status.confirmation_status, Some(TransactionConfirmationStatus::Finalized));

    SignatureStatus {
        confirmations: status.confirmations.unwrap_or_default() as u64,
        finalized,
        err: None,
    }
}

/// Wrapper around Solana RPC client with async-compatible methods
#[derive(Clone)]
pub struct SolanaClient {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    skip_preflight: bool,
}

impl SolanaClient {
    /// Create a new Solana RPC client at `confirmed` commitment
    pub fn new(rpc_url: String) -> Self {
        Self::with_settings(rpc_url, CommitmentConfig::confirmed(), Duration::from_secs(30), false)
    }

    pub fn with_settings(
        rpc_url: String,
        commitment: CommitmentConfig,
        timeout: Duration,
        skip_preflight: bool,
    ) -> Self {
        let client = Arc::new(RpcClient::new_with_timeout_and_commitment(
            rpc_url, timeout, commitment,
        ));
        Self {
            client,
            commitment,
            skip_preflight,
        }
    }

    /// Run a blocking RPC call off the async runtime
    async fn blocking<T, F>(&self, call: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&RpcClient) -> Result<T, ClientError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || call(&client))
            .await
            .map_err(|e| LedgerError::Connection(format!("Task join error: {}", e)))?
            .map_err(|e| classify_client_error(&e))
    }

    /// Get SOL balance for a public key
    pub async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, LedgerError> {
        let pubkey = *pubkey;
        self.blocking(move |client| client.get_balance(&pubkey)).await
    }
}

#[async_trait]
impl LedgerPort for SolanaClient {
    async fn get_account_info(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        let address = *address;
        let commitment = self.commitment;
        self.blocking(move |client| {
            client
                .get_account_with_commitment(&address, commitment)
                .map(|response| response.value)
        })
        .await
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        let tx = transaction.clone();
        let config = RpcSendTransactionConfig {
            skip_preflight: self.skip_preflight,
            preflight_commitment: Some(self.commitment.commitment),
            // Rebroadcasting is the submitter's job
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };

        let client = Arc::clone(&self.client);
        let result = tokio::task::spawn_blocking(move || {
            client
                .send_transaction_with_config(&tx, config)
                .or_else(|e| match e.get_transaction_error() {
                    // A retry of a send whose response was lost
                    Some(TransactionError::AlreadyProcessed) => Ok(tx.signatures[0]),
                    _ => Err(e),
                })
        })
        .await
        .map_err(|e| LedgerError::Connection(format!("Task join error: {}", e)))?;

        result.map_err(|e| {
            let err = classify_client_error(&e);
            tracing::debug!("send_transaction failed: {} ({:?})", e, err);
            err
        })
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, LedgerError> {
        let signature = *signature;
        let statuses = self
            .blocking(move |client| {
                client
                    .get_signature_statuses(&[signature])
                    .map(|response| response.value)
            })
            .await?;

        Ok(statuses.into_iter().next().flatten().map(to_signature_status))
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, LedgerError> {
        self.blocking(|client| client.get_latest_blockhash()).await
    }
}
