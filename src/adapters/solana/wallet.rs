//! Local keypair signer
//!
//! Stands in for the external signer when the CLI runs the full swap flow.
//! The core never touches keys; this adapter only turns a `PreparedSwap`
//! into a `SignedSwap`.

use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::application::{PreparedSwap, SignedSwap};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Failed to load keypair from file: {0}")]
    LoadError(String),
    #[error("Failed to sign transaction: {0}")]
    SigningError(String),
    #[error("Invalid keypair bytes: {0}")]
    InvalidKeypair(String),
    #[error("Transaction requires signer {required}, wallet holds {held}")]
    SignerMismatch { required: Pubkey, held: Pubkey },
}

pub struct LocalSigner {
    keypair: Keypair,
}

impl LocalSigner {
    /// Load keypair from a file path (JSON array format, `~` expanded)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let raw = path.as_ref().to_string_lossy();
        let expanded = shellexpand::tilde(&raw).into_owned();

        let contents = fs::read_to_string(&expanded)
            .map_err(|e| WalletError::LoadError(format!("Failed to read {}: {}", expanded, e)))?;

        let bytes: Vec<u8> = serde_json::from_str(&contents)
            .map_err(|e| WalletError::LoadError(format!("Invalid JSON format: {}", e)))?;

        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        let keypair = Keypair::try_from(bytes)
            .map_err(|e| WalletError::InvalidKeypair(e.to_string()))?;

        Ok(Self { keypair })
    }

    /// Create a new random keypair (for testing)
    pub fn new_random() -> Self {
        Self {
            keypair: Keypair::new(),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Sign a prepared swap. Every required signer must be this wallet.
    pub fn sign(&self, prepared: PreparedSwap) -> Result<SignedSwap, WalletError> {
        let held = self.pubkey();
        if let Some(required) = prepared.required_signers.iter().find(|s| **s != held) {
            return Err(WalletError::SignerMismatch {
                required: *required,
                held,
            });
        }

        let mut transaction = prepared.transaction;
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_sign(&[&self.keypair], blockhash)
            .map_err(|e| WalletError::SigningError(e.to_string()))?;

        Ok(SignedSwap {
            transaction,
            draft: prepared.draft,
        })
    }
}
