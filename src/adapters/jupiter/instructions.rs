//! Jupiter Swap Instruction Types
//!
//! Request and response structures for `/swap-instructions`, which returns
//! the swap as loose instructions instead of a finished transaction.

use base64::Engine;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use std::str::FromStr;

/// Body for `/swap-instructions`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstructionsRequest {
    pub user_public_key: String,
    /// The full quote response from `/quote`
    pub quote_response: serde_json::Value,
    pub wrap_and_unwrap_sol: bool,
    pub as_legacy_transaction: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prioritization_fee_lamports: Option<u64>,
}

impl SwapInstructionsRequest {
    pub fn new(user_public_key: String, quote_response: serde_json::Value) -> Self {
        Self {
            user_public_key,
            quote_response,
            wrap_and_unwrap_sol: true,
            as_legacy_transaction: true,
            prioritization_fee_lamports: None,
        }
    }
}

/// Account reference as serialized by the API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    pub pubkey: String,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// Instruction as serialized by the API (data is base64)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstructionData {
    pub program_id: String,
    pub accounts: Vec<AccountData>,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid public key {0}")]
    Pubkey(String),
    #[error("Invalid instruction data: {0}")]
    Data(String),
}

impl TryFrom<&InstructionData> for Instruction {
    type Error = DecodeError;

    fn try_from(raw: &InstructionData) -> Result<Self, Self::Error> {
        let parse = |key: &str| Pubkey::from_str(key).map_err(|_| DecodeError::Pubkey(key.to_string()));

        let accounts = raw
            .accounts
            .iter()
            .map(|account| {
                let pubkey = parse(&account.pubkey)?;
                Ok(if account.is_writable {
                    AccountMeta::new(pubkey, account.is_signer)
                } else {
                    AccountMeta::new_readonly(pubkey, account.is_signer)
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        let data = base64::engine::general_purpose::STANDARD
            .decode(&raw.data)
            .map_err(|e| DecodeError::Data(e.to_string()))?;

        Ok(Instruction {
            program_id: parse(&raw.program_id)?,
            accounts,
            data,
        })
    }
}

/// Response from `/swap-instructions`. Setup, swap and cleanup go into the
/// assembled transaction; compute budget and lookup tables are not used by
/// legacy transactions built here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstructionsResponse {
    #[serde(default)]
    pub compute_budget_instructions: Vec<InstructionData>,
    #[serde(default)]
    pub setup_instructions: Vec<InstructionData>,
    pub swap_instruction: InstructionData,
    #[serde(default)]
    pub cleanup_instruction: Option<InstructionData>,
    #[serde(default)]
    pub address_lookup_table_addresses: Vec<String>,
    #[serde(default)]
    pub compute_unit_limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(program_id: &str, data: &str) -> InstructionData {
        InstructionData {
            program_id: program_id.to_string(),
            accounts: vec![
                AccountData {
                    pubkey: "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM".into(),
                    is_signer: true,
                    is_writable: true,
                },
                AccountData {
                    pubkey: "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA".into(),
                    is_signer: false,
                    is_writable: false,
                },
            ],
            data: data.to_string(),
        }
    }

    #[test]
    fn test_decode_instruction() {
        let ix = Instruction::try_from(&raw(
            "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
            "5RfLl3rjrSoBAAAAAQ==",
        ))
        .unwrap();

        assert_eq!(ix.program_id.to_string(), "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4");
        assert!(ix.accounts[0].is_signer && ix.accounts[0].is_writable);
        assert!(!ix.accounts[1].is_signer && !ix.accounts[1].is_writable);
        assert_eq!(&ix.data[..4], &[0xe5, 0x17, 0xcb, 0x97]);
    }

    #[test]
    fn test_decode_rejects_bad_key() {
        let err = Instruction::try_from(&raw("not-a-key", "AA==")).unwrap_err();
        assert!(matches!(err, DecodeError::Pubkey(_)));
    }

    #[test]
    fn test_decode_rejects_bad_data() {
        let err = Instruction::try_from(&raw(
            "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
            "%%%",
        ))
        .unwrap_err();
        assert!(matches!(err, DecodeError::Data(_)));
    }

    #[test]
    fn test_request_serialization() {
        let req = SwapInstructionsRequest::new("wallet".into(), serde_json::json!({"inAmount": "1"}));
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(value["userPublicKey"], "wallet");
        assert_eq!(value["wrapAndUnwrapSol"], true);
        assert_eq!(value["asLegacyTransaction"], true);
        assert!(value.get("prioritizationFeeLamports").is_none());
    }
}
