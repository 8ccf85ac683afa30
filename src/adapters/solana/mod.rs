pub mod rpc;
pub mod wallet;

pub use rpc::{SolanaClient, parse_commitment};
pub use wallet::{LocalSigner, WalletError};
