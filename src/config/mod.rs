//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    Config, ConfigError, ConfirmationSection, ExecutionSection, JupiterSection, LoggingSection,
    SolanaSection, StorageSection, load_config,
};
