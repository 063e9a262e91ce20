//! Error types for the RFF relayer

use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for funding attempts
#[derive(Error, Debug)]
pub enum FundingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("Unrecognized signature type {0}")]
    UnknownSignatureType(u8),

    #[error("Chain {chain_id} not found")]
    UnknownChain { chain_id: u64 },

    #[error("No vault address configured for chain {chain_id}")]
    UnknownVault { chain_id: u64 },

    #[error("No allowance entry for chain {chain_id}")]
    MissingAllowance { chain_id: u64 },

    #[error("Chain {chain_id} belongs to unsupported family {family}")]
    UnsupportedFamily { chain_id: u64, family: String },

    #[error("Invalid {family} address: {address}")]
    InvalidAddress { family: String, address: String },

    #[error("Amount conversion error: {0}")]
    AmountConversion(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Signed request does not match source {index} on chain {chain_id}")]
    RequestMismatch { chain_id: u64, index: usize },

    #[error("Coordination chain error: {0}")]
    Coordination(String),

    #[error("Double-check failed on chain {chain_id}: {message}")]
    DoubleCheck { chain_id: u64, message: String },

    #[error("Subscription error on chain {chain_id}: {message}")]
    Subscription { chain_id: u64, message: String },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Wait for intent {intent_id} was cancelled")]
    Cancelled { intent_id: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FundingError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FundingError::ChainConnection { .. }
                | FundingError::Http(_)
                | FundingError::Timeout { .. }
                | FundingError::Subscription { .. }
        )
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            FundingError::InsufficientBalance { .. }
                | FundingError::UnknownSignatureType(_)
                | FundingError::UnknownChain { .. }
                | FundingError::UnknownVault { .. }
                | FundingError::MissingAllowance { .. }
                | FundingError::RequestMismatch { .. }
        )
    }
}

/// Result type for funding operations
pub type FundingResult<T> = Result<T, FundingError>;
