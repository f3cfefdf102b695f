//! Error taxonomy of the price feed core

use thiserror::Error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, OracleError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    // Caller input, rejected before any I/O
    #[error("invalid asset descriptor: {0}")]
    InvalidAssetDescriptor(String),
    #[error("unsupported asset type {0}")]
    UnsupportedAssetType(u32),
    #[error("invalid address {0}")]
    InvalidAddress(String),
    #[error("decimals {requested} exceeds maximum {max}")]
    InvalidDecimals { requested: u32, max: u32 },

    // Data integrity, fail the whole request
    #[error("malformed contract state: {0}")]
    MalformedContractState(String),
    #[error("malformed signer entry #{index}: {reason}")]
    MalformedSignerEntry { index: usize, reason: String },
    #[error("price for {asset} overflows at {decimals} decimals")]
    PriceOverflow { asset: String, decimals: u32 },

    // Collaborator failures, surfaced without retrying
    #[error("transient fetch error: {0}")]
    TransientFetch(String),
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("transaction scan exceeded {0:?}")]
    ScanTimeout(std::time::Duration),
    #[error("account {0} not found")]
    AccountNotFound(String),

    // Usage
    #[error("aggregator already merged")]
    AggregatorClosed,
}

impl OracleError {
    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OracleError::TransientFetch(_) | OracleError::ScanTimeout(_)
        )
    }

    pub(crate) fn malformed_state(err: impl std::fmt::Display) -> Self {
        OracleError::MalformedContractState(err.to_string())
    }
}

impl From<StoreError> for OracleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(msg) => OracleError::TransientFetch(msg),
            StoreError::Fatal(msg) => OracleError::Fetch(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let transient: OracleError = StoreError::Transient("reset".into()).into();
        assert!(transient.is_retryable());
        let fatal: OracleError = StoreError::Fatal("bad query".into()).into();
        assert_eq!(fatal, OracleError::Fetch("bad query".into()));
        assert!(!fatal.is_retryable());
        assert!(!OracleError::AggregatorClosed.is_retryable());
    }
}
