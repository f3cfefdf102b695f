//! Ledger store boundary
//!
//! The price feed only reads from the ledger's backing store through
//! [`LedgerStore`]. Connection handling, pooling and credentials live behind
//! the implementation; the core treats every call as potentially blocking and
//! cancellable.

mod fixture;

pub use fixture::{FixtureAccount, FixtureData, FixtureStore};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AccountId, ContractId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Worth retrying (dropped connection, statement timeout, ...)
    #[error("transient: {0}")]
    Transient(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

/// One transaction result row from the ledger history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResultRecord {
    pub ledger: u32,
    /// Ledger close time, unix seconds
    pub close_time: u64,
    /// Base64 XDR `TransactionResultPair`
    pub tx_result: String,
}

/// Account row as stored, signers still encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAccountProps {
    pub sequence: i64,
    pub thresholds: Vec<u8>,
    /// Base64 XDR `Signer<20>`, absent when the account has no extra signers
    pub signers: Option<String>,
}

pub type TxResultStream = BoxStream<'static, Result<TxResultRecord, StoreError>>;

/// Read access to the ledger's backing store
///
/// Implementations are shared across concurrent requests and must be safe to
/// call with several queries outstanding.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Base64 XDR `LedgerEntry` of the contract instance, `None` if absent
    async fn fetch_contract_state(
        &self,
        contract: &ContractId,
    ) -> Result<Option<String>, StoreError>;

    /// Transaction results closed in `[from, to)`, each delivered once, in any
    /// order. Consumers pull; nothing is buffered ahead of demand.
    fn fetch_tx_results(&self, from: u64, to: u64) -> TxResultStream;

    async fn fetch_account_props(
        &self,
        account: &AccountId,
    ) -> Result<Option<RawAccountProps>, StoreError>;

    /// Release connections; calling twice is a no-op
    async fn close(&self) -> Result<(), StoreError>;
}
