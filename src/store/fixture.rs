//! In-memory ledger store loaded from captured ledger data
//!
//! Used for replaying a window offline and in tests. Data is a JSON document:
//!
//! ```json
//! {
//!   "contracts": { "C…": "<base64 LedgerEntry>" },
//!   "tx_results": [ { "ledger": 1, "close_time": 1000, "tx_result": "<base64>" } ],
//!   "accounts": { "G…": { "sequence": 1, "thresholds": [1, 0, 0, 0], "signers": null } }
//! }
//! ```

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use super::{LedgerStore, RawAccountProps, StoreError, TxResultRecord, TxResultStream};
use crate::types::{AccountId, ContractId};

pub type FixtureAccount = RawAccountProps;

/// Serialized form of a fixture
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureData {
    #[serde(default)]
    pub contracts: HashMap<String, String>,
    #[serde(default)]
    pub tx_results: Vec<TxResultRecord>,
    #[serde(default)]
    pub accounts: HashMap<String, FixtureAccount>,
}

#[derive(Debug, Default)]
pub struct FixtureStore {
    contracts: HashMap<ContractId, String>,
    tx_results: Vec<TxResultRecord>,
    accounts: HashMap<AccountId, RawAccountProps>,
    closed: AtomicBool,
}

impl FixtureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: FixtureData) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for (contract, entry) in data.contracts {
            let id = ContractId::from_strkey(&contract)
                .map_err(|e| StoreError::Fatal(format!("fixture contract key: {}", e)))?;
            store.contracts.insert(id, entry);
        }
        for (account, props) in data.accounts {
            let id = AccountId::from_strkey(&account)
                .map_err(|e| StoreError::Fatal(format!("fixture account key: {}", e)))?;
            store.accounts.insert(id, props);
        }
        store.tx_results = data.tx_results;
        Ok(store)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Fatal(format!("read {}: {}", path.display(), e)))?;
        let data: FixtureData = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Fatal(format!("parse {}: {}", path.display(), e)))?;
        let store = Self::from_data(data)?;
        info!(
            path = %path.display(),
            contracts = store.contracts.len(),
            tx_results = store.tx_results.len(),
            accounts = store.accounts.len(),
            "Loaded ledger fixture"
        );
        Ok(store)
    }

    pub fn with_contract_state(mut self, contract: ContractId, entry: impl Into<String>) -> Self {
        self.contracts.insert(contract, entry.into());
        self
    }

    pub fn with_tx_result(mut self, record: TxResultRecord) -> Self {
        self.tx_results.push(record);
        self
    }

    pub fn with_account(mut self, account: AccountId, props: RawAccountProps) -> Self {
        self.accounts.insert(account, props);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Fatal("store closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for FixtureStore {
    async fn fetch_contract_state(
        &self,
        contract: &ContractId,
    ) -> Result<Option<String>, StoreError> {
        self.ensure_open()?;
        Ok(self.contracts.get(contract).cloned())
    }

    fn fetch_tx_results(&self, from: u64, to: u64) -> TxResultStream {
        if let Err(e) = self.ensure_open() {
            return stream::once(async move { Err(e) }).boxed();
        }
        let records: Vec<TxResultRecord> = self
            .tx_results
            .iter()
            .filter(|r| r.close_time >= from && r.close_time < to)
            .cloned()
            .collect();
        debug!(from, to, count = records.len(), "Streaming fixture tx results");
        stream::iter(records.into_iter().map(Ok)).boxed()
    }

    async fn fetch_account_props(
        &self,
        account: &AccountId,
    ) -> Result<Option<RawAccountProps>, StoreError> {
        self.ensure_open()?;
        Ok(self.accounts.get(account).cloned())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Fixture store closed");
        }
        Ok(())
    }
}
