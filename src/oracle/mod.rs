//! Oracle module - DEX trade aggregation into price feed updates
//!
//! Resolves the requested assets, loads the contract's previous price
//! snapshot, streams the window's transaction results through the trade
//! extractor into a fresh aggregator, and merges the result with the
//! previous prices.

mod aggregator;
mod assets;
mod extractor;
mod signers;
mod state;

pub use aggregator::{AggregatorState, PriceAggregator, VolumeAccumulator, MAX_DECIMALS};
pub use assets::{parse_asset_code, resolve_asset, resolve_assets};
pub use extractor::TradeExtractor;
pub use signers::{decode_signers, encode_signers, MAX_SIGNERS};
pub use state::{
    decode_contract_state, encode_contract_state, ADMIN_KEY, DECIMALS_KEY, LAST_TIMESTAMP_KEY,
    PRICES_KEY,
};

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{OracleError, Result};
use crate::store::LedgerStore;
use crate::types::{
    AccountId, AccountProps, AggregatedTradeResult, ContractId, TradeAggregationParams,
};

/// Default deadline for streaming one window
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(60);

/// Entry point for price aggregation and account lookups
///
/// Cheap to clone; clones share the store. Each aggregation owns its own
/// extractor and aggregator, so concurrent requests never share mutable state.
pub struct PriceOracle<S: LedgerStore> {
    store: Arc<S>,
    scan_timeout: Duration,
}

impl<S: LedgerStore> Clone for PriceOracle<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            scan_timeout: self.scan_timeout,
        }
    }
}

impl<S: LedgerStore> PriceOracle<S> {
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    pub fn from_shared(store: Arc<S>) -> Self {
        Self {
            store,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Aggregate the window's trades and merge them with the contract's
    /// previous prices
    ///
    /// `admin` and `last_timestamp` are passed through from the previous
    /// snapshot unchanged.
    pub async fn aggregate_trades(
        &self,
        params: &TradeAggregationParams,
    ) -> Result<AggregatedTradeResult> {
        // Input validation, no I/O yet
        if params.decimals > MAX_DECIMALS {
            return Err(OracleError::InvalidDecimals {
                requested: params.decimals,
                max: MAX_DECIMALS,
            });
        }
        let base = resolve_asset(&params.base_asset)?;
        let tracked = resolve_assets(&params.assets)?;
        if tracked.contains(&base) {
            warn!(base = %base, "Base asset is also tracked; it will not get trade prices");
        }
        let contract = ContractId::from_strkey(&params.contract)?;
        let window = params.window();

        info!(
            contract = %contract,
            base = %base,
            assets = tracked.len(),
            window = %window,
            decimals = params.decimals,
            "Aggregating DEX trades"
        );

        let raw_state = self.store.fetch_contract_state(&contract).await?;
        let snapshot = decode_contract_state(raw_state.as_deref(), params.decimals)?;
        if !snapshot.is_initialized() {
            info!(contract = %contract, "Contract not initialized, no previous prices");
        }

        let mut extractor = TradeExtractor::new(base, tracked.iter().copied(), window);
        let mut aggregator = PriceAggregator::new(tracked.iter().copied());
        {
            let results = self.store.fetch_tx_results(window.from, window.to());
            let events = extractor.trade_events(results);
            tokio::pin!(events);
            let deadline = tokio::time::Instant::now() + self.scan_timeout;
            loop {
                match tokio::time::timeout_at(deadline, events.next()).await {
                    Err(_) => {
                        warn!(contract = %contract, window = %window, "Transaction scan timed out");
                        return Err(OracleError::ScanTimeout(self.scan_timeout));
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => return Err(e.into()),
                    Ok(Some(Ok(event))) => aggregator.process_trade(&event)?,
                }
            }
        }
        let stats = extractor.stats();
        if stats.malformed_records > 0 {
            warn!(
                contract = %contract,
                skipped = stats.malformed_records,
                "Skipped malformed tx results during scan"
            );
        }

        let prices = aggregator.aggregate_prices(&snapshot.prices, params.decimals)?;
        info!(
            contract = %contract,
            records = stats.records,
            trades = stats.trades,
            failed = stats.failed_transactions,
            prices = prices.len(),
            "✅ Aggregation complete"
        );

        Ok(AggregatedTradeResult {
            prices,
            admin: snapshot.admin,
            last_timestamp: snapshot.last_timestamp,
            stats,
        })
    }

    /// Sequence, thresholds and decoded signers of an account
    pub async fn retrieve_account_props(&self, account: &str) -> Result<AccountProps> {
        let id = AccountId::from_strkey(account)?;
        let raw = self
            .store
            .fetch_account_props(&id)
            .await?
            .ok_or_else(|| OracleError::AccountNotFound(account.to_string()))?;
        let signers = raw.signers.as_deref().map(decode_signers).transpose()?;
        debug!(
            account = %id,
            sequence = raw.sequence,
            signers = signers.as_ref().map(|s| s.len()).unwrap_or(0),
            "Retrieved account props"
        );
        Ok(AccountProps {
            sequence: raw.sequence,
            thresholds: raw.thresholds,
            signers,
        })
    }

    /// Release the underlying store
    pub async fn close(&self) -> Result<()> {
        self.store.close().await?;
        Ok(())
    }
}
