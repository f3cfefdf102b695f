//! Trade Extractor - DEX trades of tracked assets from transaction results
//!
//! Turns a stream of raw transaction results into trade events between the
//! base asset and one of the tracked assets, normalized so the price is
//! always base per unit of the tracked asset. Bad records are skipped and
//! counted; one corrupt row must not abort a scan over a whole window.

use futures_util::stream::{self, Stream, StreamExt};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::ledger::{ClaimedOffer, TransactionOutcome};
use crate::store::{StoreError, TxResultRecord};
use crate::types::{AggregationWindow, AssetId, ScanStats, TradeEvent};

pub struct TradeExtractor {
    base: AssetId,
    tracked: HashSet<AssetId>,
    window: AggregationWindow,
    stats: ScanStats,
}

impl TradeExtractor {
    pub fn new(
        base: AssetId,
        tracked: impl IntoIterator<Item = AssetId>,
        window: AggregationWindow,
    ) -> Self {
        Self {
            base,
            tracked: tracked.into_iter().filter(|a| *a != base).collect(),
            window,
            stats: ScanStats::default(),
        }
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Trade events contained in one transaction result
    pub fn extract(&mut self, record: &TxResultRecord) -> Vec<TradeEvent> {
        self.stats.records += 1;

        if !self.window.contains(record.close_time) {
            self.stats.out_of_window += 1;
            debug!(
                ledger = record.ledger,
                close_time = record.close_time,
                "Dropping tx result outside window"
            );
            return Vec::new();
        }

        let outcome = match TransactionOutcome::from_xdr_base64(&record.tx_result) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.stats.malformed_records += 1;
                warn!(
                    ledger = record.ledger,
                    error = %e,
                    skipped = self.stats.malformed_records,
                    "Skipping malformed tx result"
                );
                return Vec::new();
            }
        };

        if !outcome.successful {
            self.stats.failed_transactions += 1;
            debug!(
                ledger = record.ledger,
                tx = %hex::encode(outcome.tx_hash),
                fee_bump = outcome.fee_bump,
                "Skipping failed transaction"
            );
            return Vec::new();
        }

        let events: Vec<TradeEvent> = outcome
            .claims
            .iter()
            .filter_map(|claim| self.normalize(claim, record.close_time))
            .collect();
        if !events.is_empty() {
            debug!(
                ledger = record.ledger,
                tx = %hex::encode(outcome.tx_hash),
                trades = events.len(),
                "Extracted trades"
            );
        }
        self.stats.trades += events.len() as u64;
        events
    }

    fn normalize(&self, claim: &ClaimedOffer, timestamp: u64) -> Option<TradeEvent> {
        if claim.amount_sold <= 0 || claim.amount_bought <= 0 {
            return None;
        }
        // Maker sold the tracked asset for base
        if claim.asset_bought == self.base && self.tracked.contains(&claim.asset_sold) {
            return Some(TradeEvent {
                asset: claim.asset_sold,
                counter_asset: self.base,
                base_amount: claim.amount_bought,
                asset_amount: claim.amount_sold,
                timestamp,
            });
        }
        // Maker sold base for the tracked asset
        if claim.asset_sold == self.base && self.tracked.contains(&claim.asset_bought) {
            return Some(TradeEvent {
                asset: claim.asset_bought,
                counter_asset: self.base,
                base_amount: claim.amount_sold,
                asset_amount: claim.amount_bought,
                timestamp,
            });
        }
        None
    }

    /// Lazily map a result stream to trade events
    ///
    /// Pulls one record at a time; store errors pass through so the caller can
    /// abort the scan.
    pub fn trade_events<'a, S>(
        &'a mut self,
        results: S,
    ) -> impl Stream<Item = Result<TradeEvent, StoreError>> + 'a
    where
        S: Stream<Item = Result<TxResultRecord, StoreError>> + 'a,
    {
        results.flat_map(move |item| {
            let batch: Vec<Result<TradeEvent, StoreError>> = match item {
                Ok(record) => self.extract(&record).into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(batch)
        })
    }
}
