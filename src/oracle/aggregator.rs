//! Price Aggregator - Volume-weighted prices from DEX trades
//!
//! Accumulates trades per tracked asset in constant memory and merges the
//! resulting prices with the previously published price table.

use std::collections::HashMap;
use tracing::debug;

use crate::error::{OracleError, Result};
use crate::types::{AssetId, FixedPrice, MergedPrices, PriceTable, TradeEvent};

/// Highest supported price precision
pub const MAX_DECIMALS: u32 = 18;

/// Running volume-weighted sums for one asset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeAccumulator {
    /// Σ price × amount, i.e. total base asset exchanged
    pub sum_price_volume: i128,
    /// Σ amount of the tracked asset exchanged
    pub sum_volume: i128,
    pub trades: u64,
}

impl VolumeAccumulator {
    fn add(&mut self, base_amount: i64, asset_amount: i64) {
        self.sum_price_volume += base_amount as i128;
        self.sum_volume += asset_amount as i128;
        self.trades += 1;
    }

    fn combine(&mut self, other: &VolumeAccumulator) {
        self.sum_price_volume += other.sum_price_volume;
        self.sum_volume += other.sum_volume;
        self.trades += other.trades;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Accumulating,
    /// Prices were produced; no further input accepted
    Merged,
}

/// Per-request trade aggregator
pub struct PriceAggregator {
    accumulators: HashMap<AssetId, VolumeAccumulator>,
    state: AggregatorState,
}

impl PriceAggregator {
    pub fn new(tracked: impl IntoIterator<Item = AssetId>) -> Self {
        Self {
            accumulators: tracked
                .into_iter()
                .map(|asset| (asset, VolumeAccumulator::default()))
                .collect(),
            state: AggregatorState::Accumulating,
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn accumulator(&self, asset: &AssetId) -> Option<&VolumeAccumulator> {
        self.accumulators.get(asset)
    }

    fn ensure_accumulating(&self) -> Result<()> {
        match self.state {
            AggregatorState::Accumulating => Ok(()),
            AggregatorState::Merged => Err(OracleError::AggregatorClosed),
        }
    }

    /// Add one trade to its asset's running sums
    pub fn process_trade(&mut self, event: &TradeEvent) -> Result<()> {
        self.ensure_accumulating()?;
        if event.base_amount <= 0 || event.asset_amount <= 0 {
            debug!(asset = %event.asset, "Ignoring trade without volume");
            return Ok(());
        }
        match self.accumulators.get_mut(&event.asset) {
            Some(acc) => acc.add(event.base_amount, event.asset_amount),
            None => debug!(asset = %event.asset, "Ignoring trade for untracked asset"),
        }
        Ok(())
    }

    /// Fold another worker's sums into this one
    pub fn merge(&mut self, other: PriceAggregator) -> Result<()> {
        self.ensure_accumulating()?;
        other.ensure_accumulating()?;
        for (asset, acc) in other.accumulators {
            self.accumulators.entry(asset).or_default().combine(&acc);
        }
        Ok(())
    }

    /// Produce the merged price table at `decimals` precision
    ///
    /// Assets with volume get `round_half_up(Σ price×amount / Σ amount)`.
    /// Everything else in `previous` is carried over as stored. A tracked
    /// asset with neither volume nor a previous price is present as `None`.
    /// Closes the aggregator.
    pub fn aggregate_prices(&mut self, previous: &PriceTable, decimals: u32) -> Result<MergedPrices> {
        self.ensure_accumulating()?;
        if decimals > MAX_DECIMALS {
            return Err(OracleError::InvalidDecimals {
                requested: decimals,
                max: MAX_DECIMALS,
            });
        }
        self.state = AggregatorState::Merged;

        let mut prices: MergedPrices = previous
            .iter()
            .map(|(asset, price)| (*asset, Some(*price)))
            .collect();

        for (asset, acc) in &self.accumulators {
            if acc.sum_volume > 0 {
                let price = FixedPrice::from_ratio(acc.sum_price_volume, acc.sum_volume, decimals)
                    .ok_or_else(|| OracleError::PriceOverflow {
                        asset: asset.to_string(),
                        decimals,
                    })?;
                debug!(
                    asset = %asset,
                    trades = acc.trades,
                    price = %price,
                    "Aggregated price"
                );
                prices.insert(*asset, Some(price));
            } else if prices.contains_key(asset) {
                debug!(asset = %asset, "No trades in window, keeping previous price");
            } else {
                debug!(asset = %asset, "No trades and no previous price");
                prices.insert(*asset, None);
            }
        }
        Ok(prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn asset(code: &str) -> AssetId {
        AssetId::credit(code, [1u8; 32])
    }

    /// Trade at `price` (base per unit) for `amount` units, both in whole units
    fn make_trade(asset: AssetId, price_x10: i64, amount: i64) -> TradeEvent {
        TradeEvent {
            asset,
            counter_asset: AssetId::Native,
            base_amount: price_x10 * amount / 10,
            asset_amount: amount,
            timestamp: 1000,
        }
    }

    #[test]
    fn test_weighted_price() {
        let a = asset("AAA");
        let mut aggregator = PriceAggregator::new([a]);
        aggregator.process_trade(&make_trade(a, 20, 10)).unwrap();
        aggregator.process_trade(&make_trade(a, 30, 5)).unwrap();

        let prices = aggregator.aggregate_prices(&PriceTable::new(), 2).unwrap();
        assert_eq!(prices[&a].and_then(|p| p.to_decimal()), Some(dec!(2.33)));
    }

    #[test]
    fn test_zero_volume_keeps_previous() {
        let c = asset("CCC");
        let mut aggregator = PriceAggregator::new([c]);
        let previous = PriceTable::from([(c, FixedPrice::new(150, 2))]);

        let prices = aggregator.aggregate_prices(&previous, 2).unwrap();
        assert_eq!(prices[&c], Some(FixedPrice::new(150, 2)));
        assert!(prices[&c].is_some_and(|p| !p.is_zero()));
    }

    #[test]
    fn test_untracked_previous_survives() {
        let a = asset("AAA");
        let old = asset("OLD");
        let mut aggregator = PriceAggregator::new([a]);
        aggregator.process_trade(&make_trade(a, 20, 10)).unwrap();
        let previous = PriceTable::from([(old, FixedPrice::new(42, 2))]);

        let prices = aggregator.aggregate_prices(&previous, 2).unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[&old], Some(FixedPrice::new(42, 2)));
    }

    #[test]
    fn test_previous_carried_as_stored() {
        let c = asset("CCC");
        let d = asset("DDD");
        let mut aggregator = PriceAggregator::new([c]);
        let previous = PriceTable::from([
            (c, FixedPrice::new(150, 2)),
            (d, FixedPrice::new(123_456, 5)),
        ]);

        let prices = aggregator.aggregate_prices(&previous, 4).unwrap();
        assert_eq!(prices[&c], Some(FixedPrice::new(150, 2)));
        assert_eq!(prices[&d], Some(FixedPrice::new(123_456, 5)));
    }

    #[test]
    fn test_quiet_tracked_asset_is_null() {
        let a = asset("AAA");
        let b = asset("BBB");
        let mut aggregator = PriceAggregator::new([a, b]);
        aggregator.process_trade(&make_trade(a, 20, 10)).unwrap();

        let prices = aggregator.aggregate_prices(&PriceTable::new(), 2).unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[&a], Some(FixedPrice::new(200, 2)));
        assert_eq!(prices[&b], None);

        let json = serde_json::to_value(&prices).unwrap();
        assert_eq!(json[b.to_string()], serde_json::Value::Null);
        assert_eq!(json[a.to_string()], "2.00");
    }

    #[test]
    fn test_closed_after_merge() {
        let a = asset("AAA");
        let mut aggregator = PriceAggregator::new([a]);
        aggregator.aggregate_prices(&PriceTable::new(), 2).unwrap();
        assert_eq!(aggregator.state(), AggregatorState::Merged);

        assert_eq!(
            aggregator.process_trade(&make_trade(a, 20, 10)),
            Err(OracleError::AggregatorClosed)
        );
        assert_eq!(
            aggregator.aggregate_prices(&PriceTable::new(), 2),
            Err(OracleError::AggregatorClosed)
        );
    }

    #[test]
    fn test_invalid_decimals_keeps_accumulating() {
        let mut aggregator = PriceAggregator::new([asset("AAA")]);
        assert!(matches!(
            aggregator.aggregate_prices(&PriceTable::new(), MAX_DECIMALS + 1),
            Err(OracleError::InvalidDecimals { .. })
        ));
        assert_eq!(aggregator.state(), AggregatorState::Accumulating);
    }

    #[test]
    fn test_order_independent() {
        let a = asset("AAA");
        let trades = vec![
            make_trade(a, 20, 10),
            make_trade(a, 30, 5),
            make_trade(a, 25, 7),
            make_trade(a, 11, 3),
        ];

        let mut forward = PriceAggregator::new([a]);
        for t in &trades {
            forward.process_trade(t).unwrap();
        }
        let mut backward = PriceAggregator::new([a]);
        for t in trades.iter().rev() {
            backward.process_trade(t).unwrap();
        }

        let previous = PriceTable::new();
        assert_eq!(
            forward.aggregate_prices(&previous, 7).unwrap(),
            backward.aggregate_prices(&previous, 7).unwrap()
        );
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let a = asset("AAA");
        let trades = [make_trade(a, 20, 10), make_trade(a, 30, 5), make_trade(a, 25, 7)];

        let mut single = PriceAggregator::new([a]);
        for t in &trades {
            single.process_trade(t).unwrap();
        }

        let mut left = PriceAggregator::new([a]);
        left.process_trade(&trades[0]).unwrap();
        let mut right = PriceAggregator::new([a]);
        right.process_trade(&trades[1]).unwrap();
        right.process_trade(&trades[2]).unwrap();
        left.merge(right).unwrap();

        assert_eq!(left.accumulator(&a), single.accumulator(&a));
        assert_eq!(left.accumulator(&a).unwrap().trades, 3);
    }

    #[test]
    fn test_untracked_trade_ignored() {
        let a = asset("AAA");
        let mut aggregator = PriceAggregator::new([a]);
        aggregator.process_trade(&make_trade(asset("BBB"), 20, 10)).unwrap();
        assert_eq!(aggregator.accumulator(&a).unwrap().trades, 0);
        let prices = aggregator.aggregate_prices(&PriceTable::new(), 2).unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[&a], None);
    }
}
