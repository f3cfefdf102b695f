//! Core types used throughout the price feed
//!
//! Defines assets, fixed-point prices, trade events, snapshots and the
//! request/response shapes of the oracle facade.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::OracleError;

/// Ticker of the ledger's native currency
pub const NATIVE_ASSET_CODE: &str = "XLM";

/// Canonical wire identifier of a ledger asset
///
/// Mirrors the ledger `Asset` union. Values are produced by the asset resolver
/// or decoded from ledger records, never built from raw caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetId {
    Native,
    CreditAlphanum4 { code: [u8; 4], issuer: [u8; 32] },
    CreditAlphanum12 { code: [u8; 12], issuer: [u8; 32] },
}

impl AssetId {
    /// Build a credit asset from an already validated 1-12 character code
    pub(crate) fn credit(code: &str, issuer: [u8; 32]) -> Self {
        let bytes = code.as_bytes();
        if bytes.len() <= 4 {
            let mut padded = [0u8; 4];
            padded[..bytes.len()].copy_from_slice(bytes);
            AssetId::CreditAlphanum4 {
                code: padded,
                issuer,
            }
        } else {
            let mut padded = [0u8; 12];
            padded[..bytes.len()].copy_from_slice(bytes);
            AssetId::CreditAlphanum12 {
                code: padded,
                issuer,
            }
        }
    }

    /// Asset code without padding
    pub fn code(&self) -> String {
        let raw: &[u8] = match self {
            AssetId::Native => return NATIVE_ASSET_CODE.to_string(),
            AssetId::CreditAlphanum4 { code, .. } => code,
            AssetId::CreditAlphanum12 { code, .. } => code,
        };
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    /// Issuer as a `G…` strkey, `None` for the native asset
    pub fn issuer(&self) -> Option<String> {
        match self {
            AssetId::Native => None,
            AssetId::CreditAlphanum4 { issuer, .. } | AssetId::CreditAlphanum12 { issuer, .. } => {
                Some(stellar_strkey::ed25519::PublicKey(*issuer).to_string())
            }
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.issuer() {
            None => write!(f, "{}", NATIVE_ASSET_CODE),
            Some(issuer) => write!(f, "{}:{}", self.code(), issuer),
        }
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Caller-facing asset descriptor as it arrives over the wire (`{type, code}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAssetDescriptor {
    #[serde(rename = "type")]
    pub asset_type: u32,
    pub code: String,
}

/// Asset descriptor, one variant per supported asset classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAssetDescriptor", into = "RawAssetDescriptor")]
pub enum AssetDescriptor {
    /// Ledger-native asset: `XLM` or `CODE:ISSUER`
    Stellar { code: String },
}

impl AssetDescriptor {
    pub const STELLAR_TYPE: u32 = 1;

    pub fn stellar(code: impl Into<String>) -> Self {
        AssetDescriptor::Stellar { code: code.into() }
    }
}

impl TryFrom<RawAssetDescriptor> for AssetDescriptor {
    type Error = OracleError;

    fn try_from(raw: RawAssetDescriptor) -> Result<Self, Self::Error> {
        match raw.asset_type {
            Self::STELLAR_TYPE => Ok(AssetDescriptor::Stellar { code: raw.code }),
            other => Err(OracleError::UnsupportedAssetType(other)),
        }
    }
}

impl From<AssetDescriptor> for RawAssetDescriptor {
    fn from(descriptor: AssetDescriptor) -> Self {
        match descriptor {
            AssetDescriptor::Stellar { code } => RawAssetDescriptor {
                asset_type: AssetDescriptor::STELLAR_TYPE,
                code,
            },
        }
    }
}

/// `numerator / denominator` at `decimals` fractional digits, rounded half up
///
/// Exact long division; `None` on overflow or a non-positive denominator.
pub(crate) fn div_round_half_up(numerator: i128, denominator: i128, decimals: u32) -> Option<i128> {
    if denominator <= 0 || numerator < 0 {
        return None;
    }
    let mut quotient = numerator / denominator;
    let mut remainder = numerator % denominator;
    for _ in 0..decimals {
        remainder = remainder.checked_mul(10)?;
        quotient = quotient
            .checked_mul(10)?
            .checked_add(remainder / denominator)?;
        remainder %= denominator;
    }
    if remainder >= denominator - remainder {
        quotient = quotient.checked_add(1)?;
    }
    Some(quotient)
}

/// Fixed-point decimal price: `mantissa / 10^decimals`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedPrice {
    pub mantissa: i128,
    pub decimals: u32,
}

impl FixedPrice {
    pub fn new(mantissa: i128, decimals: u32) -> Self {
        Self { mantissa, decimals }
    }

    /// Price of `numerator / denominator`, rounded half up
    pub fn from_ratio(numerator: i128, denominator: i128, decimals: u32) -> Option<Self> {
        div_round_half_up(numerator, denominator, decimals).map(|m| Self::new(m, decimals))
    }

    /// Convert to `Decimal`; `None` past its 28-digit range
    pub fn to_decimal(&self) -> Option<Decimal> {
        Decimal::try_from_i128_with_scale(self.mantissa, self.decimals).ok()
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }
}

impl fmt::Display for FixedPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let decimals = self.decimals as usize;
        if decimals == 0 {
            return write!(f, "{}{}", sign, digits);
        }
        let padded = format!("{:0>width$}", digits, width = decimals + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
        write!(f, "{}{}.{}", sign, int_part, frac_part)
    }
}

impl Serialize for FixedPrice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Asset → price mapping; keys unique per asset
pub type PriceTable = BTreeMap<AssetId, FixedPrice>;

/// Merged output table: every tracked or previously priced asset, `None`
/// (serialized as `null`) when an asset has neither trades nor a prior price
pub type MergedPrices = BTreeMap<AssetId, Option<FixedPrice>>;

/// 32-byte contract hash (`C…` strkey)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractId(pub [u8; 32]);

impl ContractId {
    pub fn from_strkey(s: &str) -> Result<Self, OracleError> {
        stellar_strkey::Contract::from_string(s)
            .map(|contract| ContractId(contract.0))
            .map_err(|e| OracleError::InvalidAddress(format!("{}: {}", s, e)))
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", stellar_strkey::Contract(self.0))
    }
}

/// 32-byte ed25519 account key (`G…` strkey)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub fn from_strkey(s: &str) -> Result<Self, OracleError> {
        stellar_strkey::ed25519::PublicKey::from_string(s)
            .map(|key| AccountId(key.0))
            .map_err(|e| OracleError::InvalidAddress(format!("{}: {}", s, e)))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", stellar_strkey::ed25519::PublicKey(self.0))
    }
}

/// Decoded previous state of an oracle contract
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContractSnapshot {
    pub prices: PriceTable,
    pub admin: Option<String>,
    pub last_timestamp: u64,
    /// Precision the stored mantissas were written with, when recorded
    pub decimals: Option<u32>,
}

impl ContractSnapshot {
    /// State of a contract that has never been initialized
    pub fn uninitialized() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.admin.is_some() || self.last_timestamp != 0 || !self.prices.is_empty()
    }
}

/// A single trade of a tracked asset against the base asset
///
/// Price is the rational `base_amount / asset_amount` (base per unit of the
/// tracked asset); both amounts are in ledger stroops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeEvent {
    pub asset: AssetId,
    pub counter_asset: AssetId,
    pub base_amount: i64,
    pub asset_amount: i64,
    pub timestamp: u64,
}

/// Half-open interval `[from, from + period)` of ledger close time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationWindow {
    pub from: u64,
    pub period: u64,
}

impl AggregationWindow {
    pub fn new(from: u64, period: u64) -> Self {
        Self { from, period }
    }

    pub fn to(&self) -> u64 {
        self.from.saturating_add(self.period)
    }

    pub fn contains(&self, ts: u64) -> bool {
        ts >= self.from && ts < self.to()
    }
}

impl fmt::Display for AggregationWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to())
    }
}

/// Counters from one streaming pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub records: u64,
    pub failed_transactions: u64,
    pub malformed_records: u64,
    pub out_of_window: u64,
    pub trades: u64,
}

/// Parameters of one aggregation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeAggregationParams {
    /// Oracle contract (`C…` strkey)
    pub contract: String,
    pub base_asset: AssetDescriptor,
    pub assets: Vec<AssetDescriptor>,
    pub decimals: u32,
    pub from: u64,
    pub period: u64,
}

impl TradeAggregationParams {
    pub fn window(&self) -> AggregationWindow {
        AggregationWindow::new(self.from, self.period)
    }
}

/// Output of one aggregation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedTradeResult {
    pub prices: MergedPrices,
    pub admin: Option<String>,
    pub last_timestamp: u64,
    pub stats: ScanStats,
}

/// Weighted key allowed to sign for an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub address: String,
    pub weight: u32,
}

/// Account sequence, thresholds and signers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProps {
    pub sequence: i64,
    pub thresholds: Vec<u8>,
    pub signers: Option<Vec<Signer>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_div_round_half_up() {
        // 35 / 15 = 2.333..
        assert_eq!(div_round_half_up(35, 15, 2), Some(233));
        // 2.005 -> 2.01
        assert_eq!(div_round_half_up(401, 200, 2), Some(201));
        // 1 / 3 at 0 digits
        assert_eq!(div_round_half_up(1, 3, 0), Some(0));
        assert_eq!(div_round_half_up(2, 3, 0), Some(1));
        assert_eq!(div_round_half_up(1, 0, 2), None);
    }

    #[test]
    fn test_fixed_price_display() {
        assert_eq!(FixedPrice::new(233, 2).to_string(), "2.33");
        assert_eq!(FixedPrice::new(5, 3).to_string(), "0.005");
        assert_eq!(FixedPrice::new(-150, 2).to_string(), "-1.50");
        assert_eq!(FixedPrice::new(42, 0).to_string(), "42");
    }

    #[test]
    fn test_fixed_price_to_decimal() {
        assert_eq!(FixedPrice::new(233, 2).to_decimal(), Some(dec!(2.33)));
    }

    #[test]
    fn test_window_is_half_open() {
        let window = AggregationWindow::new(1000, 100);
        assert!(window.contains(1000));
        assert!(window.contains(1099));
        assert!(!window.contains(1100));
        assert!(!window.contains(999));
    }

    #[test]
    fn test_descriptor_from_json() {
        let descriptor: AssetDescriptor =
            serde_json::from_str(r#"{"type":1,"code":"XLM"}"#).unwrap();
        assert_eq!(descriptor, AssetDescriptor::stellar("XLM"));

        let err = serde_json::from_str::<AssetDescriptor>(r#"{"type":2,"code":"X"}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("unsupported asset type 2"), "{}", err);
    }

    #[test]
    fn test_asset_id_display() {
        let asset = AssetId::credit("USD", [0u8; 32]);
        assert_eq!(asset.code(), "USD");
        assert_eq!(
            asset.to_string(),
            "USD:GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF"
        );
        assert!(matches!(
            AssetId::credit("LONGCODE", [0u8; 32]),
            AssetId::CreditAlphanum12 { .. }
        ));
        assert_eq!(AssetId::Native.to_string(), "XLM");
    }
}
