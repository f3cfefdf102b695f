//! Contract state decoding - previous prices, admin and last timestamp
//!
//! The oracle contract keeps its state in instance storage, a map keyed by
//! symbols:
//!
//! | key              | value                                    |
//! |------------------|------------------------------------------|
//! | `admin`          | address                                  |
//! | `last_timestamp` | u64 / timepoint                          |
//! | `prices`         | map of canonical asset string → i128     |
//! | `decimals`       | u32, precision of the stored mantissas   |
//!
//! Other keys are ignored. A missing entry, or an instance without storage,
//! is a contract that was never initialized.

use std::collections::{BTreeMap, HashSet};

use stellar_xdr::curr as xdr;
use stellar_xdr::curr::{Limits, ReadXdr, ScVal, WriteXdr};

use super::assets::parse_asset_code;
use crate::error::{OracleError, Result};
use crate::ledger::read_limits;
use crate::types::{AssetId, ContractId, ContractSnapshot, FixedPrice, PriceTable};

pub const ADMIN_KEY: &str = "admin";
pub const LAST_TIMESTAMP_KEY: &str = "last_timestamp";
pub const PRICES_KEY: &str = "prices";
pub const DECIMALS_KEY: &str = "decimals";

/// Decode a base64 contract instance `LedgerEntry`
///
/// Mantissas are read at the precision the contract recorded, or at
/// `default_decimals` when it did not record one.
pub fn decode_contract_state(raw: Option<&str>, default_decimals: u32) -> Result<ContractSnapshot> {
    let Some(raw) = raw else {
        return Ok(ContractSnapshot::uninitialized());
    };
    let entry = xdr::LedgerEntry::from_xdr_base64(raw.trim(), read_limits())
        .map_err(OracleError::malformed_state)?;
    let data = match entry.data {
        xdr::LedgerEntryData::ContractData(data) => data,
        other => {
            return Err(OracleError::malformed_state(format!(
                "expected contract data entry, found {}",
                other.name()
            )))
        }
    };
    if data.key != ScVal::LedgerKeyContractInstance {
        return Err(OracleError::malformed_state(format!(
            "expected instance key, found {}",
            data.key.name()
        )));
    }
    let instance = match data.val {
        ScVal::ContractInstance(instance) => instance,
        other => {
            return Err(OracleError::malformed_state(format!(
                "expected contract instance, found {}",
                other.name()
            )))
        }
    };
    let Some(storage) = instance.storage else {
        return Ok(ContractSnapshot::uninitialized());
    };

    let mut snapshot = ContractSnapshot::uninitialized();
    let mut mantissas: BTreeMap<AssetId, i128> = BTreeMap::new();
    let mut seen: HashSet<String> = HashSet::new();

    for xdr::ScMapEntry { key, val } in storage.iter() {
        let ScVal::Symbol(symbol) = key else {
            continue;
        };
        let name = symbol.to_utf8_string_lossy();
        if !seen.insert(name.clone()) {
            return Err(OracleError::malformed_state(format!("duplicate key {}", name)));
        }
        match name.as_str() {
            ADMIN_KEY => snapshot.admin = decode_admin(val)?,
            LAST_TIMESTAMP_KEY => snapshot.last_timestamp = decode_timestamp(val)?,
            DECIMALS_KEY => snapshot.decimals = Some(decode_decimals(val)?),
            PRICES_KEY => mantissas = decode_prices(val)?,
            _ => {}
        }
    }

    let decimals = snapshot.decimals.unwrap_or(default_decimals);
    snapshot.prices = mantissas
        .into_iter()
        .map(|(asset, mantissa)| (asset, FixedPrice::new(mantissa, decimals)))
        .collect::<PriceTable>();
    Ok(snapshot)
}

fn decode_admin(val: &ScVal) -> Result<Option<String>> {
    match val {
        ScVal::Address(addr) => Ok(Some(addr.to_string())),
        ScVal::Void => Ok(None),
        other => Err(type_mismatch(ADMIN_KEY, "address", other)),
    }
}

fn decode_timestamp(val: &ScVal) -> Result<u64> {
    match val {
        ScVal::U64(ts) | ScVal::Timepoint(xdr::TimePoint(ts)) => Ok(*ts),
        other => Err(type_mismatch(LAST_TIMESTAMP_KEY, "u64", other)),
    }
}

fn decode_decimals(val: &ScVal) -> Result<u32> {
    match val {
        ScVal::U32(decimals) => Ok(*decimals),
        other => Err(type_mismatch(DECIMALS_KEY, "u32", other)),
    }
}

fn decode_prices(val: &ScVal) -> Result<BTreeMap<AssetId, i128>> {
    let entries: &[xdr::ScMapEntry] = match val {
        ScVal::Map(Some(map)) => map.as_slice(),
        ScVal::Map(None) => &[],
        other => return Err(type_mismatch(PRICES_KEY, "map", other)),
    };
    let mut prices = BTreeMap::new();
    for xdr::ScMapEntry { key, val } in entries {
        let asset = match key {
            ScVal::String(code) => {
                let code = code.to_utf8_string().map_err(|e| {
                    OracleError::malformed_state(format!("price key: {}", e))
                })?;
                parse_asset_code(&code).map_err(|e| {
                    OracleError::malformed_state(format!("price key {:?}: {}", code, e))
                })?
            }
            other => return Err(type_mismatch("prices key", "string", other)),
        };
        let mantissa = match val {
            ScVal::I128(parts) => i128::from(parts),
            other => return Err(type_mismatch("prices value", "i128", other)),
        };
        if prices.insert(asset, mantissa).is_some() {
            return Err(OracleError::malformed_state(format!("duplicate price for {}", asset)));
        }
    }
    Ok(prices)
}

fn type_mismatch(field: &str, expected: &str, found: &ScVal) -> OracleError {
    OracleError::malformed_state(format!(
        "{}: expected {}, found {}",
        field,
        expected,
        found.name()
    ))
}

fn symbol(name: &str) -> std::result::Result<ScVal, xdr::Error> {
    Ok(ScVal::Symbol(xdr::ScSymbol(name.try_into()?)))
}

/// Encode a snapshot as the contract's instance entry, in the layout
/// [`decode_contract_state`] reads. Used to author store fixtures.
pub fn encode_contract_state(
    contract: &ContractId,
    snapshot: &ContractSnapshot,
) -> std::result::Result<String, xdr::Error> {
    let mut prices = Vec::with_capacity(snapshot.prices.len());
    for (asset, price) in &snapshot.prices {
        prices.push(xdr::ScMapEntry {
            key: ScVal::String(xdr::ScString(asset.to_string().as_str().try_into()?)),
            val: ScVal::from(price.mantissa),
        });
    }

    let admin = match &snapshot.admin {
        Some(admin) => ScVal::Address(admin.parse()?),
        None => ScVal::Void,
    };
    let mut storage = vec![
        xdr::ScMapEntry {
            key: symbol(ADMIN_KEY)?,
            val: admin,
        },
        xdr::ScMapEntry {
            key: symbol(LAST_TIMESTAMP_KEY)?,
            val: ScVal::U64(snapshot.last_timestamp),
        },
        xdr::ScMapEntry {
            key: symbol(PRICES_KEY)?,
            val: ScVal::Map(Some(xdr::ScMap(prices.try_into()?))),
        },
    ];
    if let Some(decimals) = snapshot.decimals {
        storage.push(xdr::ScMapEntry {
            key: symbol(DECIMALS_KEY)?,
            val: ScVal::U32(decimals),
        });
    }

    instance_entry(contract, Some(xdr::ScMap(storage.try_into()?)))
}

pub(crate) fn instance_entry(
    contract: &ContractId,
    storage: Option<xdr::ScMap>,
) -> std::result::Result<String, xdr::Error> {
    xdr::LedgerEntry {
        last_modified_ledger_seq: 0,
        data: xdr::LedgerEntryData::ContractData(xdr::ContractDataEntry {
            ext: xdr::ExtensionPoint::V0,
            contract: xdr::ScAddress::Contract(xdr::Hash(contract.0)),
            key: ScVal::LedgerKeyContractInstance,
            durability: xdr::ContractDataDurability::Persistent,
            val: ScVal::ContractInstance(xdr::ScContractInstance {
                executable: xdr::ContractExecutable::StellarAsset,
                storage,
            }),
        }),
        ext: xdr::LedgerEntryExt::V0,
    }
    .to_xdr_base64(Limits::none())
}
