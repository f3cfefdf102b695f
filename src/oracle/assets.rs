//! Asset resolution - caller descriptors to canonical asset ids

use crate::error::{OracleError, Result};
use crate::types::{AccountId, AssetDescriptor, AssetId, NATIVE_ASSET_CODE};

const MAX_CODE_LEN: usize = 12;

/// Resolve a descriptor into the ledger's wire identifier
pub fn resolve_asset(descriptor: &AssetDescriptor) -> Result<AssetId> {
    match descriptor {
        AssetDescriptor::Stellar { code } => parse_asset_code(code),
    }
}

/// Resolve a list, dropping repeats while keeping first-seen order
pub fn resolve_assets(descriptors: &[AssetDescriptor]) -> Result<Vec<AssetId>> {
    let mut resolved: Vec<AssetId> = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let asset = resolve_asset(descriptor)?;
        if !resolved.contains(&asset) {
            resolved.push(asset);
        }
    }
    Ok(resolved)
}

/// Parse the canonical `XLM` / `CODE:ISSUER` form
pub fn parse_asset_code(code: &str) -> Result<AssetId> {
    if code.is_empty() {
        return Err(invalid("asset code is required"));
    }
    let mut parts = code.split(':');
    let asset_code = parts.next().unwrap_or_default();
    let issuer = parts.next();
    if parts.next().is_some() {
        return Err(invalid(format!("{}: too many ':' separators", code)));
    }

    match issuer {
        None if asset_code == NATIVE_ASSET_CODE => Ok(AssetId::Native),
        None => Err(invalid(format!("{}: missing issuer", code))),
        Some(_) if asset_code == NATIVE_ASSET_CODE => {
            Err(invalid(format!("{}: native asset cannot have an issuer", code)))
        }
        Some(issuer) => {
            if asset_code.is_empty()
                || asset_code.len() > MAX_CODE_LEN
                || !asset_code.bytes().all(|b| b.is_ascii_alphanumeric())
            {
                return Err(invalid(format!(
                    "{}: code must be 1-{} alphanumeric characters",
                    code, MAX_CODE_LEN
                )));
            }
            let issuer = AccountId::from_strkey(issuer)
                .map_err(|e| invalid(format!("{}: bad issuer ({})", code, e)))?;
            Ok(AssetId::credit(asset_code, issuer.0))
        }
    }
}

fn invalid(msg: impl Into<String>) -> OracleError {
    OracleError::InvalidAssetDescriptor(msg.into())
}
