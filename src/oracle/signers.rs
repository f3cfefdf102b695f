//! Account signer decoding
//!
//! Signers feed multisig threshold checks, so the list decodes completely or
//! not at all.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::io::Cursor;
use stellar_xdr::curr as xdr;
use stellar_xdr::curr::{Limited, Limits, ReadXdr, WriteXdr};

use crate::error::{OracleError, Result};
use crate::ledger::read_limits;
use crate::types::Signer;

/// Ledger limit on additional signers per account
pub const MAX_SIGNERS: u32 = 20;
const MAX_SIGNER_WEIGHT: u32 = 255;

fn malformed(index: usize, reason: impl ToString) -> OracleError {
    OracleError::MalformedSignerEntry {
        index,
        reason: reason.to_string(),
    }
}

/// Decode a base64 XDR `Signer<20>` list
///
/// A failure names the first entry that could not be decoded.
pub fn decode_signers(raw: &str) -> Result<Vec<Signer>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let bytes = BASE64.decode(raw).map_err(|e| malformed(0, e))?;
    let len = bytes.len() as u64;
    let mut r = Limited::new(Cursor::new(bytes), read_limits());

    let count = u32::read_xdr(&mut r).map_err(|e| malformed(0, e))?;
    if count > MAX_SIGNERS {
        return Err(malformed(
            0,
            format!("{} signers exceed the limit of {}", count, MAX_SIGNERS),
        ));
    }

    let mut signers = Vec::with_capacity(count as usize);
    for index in 0..count as usize {
        let signer = xdr::Signer::read_xdr(&mut r).map_err(|e| malformed(index, e))?;
        if signer.weight > MAX_SIGNER_WEIGHT {
            return Err(malformed(
                index,
                format!("weight {} exceeds {}", signer.weight, MAX_SIGNER_WEIGHT),
            ));
        }
        signers.push(Signer {
            address: signer.key.to_string(),
            weight: signer.weight,
        });
    }

    let consumed = r.inner.position();
    if consumed != len {
        return Err(malformed(
            signers.len(),
            format!("{} trailing bytes", len - consumed),
        ));
    }
    Ok(signers)
}

/// Encode signers the way the account store keeps them
pub fn encode_signers(signers: &[xdr::Signer]) -> std::result::Result<String, xdr::Error> {
    let list: xdr::VecM<xdr::Signer, MAX_SIGNERS> = signers.to_vec().try_into()?;
    list.to_xdr_base64(Limits::none())
}
