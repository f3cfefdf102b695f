//! Ledger records - mapping ledger XDR onto the feed's domain types
//!
//! Transaction results and assets arrive as `stellar-xdr` values; the rest of
//! the crate only sees `AssetId` and `TransactionOutcome`.

use stellar_xdr::curr as xdr;
use stellar_xdr::curr::{Limits, ReadXdr, WriteXdr};

use crate::types::AssetId;

/// Nesting cap for values decoded from untrusted store rows
pub const MAX_XDR_DEPTH: u32 = 500;

/// Read limits applied to every ledger value the feed decodes
pub fn read_limits() -> Limits {
    Limits::depth(MAX_XDR_DEPTH)
}

pub(crate) fn account_key(account: &xdr::AccountId) -> [u8; 32] {
    let xdr::PublicKey::PublicKeyTypeEd25519(xdr::Uint256(key)) = &account.0;
    *key
}

pub(crate) fn xdr_account(key: [u8; 32]) -> xdr::AccountId {
    xdr::AccountId(xdr::PublicKey::PublicKeyTypeEd25519(xdr::Uint256(key)))
}

impl From<&xdr::Asset> for AssetId {
    fn from(asset: &xdr::Asset) -> Self {
        match asset {
            xdr::Asset::Native => AssetId::Native,
            xdr::Asset::CreditAlphanum4(a) => AssetId::CreditAlphanum4 {
                code: a.asset_code.0,
                issuer: account_key(&a.issuer),
            },
            xdr::Asset::CreditAlphanum12(a) => AssetId::CreditAlphanum12 {
                code: a.asset_code.0,
                issuer: account_key(&a.issuer),
            },
        }
    }
}

impl From<&AssetId> for xdr::Asset {
    fn from(asset: &AssetId) -> Self {
        match asset {
            AssetId::Native => xdr::Asset::Native,
            AssetId::CreditAlphanum4 { code, issuer } => xdr::Asset::CreditAlphanum4(xdr::AlphaNum4 {
                asset_code: xdr::AssetCode4(*code),
                issuer: xdr_account(*issuer),
            }),
            AssetId::CreditAlphanum12 { code, issuer } => {
                xdr::Asset::CreditAlphanum12(xdr::AlphaNum12 {
                    asset_code: xdr::AssetCode12(*code),
                    issuer: xdr_account(*issuer),
                })
            }
        }
    }
}

/// One offer (or pool) fill as seen from the maker's side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimedOffer {
    pub asset_sold: AssetId,
    pub amount_sold: i64,
    pub asset_bought: AssetId,
    pub amount_bought: i64,
}

impl ClaimedOffer {
    pub fn new(asset_sold: AssetId, amount_sold: i64, asset_bought: AssetId, amount_bought: i64) -> Self {
        Self {
            asset_sold,
            amount_sold,
            asset_bought,
            amount_bought,
        }
    }
}

impl From<&xdr::ClaimAtom> for ClaimedOffer {
    fn from(atom: &xdr::ClaimAtom) -> Self {
        let (sold, amount_sold, bought, amount_bought) = match atom {
            xdr::ClaimAtom::V0(c) => (&c.asset_sold, c.amount_sold, &c.asset_bought, c.amount_bought),
            xdr::ClaimAtom::OrderBook(c) => {
                (&c.asset_sold, c.amount_sold, &c.asset_bought, c.amount_bought)
            }
            xdr::ClaimAtom::LiquidityPool(c) => {
                (&c.asset_sold, c.amount_sold, &c.asset_bought, c.amount_bought)
            }
        };
        Self::new(sold.into(), amount_sold, bought.into(), amount_bought)
    }
}

impl From<&ClaimedOffer> for xdr::ClaimAtom {
    fn from(claim: &ClaimedOffer) -> Self {
        xdr::ClaimAtom::OrderBook(xdr::ClaimOfferAtom {
            seller_id: xdr_account([0u8; 32]),
            offer_id: 0,
            asset_sold: (&claim.asset_sold).into(),
            amount_sold: claim.amount_sold,
            asset_bought: (&claim.asset_bought).into(),
            amount_bought: claim.amount_bought,
        })
    }
}

/// Offers crossed by one operation; empty for anything that is not a trade
fn offers_claimed(op: &xdr::OperationResult) -> &[xdr::ClaimAtom] {
    use xdr::OperationResultTr as Tr;

    let xdr::OperationResult::OpInner(tr) = op else {
        return &[];
    };
    match tr {
        Tr::ManageSellOffer(xdr::ManageSellOfferResult::Success(s))
        | Tr::CreatePassiveSellOffer(xdr::ManageSellOfferResult::Success(s))
        | Tr::ManageBuyOffer(xdr::ManageBuyOfferResult::Success(s)) => s.offers_claimed.as_slice(),
        Tr::PathPaymentStrictReceive(xdr::PathPaymentStrictReceiveResult::Success(s)) => {
            s.offers.as_slice()
        }
        Tr::PathPaymentStrictSend(xdr::PathPaymentStrictSendResult::Success(s)) => s.offers.as_slice(),
        _ => &[],
    }
}

/// What the feed needs from a `TransactionResultPair`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    pub tx_hash: [u8; 32],
    pub fee_charged: i64,
    pub fee_bump: bool,
    /// Applied successfully; for a fee bump, the inner transaction too
    pub successful: bool,
    pub claims: Vec<ClaimedOffer>,
}

impl TransactionOutcome {
    /// Decode a base64 `TransactionResultPair`
    pub fn from_xdr_base64(raw: &str) -> Result<Self, xdr::Error> {
        let pair = xdr::TransactionResultPair::from_xdr_base64(raw.trim(), read_limits())?;
        Ok(Self::from(&pair))
    }

    /// Encode as a result pair with one manage-sell-offer operation carrying
    /// every claim. A fee bump wraps it in an inner result.
    pub fn to_xdr_base64(&self) -> Result<String, xdr::Error> {
        let offers_claimed: xdr::VecM<xdr::ClaimAtom> = self
            .claims
            .iter()
            .map(xdr::ClaimAtom::from)
            .collect::<Vec<_>>()
            .try_into()?;
        let op = xdr::OperationResult::OpInner(xdr::OperationResultTr::ManageSellOffer(
            xdr::ManageSellOfferResult::Success(xdr::ManageOfferSuccessResult {
                offers_claimed,
                offer: xdr::ManageOfferSuccessResultOffer::Deleted,
            }),
        ));
        let ops: xdr::VecM<xdr::OperationResult> = vec![op].try_into()?;

        let result = if self.fee_bump {
            let inner = xdr::InnerTransactionResultPair {
                transaction_hash: xdr::Hash(self.tx_hash),
                result: xdr::InnerTransactionResult {
                    fee_charged: self.fee_charged,
                    result: if self.successful {
                        xdr::InnerTransactionResultResult::TxSuccess(ops)
                    } else {
                        xdr::InnerTransactionResultResult::TxFailed(ops)
                    },
                    ext: xdr::InnerTransactionResultExt::V0,
                },
            };
            if self.successful {
                xdr::TransactionResultResult::TxFeeBumpInnerSuccess(inner)
            } else {
                xdr::TransactionResultResult::TxFeeBumpInnerFailed(inner)
            }
        } else if self.successful {
            xdr::TransactionResultResult::TxSuccess(ops)
        } else {
            xdr::TransactionResultResult::TxFailed(ops)
        };

        xdr::TransactionResultPair {
            transaction_hash: xdr::Hash(self.tx_hash),
            result: xdr::TransactionResult {
                fee_charged: self.fee_charged,
                result,
                ext: xdr::TransactionResultExt::V0,
            },
        }
        .to_xdr_base64(Limits::none())
    }
}

impl From<&xdr::TransactionResultPair> for TransactionOutcome {
    fn from(pair: &xdr::TransactionResultPair) -> Self {
        use xdr::InnerTransactionResultResult as Inner;
        use xdr::TransactionResultResult as Outer;

        let (fee_bump, successful, operations): (bool, bool, &[xdr::OperationResult]) =
            match &pair.result.result {
                Outer::TxSuccess(ops) => (false, true, ops.as_slice()),
                Outer::TxFailed(ops) => (false, false, ops.as_slice()),
                Outer::TxFeeBumpInnerSuccess(inner) | Outer::TxFeeBumpInnerFailed(inner) => {
                    let outer_ok = matches!(pair.result.result, Outer::TxFeeBumpInnerSuccess(_));
                    match &inner.result.result {
                        Inner::TxSuccess(ops) => (true, outer_ok, ops.as_slice()),
                        Inner::TxFailed(ops) => (true, false, ops.as_slice()),
                        _ => (true, false, &[][..]),
                    }
                }
                _ => (false, false, &[][..]),
            };

        Self {
            tx_hash: pair.transaction_hash.0,
            fee_charged: pair.result.fee_charged,
            fee_bump,
            successful,
            claims: operations
                .iter()
                .flat_map(offers_claimed)
                .map(ClaimedOffer::from)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> AssetId {
        AssetId::credit("USD", [5u8; 32])
    }

    fn success(op: xdr::OperationResultTr) -> xdr::TransactionResultPair {
        xdr::TransactionResultPair {
            transaction_hash: xdr::Hash([1u8; 32]),
            result: xdr::TransactionResult {
                fee_charged: 100,
                result: xdr::TransactionResultResult::TxSuccess(
                    vec![xdr::OperationResult::OpInner(op)].try_into().unwrap(),
                ),
                ext: xdr::TransactionResultExt::V0,
            },
        }
    }

    #[test]
    fn test_asset_conversion() {
        let long = AssetId::credit("YIELDUSDC", [9u8; 32]);
        for asset in [AssetId::Native, usd(), long] {
            let wire = xdr::Asset::from(&asset);
            assert_eq!(AssetId::from(&wire), asset);
        }
        assert!(matches!(xdr::Asset::from(&usd()), xdr::Asset::CreditAlphanum4(_)));
    }

    #[test]
    fn test_path_payment_and_pool_claims() {
        let pool_fill = xdr::ClaimAtom::LiquidityPool(xdr::ClaimLiquidityAtom {
            liquidity_pool_id: xdr::PoolId(xdr::Hash([4u8; 32])),
            asset_sold: xdr::Asset::from(&usd()),
            amount_sold: 10,
            asset_bought: xdr::Asset::Native,
            amount_bought: 25,
        });
        let pair = success(xdr::OperationResultTr::PathPaymentStrictSend(
            xdr::PathPaymentStrictSendResult::Success(xdr::PathPaymentStrictSendResultSuccess {
                offers: vec![pool_fill].try_into().unwrap(),
                last: xdr::SimplePaymentResult {
                    destination: xdr_account([2u8; 32]),
                    asset: xdr::Asset::Native,
                    amount: 25,
                },
            }),
        ));

        let outcome = TransactionOutcome::from(&pair);
        assert!(outcome.successful);
        assert!(!outcome.fee_bump);
        assert_eq!(outcome.claims, vec![ClaimedOffer::new(usd(), 10, AssetId::Native, 25)]);
    }

    #[test]
    fn test_non_trading_operation_has_no_claims() {
        let pair = success(xdr::OperationResultTr::BumpSequence(
            xdr::BumpSequenceResult::Success,
        ));
        let outcome = TransactionOutcome::from(&pair);
        assert!(outcome.successful);
        assert!(outcome.claims.is_empty());
    }

    #[test]
    fn test_fee_bump_inner_failure_is_unsuccessful() {
        let outcome = TransactionOutcome {
            tx_hash: [3u8; 32],
            fee_charged: 200,
            fee_bump: true,
            successful: false,
            claims: vec![ClaimedOffer::new(usd(), 10, AssetId::Native, 20)],
        };
        let raw = outcome.to_xdr_base64().unwrap();
        let pair = xdr::TransactionResultPair::from_xdr_base64(&raw, read_limits()).unwrap();
        assert!(matches!(
            pair.result.result,
            xdr::TransactionResultResult::TxFeeBumpInnerFailed(_)
        ));

        let decoded = TransactionOutcome::from_xdr_base64(&raw).unwrap();
        assert!(decoded.fee_bump);
        assert!(!decoded.successful);
        assert_eq!(decoded.claims.len(), 1);
    }

    #[test]
    fn test_truncated_result_rejected() {
        let raw = success(xdr::OperationResultTr::BumpSequence(
            xdr::BumpSequenceResult::Success,
        ))
        .to_xdr(Limits::none())
        .unwrap();
        let truncated = &raw[..raw.len() - 4];
        assert!(xdr::TransactionResultPair::from_xdr(truncated, read_limits()).is_err());
        assert!(TransactionOutcome::from_xdr_base64("AAAA").is_err());
        assert!(TransactionOutcome::from_xdr_base64("***").is_err());
    }
}
