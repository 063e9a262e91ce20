//! Intent data model

use crate::chain::ChainFamily;
use crate::error::{FundingError, FundingResult};

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Caller-supplied balance snapshot for one source chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeAsset {
    pub chain_id: u64,
    pub contract_address: String,
    pub decimals: u32,
    pub eoa_balance: Decimal,
    pub ephemeral_balance: Decimal,
    /// Account the allocation is drawn from
    pub holder_address: String,
    pub chain_family: ChainFamily,
}

impl BridgeAsset {
    pub fn total_balance(&self) -> FundingResult<Decimal> {
        checked_add(self.eoa_balance, self.ephemeral_balance)
    }
}

/// What the requester wants delivered on the destination chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationAllocation {
    pub chain_id: u64,
    pub token_contract: String,
    pub amount: Decimal,
    pub decimals: u32,
    /// Native gas requested alongside the token amount
    pub gas: Decimal,
}

/// Amount drawn from one source chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAllocation {
    pub chain_id: u64,
    pub token_contract: String,
    pub amount: Decimal,
    pub decimals: u32,
    pub holder_address: String,
    pub chain_family: ChainFamily,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub protocol: Decimal,
    pub fulfilment: Decimal,
    pub solver: Decimal,
    pub ca_gas: Decimal,
    pub gas_supplied: Decimal,
    pub collection: Decimal,
}

impl FeeBreakdown {
    /// Fees that are added on top of the destination amount
    pub fn borrowed(&self) -> Decimal {
        self.protocol + self.fulfilment + self.solver
    }
}

/// Resolved description of how a destination payment is funded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub sources: Vec<SourceAllocation>,
    pub destination: DestinationAllocation,
    pub fees: FeeBreakdown,
    pub is_available_balance_insufficient: bool,
}

impl Intent {
    /// Sum of all source allocations
    pub fn total_sourced(&self) -> Decimal {
        self.sources.iter().map(|s| s.amount).sum()
    }

    /// Destination amount plus every borrowed fee
    pub fn total_required(&self) -> Decimal {
        self.destination.amount + self.fees.borrowed()
    }
}

/// Top-up moving EOA funds into the ephemeral account for one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EoaToEphemeralCall {
    pub amount: Decimal,
    pub decimals: u32,
    pub token_address: String,
}

/// Output of intent construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentPlan {
    pub intent: Intent,
    pub eoa_to_ephemeral_calls: BTreeMap<u64, EoaToEphemeralCall>,
}

impl IntentPlan {
    /// Fail with `InsufficientBalance` if the sources cannot cover the intent
    pub fn require_sufficient(self) -> FundingResult<Self> {
        if self.intent.is_available_balance_insufficient {
            return Err(FundingError::InsufficientBalance {
                required: self.intent.total_required(),
                available: self.intent.total_sourced(),
            });
        }
        Ok(self)
    }
}

pub(crate) fn checked_add(a: Decimal, b: Decimal) -> FundingResult<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| FundingError::InvalidAmount(format!("{} + {} overflows", a, b)))
}

pub(crate) fn checked_sub(a: Decimal, b: Decimal) -> FundingResult<Decimal> {
    a.checked_sub(b)
        .ok_or_else(|| FundingError::InvalidAmount(format!("{} - {} overflows", a, b)))
}

/// Convert a token amount to integer base units without losing precision
pub fn to_base_units(amount: Decimal, decimals: u32) -> FundingResult<U256> {
    if amount.is_sign_negative() {
        return Err(FundingError::AmountConversion(format!(
            "negative amount {}",
            amount
        )));
    }

    let normalized = amount.normalize();
    if normalized.scale() > decimals {
        return Err(FundingError::AmountConversion(format!(
            "{} has more than {} decimals",
            amount, decimals
        )));
    }

    // Non-negative, so the mantissa fits in u128
    let mantissa = U256::from(normalized.mantissa().unsigned_abs());
    U256::from(10u8)
        .checked_pow(U256::from(decimals - normalized.scale()))
        .and_then(|factor| mantissa.checked_mul(factor))
        .ok_or_else(|| {
            FundingError::AmountConversion(format!(
                "{} with {} decimals exceeds 256 bits",
                amount, decimals
            ))
        })
}
