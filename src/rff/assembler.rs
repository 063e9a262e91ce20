//! Per-chain deposit transactions for a signed request

use super::signer::{SignatureData, SignedRff};
use crate::chain::{AllowanceQuery, AllowanceReader, ChainFamily, ChainRegistry};
use crate::error::{FundingError, FundingResult};
use crate::events::{IVault, IERC20};
use crate::intent::{to_base_units, Intent, SourceAllocation};

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An EVM call ready for the wallet to sign and broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmTransaction {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// Ordered transactions for one source chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositCall {
    pub chain_id: u64,
    pub amount: U256,
    pub token_address: Address,
    /// Optional approval followed by the vault deposit
    pub tx: Vec<EvmTransaction>,
}

/// Turns a signed request into deposit calls
pub struct RffAssembler {
    registry: Arc<ChainRegistry>,
    allowances: Arc<dyn AllowanceReader>,
}

impl RffAssembler {
    pub fn new(registry: Arc<ChainRegistry>, allowances: Arc<dyn AllowanceReader>) -> Self {
        Self {
            registry,
            allowances,
        }
    }

    /// Build deposit calls for every source, in source order
    pub async fn assemble(
        &self,
        intent: &Intent,
        signed: &SignedRff,
    ) -> FundingResult<Vec<DepositCall>> {
        self.registry.chain(intent.destination.chain_id)?;

        let signature = evm_signature(&signed.signatures)?;

        let mut legs = Vec::with_capacity(intent.sources.len());
        let mut queries = Vec::new();
        for (index, source) in intent.sources.iter().enumerate() {
            let leg = self.resolve_leg(index, source, signed)?;
            if !leg.is_native() {
                queries.push(AllowanceQuery {
                    chain_id: source.chain_id,
                    token: leg.token,
                    holder: leg.holder,
                    spender: leg.vault,
                });
            }
            legs.push(leg);
        }

        let allowances = if queries.is_empty() {
            Default::default()
        } else {
            self.allowances.allowances(&queries).await?
        };

        let mut deposits = Vec::with_capacity(legs.len());
        for (index, leg) in legs.into_iter().enumerate() {
            let mut tx = Vec::with_capacity(2);

            if !leg.is_native() {
                let allowance = allowances
                    .get(&leg.chain_id)
                    .copied()
                    .ok_or(FundingError::MissingAllowance {
                        chain_id: leg.chain_id,
                    })?;

                if allowance < leg.amount {
                    debug!(
                        "Chain {}: allowance {} below {}, adding approval",
                        leg.chain_id, allowance, leg.amount
                    );
                    tx.push(EvmTransaction {
                        to: leg.token,
                        data: IERC20::approveCall {
                            spender: leg.vault,
                            amount: leg.amount,
                        }
                        .abi_encode()
                        .into(),
                        value: U256::ZERO,
                    });
                }
            }

            let deposit = IVault::depositCall {
                request: signed.request.clone(),
                signature: signature.signature.clone(),
                chainIndex: U256::from(index),
            };
            tx.push(EvmTransaction {
                to: leg.vault,
                data: deposit.abi_encode().into(),
                value: if leg.is_native() { leg.amount } else { U256::ZERO },
            });

            deposits.push(DepositCall {
                chain_id: leg.chain_id,
                amount: leg.amount,
                token_address: leg.token,
                tx,
            });
        }

        info!(
            "Assembled {} deposit calls for request {}",
            deposits.len(),
            signed.request_hash
        );

        Ok(deposits)
    }

    /// Resolve one source and check it against the request entry its deposit points at
    fn resolve_leg(
        &self,
        index: usize,
        source: &SourceAllocation,
        signed: &SignedRff,
    ) -> FundingResult<Leg> {
        let chain = self.registry.chain(source.chain_id)?;
        if chain.family != ChainFamily::Evm || source.chain_family != ChainFamily::Evm {
            return Err(FundingError::UnsupportedFamily {
                chain_id: source.chain_id,
                family: chain.family.to_string(),
            });
        }

        let vault = self.registry.vault_address(source.chain_id)?;
        let amount = to_base_units(source.amount, source.decimals)?;

        let codec = self.registry.codec(source.chain_id)?;
        let token_word = codec.to_universal(&source.token_contract)?;
        let holder_word = codec.to_universal(&source.holder_address)?;

        let mismatch = || FundingError::RequestMismatch {
            chain_id: source.chain_id,
            index,
        };
        let pair = signed.request.sources.get(index).ok_or_else(mismatch)?;
        if pair.universe != chain.family.universe()
            || pair.chainID != U256::from(source.chain_id)
            || pair.contractAddress != token_word
            || pair.value != amount
        {
            warn!(
                "Request source {} names {} of {} on chain {}, intent draws {} of {} on chain {}",
                index,
                pair.value,
                codec
                    .from_universal(&pair.contractAddress)
                    .unwrap_or_else(|_| pair.contractAddress.to_string()),
                pair.chainID,
                amount,
                source.token_contract,
                source.chain_id
            );
            return Err(mismatch());
        }

        Ok(Leg {
            chain_id: source.chain_id,
            token: Address::from_word(token_word),
            holder: Address::from_word(holder_word),
            vault,
            amount,
        })
    }
}

struct Leg {
    chain_id: u64,
    token: Address,
    holder: Address,
    vault: Address,
    amount: U256,
}

impl Leg {
    fn is_native(&self) -> bool {
        self.token == Address::ZERO
    }
}

/// Signature deposits are made with; every tag must be a known family
fn evm_signature(signatures: &[SignatureData]) -> FundingResult<&SignatureData> {
    let mut found = None;
    for data in signatures {
        match ChainFamily::from_universe(data.universe) {
            Some(ChainFamily::Evm) => found = found.or(Some(data)),
            Some(_) => {}
            None => return Err(FundingError::UnknownSignatureType(data.universe)),
        }
    }
    found.ok_or(FundingError::UnknownSignatureType(ChainFamily::Evm.universe()))
}
