//! Greedy, fee-aware allocation of source balances to a destination payment

use super::model::{
    checked_add, checked_sub, BridgeAsset, DestinationAllocation, EoaToEphemeralCall,
    FeeBreakdown, Intent, IntentPlan, SourceAllocation,
};
use crate::error::FundingResult;
use crate::fees::{FeeStore, FulfilmentFeeQuery, SolverFeeQuery};

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

/// Builds intents from balance snapshots
///
/// Assets are visited once, in the order given. Every solver fee quoted for a
/// leg is added to the amount still to be borrowed before that leg's draw is
/// decided, so later legs absorb fee growth but earlier legs are never revisited.
pub struct IntentBuilder<'a> {
    fee_store: &'a dyn FeeStore,
}

impl<'a> IntentBuilder<'a> {
    pub fn new(fee_store: &'a dyn FeeStore) -> Self {
        Self { fee_store }
    }

    /// Decide which chains to draw from, and how much
    ///
    /// Balances too large to sum or fee are rejected with `InvalidAmount`
    /// instead of wrapping.
    pub fn create_intent(
        &self,
        assets: &[BridgeAsset],
        destination: &DestinationAllocation,
    ) -> FundingResult<IntentPlan> {
        let mut fees = FeeBreakdown {
            gas_supplied: destination.gas,
            ..Default::default()
        };

        let mut borrow = destination.amount;

        let protocol_fee = self
            .fee_store
            .protocol_fee(borrow, destination.decimals)?;
        borrow = checked_add(borrow, protocol_fee)?;
        fees.protocol = protocol_fee;

        let fulfilment_fee = self.fee_store.fulfilment_fee(&FulfilmentFeeQuery {
            decimals: destination.decimals,
            destination_chain_id: destination.chain_id,
            destination_token: destination.token_contract.clone(),
        })?;
        borrow = checked_add(borrow, fulfilment_fee)?;
        fees.fulfilment = fulfilment_fee;

        let mut accounted = Decimal::ZERO;
        let mut sources = Vec::new();
        let mut eoa_to_ephemeral_calls = BTreeMap::new();

        for asset in assets {
            let balance = asset.total_balance()?;
            if asset.chain_id == destination.chain_id || balance <= Decimal::ZERO {
                continue;
            }
            if accounted >= borrow {
                break;
            }

            let unaccounted = checked_sub(borrow, accounted)?;
            let candidate = balance.min(unaccounted);

            let solver_fee = self.fee_store.solver_fee(&SolverFeeQuery {
                amount: candidate,
                source_chain_id: asset.chain_id,
                source_token: asset.contract_address.clone(),
                destination_chain_id: destination.chain_id,
                destination_token: destination.token_contract.clone(),
                decimals: destination.decimals,
            })?;
            borrow = checked_add(borrow, solver_fee)?;
            fees.solver = checked_add(fees.solver, solver_fee)?;

            let unaccounted = checked_sub(borrow, accounted)?;

            let draw = if balance <= unaccounted {
                if asset.eoa_balance > Decimal::ZERO {
                    eoa_to_ephemeral_calls.insert(
                        asset.chain_id,
                        top_up(asset, asset.eoa_balance),
                    );
                }
                balance
            } else {
                if unaccounted > asset.ephemeral_balance {
                    eoa_to_ephemeral_calls.insert(
                        asset.chain_id,
                        top_up(asset, checked_sub(unaccounted, asset.ephemeral_balance)?),
                    );
                }
                unaccounted
            };

            debug!(
                "Drawing {} from chain {} (solver fee {}, target {})",
                draw, asset.chain_id, solver_fee, borrow
            );

            sources.push(SourceAllocation {
                chain_id: asset.chain_id,
                token_contract: asset.contract_address.clone(),
                amount: draw,
                decimals: asset.decimals,
                holder_address: asset.holder_address.clone(),
                chain_family: asset.chain_family,
            });
            accounted = checked_add(accounted, draw)?;
        }

        let intent = Intent {
            sources,
            destination: destination.clone(),
            fees,
            is_available_balance_insufficient: accounted < borrow,
        };

        Ok(IntentPlan {
            intent,
            eoa_to_ephemeral_calls,
        })
    }
}

fn top_up(asset: &BridgeAsset, amount: Decimal) -> EoaToEphemeralCall {
    EoaToEphemeralCall {
        amount,
        decimals: asset.decimals,
        token_address: asset.contract_address.clone(),
    }
}
