//! Fee quotes for protocol, fulfilment and solver fees
//!
//! Fees are plain functions of their inputs so intent construction stays
//! deterministic. All amounts are token units, not base units.

use crate::config::FeeScheduleConfig;
use crate::error::{FundingError, FundingResult};

use rust_decimal::prelude::*;
use std::collections::HashMap;

/// Inputs for the destination fulfilment fee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfilmentFeeQuery {
    pub decimals: u32,
    pub destination_chain_id: u64,
    pub destination_token: String,
}

/// Inputs for the solver fee on one source leg
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverFeeQuery {
    pub amount: Decimal,
    pub source_chain_id: u64,
    pub source_token: String,
    pub destination_chain_id: u64,
    pub destination_token: String,
    pub decimals: u32,
}

/// Supplies fee quotes to the intent builder
///
/// A quote that cannot be represented is `InvalidAmount`.
pub trait FeeStore: Send + Sync {
    fn protocol_fee(&self, amount: Decimal, decimals: u32) -> FundingResult<Decimal>;

    fn fulfilment_fee(&self, query: &FulfilmentFeeQuery) -> FundingResult<Decimal>;

    fn solver_fee(&self, query: &SolverFeeQuery) -> FundingResult<Decimal>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteKey {
    source_chain_id: u64,
    source_token: String,
    destination_chain_id: u64,
    destination_token: String,
}

/// Fee store backed by a static schedule
#[derive(Debug, Clone)]
pub struct ScheduleFeeStore {
    protocol_fee_bps: u32,
    default_solver_fee_bps: u32,
    fulfilment: HashMap<(u64, String), Decimal>,
    solver_routes: HashMap<RouteKey, u32>,
}

impl ScheduleFeeStore {
    pub fn new(config: &FeeScheduleConfig) -> Self {
        let fulfilment = config
            .fulfilment
            .iter()
            .map(|f| ((f.chain_id, f.token_address.to_lowercase()), f.fee))
            .collect();

        let solver_routes = config
            .solver_routes
            .iter()
            .map(|r| {
                (
                    RouteKey {
                        source_chain_id: r.source_chain_id,
                        source_token: r.source_token.to_lowercase(),
                        destination_chain_id: r.destination_chain_id,
                        destination_token: r.destination_token.to_lowercase(),
                    },
                    r.fee_bps,
                )
            })
            .collect();

        Self {
            protocol_fee_bps: config.protocol_fee_bps,
            default_solver_fee_bps: config.default_solver_fee_bps,
            fulfilment,
            solver_routes,
        }
    }
}

impl FeeStore for ScheduleFeeStore {
    fn protocol_fee(&self, amount: Decimal, decimals: u32) -> FundingResult<Decimal> {
        apply_bps(amount, self.protocol_fee_bps, decimals)
    }

    fn fulfilment_fee(&self, query: &FulfilmentFeeQuery) -> FundingResult<Decimal> {
        let key = (
            query.destination_chain_id,
            query.destination_token.to_lowercase(),
        );
        Ok(self
            .fulfilment
            .get(&key)
            .map(|fee| round_up(*fee, query.decimals))
            .unwrap_or(Decimal::ZERO))
    }

    fn solver_fee(&self, query: &SolverFeeQuery) -> FundingResult<Decimal> {
        let key = RouteKey {
            source_chain_id: query.source_chain_id,
            source_token: query.source_token.to_lowercase(),
            destination_chain_id: query.destination_chain_id,
            destination_token: query.destination_token.to_lowercase(),
        };
        let bps = self
            .solver_routes
            .get(&key)
            .copied()
            .unwrap_or(self.default_solver_fee_bps);
        apply_bps(query.amount, bps, query.decimals)
    }
}

fn apply_bps(amount: Decimal, bps: u32, decimals: u32) -> FundingResult<Decimal> {
    if bps == 0 || amount <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    let scaled = amount.checked_mul(Decimal::from(bps)).ok_or_else(|| {
        FundingError::InvalidAmount(format!("{} bps of {} overflows", bps, amount))
    })?;
    Ok(round_up(scaled / Decimal::from(10_000u32), decimals))
}

/// Round up to the smallest unit representable with `decimals`
fn round_up(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::AwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FulfilmentFeeConfig, SolverRouteConfig};
    use std::str::FromStr;

    const USDC_OP: &str = "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85";
    const USDC_ARB: &str = "0xaf88d065e77c8cc2239327c5edb3a432268e5831";

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn schedule() -> ScheduleFeeStore {
        ScheduleFeeStore::new(&FeeScheduleConfig {
            protocol_fee_bps: 100,
            default_solver_fee_bps: 5,
            fulfilment: vec![FulfilmentFeeConfig {
                chain_id: 10,
                token_address: USDC_OP.to_string(),
                fee: d("0.5"),
            }],
            solver_routes: vec![SolverRouteConfig {
                source_chain_id: 42161,
                source_token: USDC_ARB.to_string(),
                destination_chain_id: 10,
                destination_token: USDC_OP.to_string(),
                fee_bps: 20,
            }],
        })
    }

    #[test]
    fn test_protocol_fee_rounds_up_to_token_decimals() {
        let fees = schedule();
        assert_eq!(fees.protocol_fee(d("100"), 6).unwrap(), d("1"));
        assert_eq!(fees.protocol_fee(d("0.0000015"), 6).unwrap(), d("0.000001"));
    }

    #[test]
    fn test_fee_overflow_is_reported() {
        let fees = schedule();
        assert!(matches!(
            fees.protocol_fee(Decimal::MAX, 6),
            Err(FundingError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_fulfilment_fee_lookup_is_case_insensitive() {
        let fees = schedule();
        let query = FulfilmentFeeQuery {
            decimals: 6,
            destination_chain_id: 10,
            destination_token: USDC_OP.to_lowercase(),
        };
        assert_eq!(fees.fulfilment_fee(&query).unwrap(), d("0.5"));

        let unknown = FulfilmentFeeQuery {
            destination_chain_id: 8453,
            ..query
        };
        assert_eq!(fees.fulfilment_fee(&unknown).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_solver_fee_uses_route_then_default() {
        let fees = schedule();
        let mut query = SolverFeeQuery {
            amount: d("50"),
            source_chain_id: 42161,
            source_token: USDC_ARB.to_string(),
            destination_chain_id: 10,
            destination_token: USDC_OP.to_string(),
            decimals: 6,
        };
        assert_eq!(fees.solver_fee(&query).unwrap(), d("0.1"));

        query.source_chain_id = 137;
        assert_eq!(fees.solver_fee(&query).unwrap(), d("0.025"));
    }
}
