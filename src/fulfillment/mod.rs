//! Observation of fills on the destination chain
//!
//! A [`FillSource`] resolves once the vault reports a fill for a request;
//! the [`FulfillmentWatcher`] bounds that wait with a deadline and a
//! cancellation token and clears the recovery entry on success.

pub mod evm;
pub mod watcher;

pub use evm::EvmFillSource;
pub use watcher::{FillWaiter, FulfillmentWatcher};

use crate::error::FundingResult;
use crate::events::FillEvent;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;

/// What identifies a fill on the destination vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillQuery {
    pub chain_id: u64,
    pub vault: Address,
    pub request_hash: B256,
    pub intent_id: u64,
    /// Destination head before the request was submitted; fills can't be older
    pub from_block: u64,
}

/// Streams vault events until a matching fill shows up
///
/// Dropping the returned future must release the underlying subscription.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FillSource: Send + Sync {
    /// Current head of the destination chain
    async fn head_block(&self, chain_id: u64) -> FundingResult<u64>;

    /// Resolve with the first matching fill at or after `query.from_block`
    async fn wait_for_fill(&self, query: &FillQuery) -> FundingResult<FillEvent>;
}
