//! Recovery bookkeeping for in-flight requests
//!
//! Handles:
//! - Recording intent ids as soon as the coordination chain assigns them
//! - Removing them once the fill is observed
//! - Listing what is still pending per requester after a restart

mod manager;
mod memory;

pub use manager::PgRecoveryStore;
pub use memory::MemoryRecoveryStore;

use crate::error::FundingResult;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A pending intent recorded for a requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingIntent {
    pub intent_id: u64,
    pub created_at: DateTime<Utc>,
}

/// Keyed set of intent ids per requester address
#[async_trait]
pub trait RecoveryStore: Send + Sync {
    /// Record an intent; recording it twice is a no-op
    async fn put(&self, address: &str, intent_id: u64) -> FundingResult<()>;

    /// Forget an intent; unknown ids are ignored
    async fn remove(&self, address: &str, intent_id: u64) -> FundingResult<()>;

    /// Pending intents for an address, ordered by intent id
    async fn list_entries(&self, address: &str) -> FundingResult<Vec<PendingIntent>>;

    /// Number of pending intents across all requesters
    async fn pending_count(&self) -> FundingResult<u64>;

    async fn list(&self, address: &str) -> FundingResult<Vec<u64>> {
        Ok(self
            .list_entries(address)
            .await?
            .into_iter()
            .map(|e| e.intent_id)
            .collect())
    }
}

/// Addresses are compared case-insensitively
pub(crate) fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}
