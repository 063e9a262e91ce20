//! In-memory recovery store

use super::{normalize_address, PendingIntent, RecoveryStore};
use crate::error::FundingResult;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;

/// Process-local store, lost on restart
#[derive(Debug, Default)]
pub struct MemoryRecoveryStore {
    entries: DashMap<String, BTreeMap<u64, DateTime<Utc>>>,
}

impl MemoryRecoveryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecoveryStore for MemoryRecoveryStore {
    async fn put(&self, address: &str, intent_id: u64) -> FundingResult<()> {
        self.entries
            .entry(normalize_address(address))
            .or_default()
            .entry(intent_id)
            .or_insert_with(Utc::now);
        Ok(())
    }

    async fn remove(&self, address: &str, intent_id: u64) -> FundingResult<()> {
        let key = normalize_address(address);
        self.entries.remove_if_mut(&key, |_, ids| {
            ids.remove(&intent_id);
            ids.is_empty()
        });
        Ok(())
    }

    async fn pending_count(&self) -> FundingResult<u64> {
        Ok(self.entries.iter().map(|ids| ids.len() as u64).sum())
    }

    async fn list_entries(&self, address: &str) -> FundingResult<Vec<PendingIntent>> {
        Ok(self
            .entries
            .get(&normalize_address(address))
            .map(|ids| {
                ids.iter()
                    .map(|(intent_id, created_at)| PendingIntent {
                        intent_id: *intent_id,
                        created_at: *created_at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_list_remove() {
        let store = MemoryRecoveryStore::new();
        store.put("0xABC", 7).await.unwrap();
        store.put("0xabc", 3).await.unwrap();
        store.put("0xabc", 7).await.unwrap();

        assert_eq!(store.list("0xAbC").await.unwrap(), vec![3, 7]);
        store.put("0xdef", 7).await.unwrap();
        assert_eq!(store.pending_count().await.unwrap(), 3);
        store.remove("0xdef", 7).await.unwrap();

        store.remove("0xabc", 7).await.unwrap();
        store.remove("0xabc", 99).await.unwrap();
        assert_eq!(store.list("0xabc").await.unwrap(), vec![3]);

        store.remove("0xabc", 3).await.unwrap();
        assert!(store.list("0xabc").await.unwrap().is_empty());
        assert!(store.entries.is_empty());
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_flows_for_same_address() {
        let store = Arc::new(MemoryRecoveryStore::new());

        let handles: Vec<_> = (1..=32u64)
            .map(|id| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.put("0xfeed", id).await.unwrap();
                    if id % 2 == 0 {
                        store.remove("0xfeed", id).await.unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let remaining = store.list("0xfeed").await.unwrap();
        assert_eq!(remaining, (1..=32u64).filter(|id| id % 2 == 1).collect::<Vec<_>>());
    }

    #[test]
    fn test_repeated_put_keeps_first_timestamp() {
        let store = MemoryRecoveryStore::new();
        tokio_test::block_on(async {
            tokio_test::assert_ok!(store.put("0xabc", 1).await);
            let first = store.list_entries("0xabc").await.unwrap();

            tokio_test::assert_ok!(store.put("0xABC", 1).await);
            let second = store.list_entries("0xabc").await.unwrap();

            assert_eq!(first, second);
        });
    }
}
