//! Submission of signed requests to the coordination chain

use super::client::{CoordinatorClient, DoubleCheckTx};
use crate::error::{FundingError, FundingResult};
use crate::rff::{SignatureData, SignedRff};
use crate::state::RecoveryStore;

use alloy_primitives::B256;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

/// Intent id before the coordination chain has assigned one
pub const UNASSIGNED_INTENT_ID: u64 = 0;

/// A request accepted by the coordination chain
#[derive(Debug, Clone)]
pub struct RffSubmission {
    pub intent_id: u64,
    pub requester: String,
    pub request_hash: B256,
    pub signature_data: Vec<SignatureData>,
    pub request_payload: Vec<u8>,
    /// One verification per source chain, in source order
    pub double_checks: Vec<DoubleCheckTx>,
}

impl RffSubmission {
    pub fn source_chains(&self) -> Vec<u64> {
        self.double_checks.iter().map(|tx| tx.chain_id).collect()
    }
}

/// Submits requests and records them for recovery
pub struct CoordinationSubmitter {
    client: Arc<dyn CoordinatorClient>,
    store: Arc<dyn RecoveryStore>,
}

impl CoordinationSubmitter {
    pub fn new(client: Arc<dyn CoordinatorClient>, store: Arc<dyn RecoveryStore>) -> Self {
        Self { client, store }
    }

    /// Submit the request, persist the assigned id and prepare per-chain double-checks
    pub async fn create_rff(
        &self,
        requester: &str,
        signed: &SignedRff,
    ) -> FundingResult<RffSubmission> {
        let intent_id = self
            .client
            .submit_rff(&signed.request_message)
            .await
            .map_err(|e| {
                error!("Request submission failed: {}", e);
                e
            })?;

        if intent_id == UNASSIGNED_INTENT_ID {
            return Err(FundingError::Coordination(
                "coordination chain returned no intent id".to_string(),
            ));
        }

        self.store.put(requester, intent_id).await?;
        crate::metrics::record_rff_submitted();

        let mut seen = HashSet::new();
        let double_checks = signed
            .sources
            .iter()
            .filter(|source| seen.insert(source.chain_id))
            .map(|source| DoubleCheckTx {
                intent_id,
                chain_id: source.chain_id,
                universe: source.universe,
                requester: requester.to_string(),
                gas_refunded: false,
            })
            .collect();

        info!(
            "Intent {} created for {} (request {})",
            intent_id, requester, signed.request_hash
        );

        Ok(RffSubmission {
            intent_id,
            requester: requester.to_string(),
            request_hash: signed.request_hash,
            signature_data: signed.signatures.clone(),
            request_payload: signed.request_message.clone(),
            double_checks,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::coordination::client::MockCoordinatorClient;
    use crate::events::Request;
    use crate::rff::RffSource;
    use crate::state::MemoryRecoveryStore;
    use alloy_primitives::U256;

    pub(crate) fn signed_rff(chains: &[u64]) -> SignedRff {
        SignedRff {
            request_message: b"rff".to_vec(),
            request: Request {
                sources: vec![],
                destinationUniverse: 0,
                destinationChainID: U256::from(1u64),
                destinations: vec![],
                nonce: U256::from(1u64),
                expiry: U256::from(1u64),
                parties: vec![],
            },
            request_hash: B256::repeat_byte(5),
            signatures: vec![],
            sources: chains
                .iter()
                .map(|chain_id| RffSource {
                    chain_id: *chain_id,
                    universe: 0,
                    token: B256::ZERO,
                    value: U256::from(1u64),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_submission_records_intent_and_builds_double_checks() {
        let mut client = MockCoordinatorClient::new();
        client.expect_submit_rff().times(1).returning(|_| Ok(42));
        let store = Arc::new(MemoryRecoveryStore::new());
        let submitter = CoordinationSubmitter::new(Arc::new(client), store.clone());

        let submission = submitter
            .create_rff("0xABC", &signed_rff(&[10, 137, 10]))
            .await
            .unwrap();

        assert_eq!(submission.intent_id, 42);
        assert_eq!(submission.source_chains(), vec![10, 137]);
        assert!(submission
            .double_checks
            .iter()
            .all(|tx| tx.intent_id == 42 && !tx.gas_refunded));
        assert_eq!(store.list("0xabc").await.unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn test_failed_submission_records_nothing() {
        let mut client = MockCoordinatorClient::new();
        client
            .expect_submit_rff()
            .returning(|_| Err(FundingError::Coordination("rejected".to_string())));
        let store = Arc::new(MemoryRecoveryStore::new());
        let submitter = CoordinationSubmitter::new(Arc::new(client), store.clone());

        assert!(submitter.create_rff("0xabc", &signed_rff(&[10])).await.is_err());
        assert!(store.list("0xabc").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unassigned_intent_id_is_rejected() {
        let mut client = MockCoordinatorClient::new();
        client
            .expect_submit_rff()
            .returning(|_| Ok(UNASSIGNED_INTENT_ID));
        let store = Arc::new(MemoryRecoveryStore::new());
        let submitter = CoordinationSubmitter::new(Arc::new(client), store.clone());

        assert!(matches!(
            submitter.create_rff("0xabc", &signed_rff(&[10])).await,
            Err(FundingError::Coordination(_))
        ));
        assert!(store.list("0xabc").await.unwrap().is_empty());
    }
}
