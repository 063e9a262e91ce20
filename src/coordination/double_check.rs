//! Best-effort verification of deposits per source chain

use super::client::{CoordinatorClient, DoubleCheckTx};
use super::submitter::RffSubmission;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of verifying one source chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DoubleCheckOutcome {
    Verified { chain_id: u64 },
    Failed { chain_id: u64, cause: String },
}

impl DoubleCheckOutcome {
    pub fn chain_id(&self) -> u64 {
        match self {
            DoubleCheckOutcome::Verified { chain_id } => *chain_id,
            DoubleCheckOutcome::Failed { chain_id, .. } => *chain_id,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, DoubleCheckOutcome::Verified { .. })
    }
}

/// Issues one double-check transaction per source chain
///
/// A failure on one chain never stops the others. Outcomes come back in
/// source order whatever the parallelism.
pub struct DoubleCheckVerifier {
    client: Arc<dyn CoordinatorClient>,
    max_parallel: usize,
}

impl DoubleCheckVerifier {
    pub fn new(client: Arc<dyn CoordinatorClient>, max_parallel: usize) -> Self {
        Self {
            client,
            max_parallel: max_parallel.max(1),
        }
    }

    pub async fn verify(&self, submission: &RffSubmission) -> Vec<DoubleCheckOutcome> {
        stream::iter(submission.double_checks.iter())
            .map(|tx| self.verify_chain(tx))
            .buffered(self.max_parallel)
            .collect()
            .await
    }

    async fn verify_chain(&self, tx: &DoubleCheckTx) -> DoubleCheckOutcome {
        match self.client.submit_double_check(tx).await {
            Ok(()) => {
                debug!(
                    "Double-check verified for intent {} on chain {}",
                    tx.intent_id, tx.chain_id
                );
                crate::metrics::record_double_check(tx.chain_id, true);
                DoubleCheckOutcome::Verified {
                    chain_id: tx.chain_id,
                }
            }
            Err(e) => {
                warn!(
                    "Double-check failed for intent {} on chain {}: {}",
                    tx.intent_id, tx.chain_id, e
                );
                crate::metrics::record_double_check(tx.chain_id, false);
                DoubleCheckOutcome::Failed {
                    chain_id: tx.chain_id,
                    cause: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::client::MockCoordinatorClient;
    use crate::error::FundingError;
    use alloy_primitives::B256;
    use std::sync::Mutex;

    fn submission(chains: &[u64]) -> RffSubmission {
        RffSubmission {
            intent_id: 7,
            requester: "0xabc".to_string(),
            request_hash: B256::ZERO,
            signature_data: vec![],
            request_payload: vec![],
            double_checks: chains
                .iter()
                .map(|chain_id| DoubleCheckTx {
                    intent_id: 7,
                    chain_id: *chain_id,
                    universe: 0,
                    requester: "0xabc".to_string(),
                    gas_refunded: false,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_remaining_chains() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        let mut client = MockCoordinatorClient::new();
        client.expect_submit_double_check().returning(move |tx| {
            seen.lock().unwrap().push(tx.chain_id);
            if tx.chain_id == 137 {
                Err(FundingError::DoubleCheck {
                    chain_id: 137,
                    message: "rpc down".to_string(),
                })
            } else {
                Ok(())
            }
        });

        let verifier = DoubleCheckVerifier::new(Arc::new(client), 1);
        let outcomes = verifier.verify(&submission(&[10, 137, 8453])).await;

        assert_eq!(*calls.lock().unwrap(), vec![10, 137, 8453]);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_verified());
        assert!(matches!(
            &outcomes[1],
            DoubleCheckOutcome::Failed { chain_id: 137, cause } if cause.contains("rpc down")
        ));
        assert!(outcomes[2].is_verified());
    }

    #[tokio::test]
    async fn test_parallel_verification_keeps_source_order() {
        let mut client = MockCoordinatorClient::new();
        client.expect_submit_double_check().returning(|_| Ok(()));

        let verifier = DoubleCheckVerifier::new(Arc::new(client), 4);
        let outcomes = verifier.verify(&submission(&[1, 2, 3, 4, 5])).await;

        let chains: Vec<_> = outcomes.iter().map(|o| o.chain_id()).collect();
        assert_eq!(chains, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_zero_parallelism_is_clamped() {
        let verifier = DoubleCheckVerifier::new(Arc::new(MockCoordinatorClient::new()), 0);
        assert_eq!(verifier.max_parallel, 1);
    }
}
