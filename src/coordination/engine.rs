//! Funding engine orchestrating one funding attempt end to end

use super::client::CoordinatorClient;
use super::double_check::{DoubleCheckOutcome, DoubleCheckVerifier};
use super::submitter::{CoordinationSubmitter, RffSubmission};
use crate::chain::{AllowanceReader, ChainRegistry};
use crate::config::DoubleCheckConfig;
use crate::error::{FundingError, FundingResult};
use crate::fees::FeeStore;
use crate::fulfillment::{FillQuery, FillSource, FillWaiter, FulfillmentWatcher};
use crate::intent::{BridgeAsset, DestinationAllocation, IntentBuilder, IntentPlan};
use crate::rff::{DepositCall, RffAssembler, RffSigner};
use crate::state::RecoveryStore;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// External collaborators the engine is wired with
pub struct Collaborators {
    pub fee_store: Arc<dyn FeeStore>,
    pub signer: Arc<dyn RffSigner>,
    pub allowances: Arc<dyn AllowanceReader>,
    pub coordinator: Arc<dyn CoordinatorClient>,
    pub fills: Arc<dyn FillSource>,
    pub store: Arc<dyn RecoveryStore>,
}

/// Everything produced by a successful funding attempt
#[derive(Debug, Clone)]
pub struct FundingReceipt {
    pub attempt_id: Uuid,
    pub plan: IntentPlan,
    /// Per-chain transactions for the wallet to broadcast
    pub deposits: Vec<DepositCall>,
    pub submission: RffSubmission,
    /// Destination head recorded before submission; fill search starts here
    pub fill_from_block: u64,
}

/// Cross-chain funding engine
///
/// A funding attempt runs in three caller-driven steps: [`FundingEngine::fund`]
/// submits the request and hands back deposits, the caller broadcasts them,
/// then [`FundingEngine::verify_deposits`] and [`FundingEngine::watch`] follow.
pub struct FundingEngine {
    registry: Arc<ChainRegistry>,
    fee_store: Arc<dyn FeeStore>,
    signer: Arc<dyn RffSigner>,
    fills: Arc<dyn FillSource>,
    assembler: RffAssembler,
    submitter: CoordinationSubmitter,
    verifier: DoubleCheckVerifier,
    watcher: FulfillmentWatcher,
}

impl FundingEngine {
    pub fn new(
        registry: Arc<ChainRegistry>,
        collaborators: Collaborators,
        double_check: &DoubleCheckConfig,
    ) -> Self {
        let Collaborators {
            fee_store,
            signer,
            allowances,
            coordinator,
            fills,
            store,
        } = collaborators;

        Self {
            assembler: RffAssembler::new(registry.clone(), allowances),
            submitter: CoordinationSubmitter::new(coordinator.clone(), store.clone()),
            verifier: DoubleCheckVerifier::new(coordinator, double_check.max_parallel),
            watcher: FulfillmentWatcher::new(fills.clone(), store),
            registry,
            fee_store,
            signer,
            fills,
        }
    }

    /// Build, sign, assemble and submit a request for funds
    ///
    /// Every error before submission leaves the requester's funds untouched.
    /// Deposits are returned unbroadcast; double-checks wait for
    /// [`FundingEngine::verify_deposits`].
    pub async fn fund(
        &self,
        requester: &str,
        assets: &[BridgeAsset],
        destination: &DestinationAllocation,
    ) -> FundingResult<FundingReceipt> {
        let attempt_id = Uuid::new_v4();
        let span = info_span!(
            "funding",
            attempt = %attempt_id,
            requester = %requester,
            destination_chain = destination.chain_id
        );

        async move {
            let result = self.run_attempt(attempt_id, requester, assets, destination).await;
            if let Err(e) = &result {
                if e.should_alert() {
                    error!("Funding attempt failed: {}", e);
                } else {
                    warn!("Funding attempt failed: {}", e);
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_attempt(
        &self,
        attempt_id: Uuid,
        requester: &str,
        assets: &[BridgeAsset],
        destination: &DestinationAllocation,
    ) -> FundingResult<FundingReceipt> {
        let family = self.registry.family(destination.chain_id)?;

        let plan = IntentBuilder::new(self.fee_store.as_ref()).create_intent(assets, destination)?;
        if plan.intent.is_available_balance_insufficient {
            crate::metrics::record_intent_insufficient(destination.chain_id);
        }
        let plan = plan.require_sufficient()?;
        crate::metrics::record_intent_built(destination.chain_id);

        info!(
            "Intent drawing {} from {} chains ({} top-ups)",
            plan.intent.total_sourced(),
            plan.intent.sources.len(),
            plan.eoa_to_ephemeral_calls.len()
        );

        let signed = self
            .signer
            .create_rff_from_intent(&plan.intent, family)
            .await?;
        let deposits = self.assembler.assemble(&plan.intent, &signed).await?;

        // A solver may fill as soon as the request is accepted
        let fill_from_block = self.fills.head_block(destination.chain_id).await?;
        let submission = self.submitter.create_rff(requester, &signed).await?;

        Ok(FundingReceipt {
            attempt_id,
            plan,
            deposits,
            submission,
            fill_from_block,
        })
    }

    /// Submit the double-check for every source chain
    ///
    /// Run once the receipt's deposits are broadcast. Failures are reported
    /// per chain, never as an error.
    pub async fn verify_deposits(&self, receipt: &FundingReceipt) -> Vec<DoubleCheckOutcome> {
        let submission = &receipt.submission;
        let span = info_span!(
            "double_check",
            attempt = %receipt.attempt_id,
            intent_id = submission.intent_id
        );

        async move {
            let outcomes = self.verifier.verify(submission).await;

            let failed = outcomes.iter().filter(|o| !o.is_verified()).count();
            if failed > 0 {
                warn!(
                    "{} of {} double-checks failed for intent {}",
                    failed,
                    outcomes.len(),
                    submission.intent_id
                );
            }
            outcomes
        }
        .instrument(span)
        .await
    }

    /// Start waiting for the fill of a submitted request, for at most `deadline`
    pub fn watch(
        &self,
        receipt: &FundingReceipt,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> FundingResult<FillWaiter> {
        let chain_id = receipt.plan.intent.destination.chain_id;
        let submission = &receipt.submission;
        if submission.intent_id == super::submitter::UNASSIGNED_INTENT_ID {
            return Err(FundingError::Coordination(
                "cannot watch an unsubmitted request".to_string(),
            ));
        }

        let query = FillQuery {
            chain_id,
            vault: self.registry.vault_address(chain_id)?,
            request_hash: submission.request_hash,
            intent_id: submission.intent_id,
            from_block: receipt.fill_from_block,
        };

        Ok(self
            .watcher
            .spawn(submission.requester.clone(), query, deadline, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::evm_chain;
    use crate::chain::{ChainFamily, MockAllowanceReader};
    use crate::config::{FeeScheduleConfig, FulfilmentFeeConfig};
    use crate::coordination::client::MockCoordinatorClient;
    use crate::coordination::submitter::tests::signed_rff;
    use crate::events::FillEvent;
    use crate::fees::ScheduleFeeStore;
    use crate::fulfillment::MockFillSource;
    use crate::rff::assembler::tests::request_sources;
    use crate::rff::{MockRffSigner, SignatureData};
    use crate::state::MemoryRecoveryStore;
    use alloy_primitives::{Address, Bytes, B256, U256};
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::str::FromStr;

    const VAULT: &str = "0x2222222222222222222222222222222222222222";
    const TOKEN: &str = "0x3333333333333333333333333333333333333333";
    const HOLDER: &str = "0x4444444444444444444444444444444444444444";

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn registry() -> Arc<ChainRegistry> {
        Arc::new(ChainRegistry::from_configs(vec![
            evm_chain(1, VAULT),
            evm_chain(10, VAULT),
            evm_chain(137, VAULT),
        ]))
    }

    fn fee_store() -> Arc<dyn FeeStore> {
        Arc::new(ScheduleFeeStore::new(&FeeScheduleConfig {
            protocol_fee_bps: 100,
            default_solver_fee_bps: 0,
            fulfilment: vec![FulfilmentFeeConfig {
                chain_id: 1,
                token_address: TOKEN.to_string(),
                fee: d("0.5"),
            }],
            solver_routes: vec![],
        }))
    }

    fn asset(chain_id: u64, eoa: &str, ephemeral: &str) -> BridgeAsset {
        BridgeAsset {
            chain_id,
            contract_address: TOKEN.to_string(),
            decimals: 6,
            eoa_balance: d(eoa),
            ephemeral_balance: d(ephemeral),
            holder_address: HOLDER.to_string(),
            chain_family: ChainFamily::Evm,
        }
    }

    fn destination() -> DestinationAllocation {
        DestinationAllocation {
            chain_id: 1,
            token_contract: TOKEN.to_string(),
            amount: d("100"),
            decimals: 6,
            gas: Decimal::ZERO,
        }
    }

    fn signer() -> MockRffSigner {
        let mut signer = MockRffSigner::new();
        signer.expect_create_rff_from_intent().returning(|intent, _| {
            let chains: Vec<u64> = intent.sources.iter().map(|s| s.chain_id).collect();
            let mut signed = signed_rff(&chains);
            signed.request.sources = request_sources(intent);
            signed.signatures.push(SignatureData {
                universe: ChainFamily::Evm.universe(),
                address: B256::ZERO,
                signature: Bytes::from(vec![0xaa; 65]),
                request_hash: signed.request_hash,
            });
            Ok(signed)
        });
        signer
    }

    fn allowances() -> MockAllowanceReader {
        let mut reader = MockAllowanceReader::new();
        reader.expect_allowances().returning(|_| {
            Ok(HashMap::from([(10, U256::ZERO), (137, U256::MAX)]))
        });
        reader
    }

    fn coordinator() -> MockCoordinatorClient {
        let mut client = MockCoordinatorClient::new();
        client.expect_submit_rff().returning(|_| Ok(77));
        client.expect_submit_double_check().returning(|tx| {
            if tx.chain_id == 137 {
                Err(FundingError::Coordination("out of gas".to_string()))
            } else {
                Ok(())
            }
        });
        client
    }

    const HEAD: u64 = 90;

    fn fills() -> MockFillSource {
        let mut source = MockFillSource::new();
        source.expect_head_block().returning(|_| Ok(HEAD));
        source
            .expect_wait_for_fill()
            .withf(|q| q.from_block == HEAD)
            .returning(|q| {
                Ok(FillEvent {
                    chain_id: q.chain_id,
                    intent_id: q.intent_id,
                    request_hash: q.request_hash,
                    solver: Address::repeat_byte(0x55),
                    block_number: HEAD + 1,
                    tx_hash: B256::ZERO,
                })
            });
        source
    }

    fn engine(
        signer: MockRffSigner,
        coordinator: MockCoordinatorClient,
        fills: MockFillSource,
        store: Arc<MemoryRecoveryStore>,
    ) -> FundingEngine {
        FundingEngine::new(
            registry(),
            Collaborators {
                fee_store: fee_store(),
                signer: Arc::new(signer),
                allowances: Arc::new(allowances()),
                coordinator: Arc::new(coordinator),
                fills: Arc::new(fills),
                store,
            },
            &DoubleCheckConfig::default(),
        )
    }

    fn scenario() -> [BridgeAsset; 2] {
        [asset(10, "60", "0"), asset(137, "0", "50")]
    }

    #[tokio::test]
    async fn test_fund_verify_then_watch_until_filled() {
        let store = Arc::new(MemoryRecoveryStore::new());
        let engine = engine(signer(), coordinator(), fills(), store.clone());

        let receipt = engine
            .fund(HOLDER, &scenario(), &destination())
            .await
            .unwrap();

        assert_eq!(receipt.plan.intent.total_sourced(), d("101.5"));
        assert_eq!(receipt.submission.intent_id, 77);
        assert_eq!(receipt.fill_from_block, HEAD);
        assert_eq!(receipt.deposits.len(), 2);
        assert_eq!(receipt.deposits[0].tx.len(), 2);
        assert_eq!(receipt.deposits[1].tx.len(), 1);
        assert_eq!(store.list(HOLDER).await.unwrap(), vec![77]);

        let outcomes = engine.verify_deposits(&receipt).await;
        assert_eq!(
            outcomes,
            vec![
                DoubleCheckOutcome::Verified { chain_id: 10 },
                DoubleCheckOutcome::Failed {
                    chain_id: 137,
                    cause: "Coordination chain error: out of gas".to_string(),
                },
            ]
        );

        let waiter = engine
            .watch(&receipt, Duration::from_secs(5), CancellationToken::new())
            .unwrap();
        let fill = waiter.completion().await.unwrap();

        assert_eq!(fill.intent_id, 77);
        assert!(store.list(HOLDER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fund_leaves_double_checks_to_the_caller() {
        let mut coordinator = MockCoordinatorClient::new();
        coordinator.expect_submit_rff().times(1).returning(|_| Ok(78));
        coordinator.expect_submit_double_check().never();
        let store = Arc::new(MemoryRecoveryStore::new());
        let engine = engine(signer(), coordinator, fills(), store.clone());

        let receipt = engine
            .fund(HOLDER, &scenario(), &destination())
            .await
            .unwrap();

        assert_eq!(receipt.submission.source_chains(), vec![10, 137]);
        assert_eq!(store.list(HOLDER).await.unwrap(), vec![78]);
    }

    #[tokio::test]
    async fn test_destination_head_is_read_before_submission() {
        let mut coordinator = MockCoordinatorClient::new();
        coordinator.expect_submit_rff().never();
        let mut fills = MockFillSource::new();
        fills.expect_head_block().returning(|chain_id| {
            Err(FundingError::ChainConnection {
                chain_id,
                message: "All providers failed".to_string(),
            })
        });
        let store = Arc::new(MemoryRecoveryStore::new());
        let engine = engine(signer(), coordinator, fills, store.clone());

        let err = engine
            .fund(HOLDER, &scenario(), &destination())
            .await
            .unwrap_err();

        assert!(matches!(err, FundingError::ChainConnection { chain_id: 1, .. }));
        assert!(store.list(HOLDER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_balance_stops_before_signing() {
        let mut signer = MockRffSigner::new();
        signer.expect_create_rff_from_intent().never();
        let mut coordinator = MockCoordinatorClient::new();
        coordinator.expect_submit_rff().never();
        let store = Arc::new(MemoryRecoveryStore::new());
        let engine = engine(signer, coordinator, fills(), store.clone());

        let err = engine
            .fund(HOLDER, &[asset(10, "20", "30")], &destination())
            .await
            .unwrap_err();

        assert!(matches!(err, FundingError::InsufficientBalance { .. }));
        assert!(store.list(HOLDER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_destination_chain_is_fatal() {
        let mut signer = MockRffSigner::new();
        signer.expect_create_rff_from_intent().never();
        let engine = engine(
            signer,
            MockCoordinatorClient::new(),
            fills(),
            Arc::new(MemoryRecoveryStore::new()),
        );

        let mut destination = destination();
        destination.chain_id = 8453;
        let err = engine
            .fund(HOLDER, &[asset(10, "500", "0")], &destination)
            .await
            .unwrap_err();

        assert!(matches!(err, FundingError::UnknownChain { chain_id: 8453 }));
    }
}
