//! Bounded, cancellable waits for a fill

use super::{FillQuery, FillSource};
use crate::error::{FundingError, FundingResult};
use crate::events::FillEvent;
use crate::state::RecoveryStore;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Handle on a spawned fill wait
pub struct FillWaiter {
    pub intent_id: u64,
    filled: Arc<AtomicBool>,
    cancel: CancellationToken,
    handle: JoinHandle<FundingResult<FillEvent>>,
}

impl FillWaiter {
    /// True once the fill was observed; never flips back
    pub fn is_filled(&self) -> bool {
        self.filled.load(Ordering::Acquire)
    }

    /// Stop waiting; the wait resolves with `Cancelled`
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the outcome
    pub async fn completion(self) -> FundingResult<FillEvent> {
        self.handle
            .await
            .map_err(|e| FundingError::Internal(format!("fill watcher task failed: {}", e)))?
    }
}

/// Waits for a request to be filled on its destination chain
#[derive(Clone)]
pub struct FulfillmentWatcher {
    source: Arc<dyn FillSource>,
    store: Arc<dyn RecoveryStore>,
}

impl FulfillmentWatcher {
    pub fn new(source: Arc<dyn FillSource>, store: Arc<dyn RecoveryStore>) -> Self {
        Self { source, store }
    }

    /// Resolve once the fill is seen, the deadline passes or `cancel` fires
    ///
    /// The fill source future is dropped on every exit path, which releases
    /// its subscription.
    pub async fn wait_for_fill(
        &self,
        requester: &str,
        query: &FillQuery,
        deadline: Duration,
        cancel: CancellationToken,
        filled: &AtomicBool,
    ) -> FundingResult<FillEvent> {
        let started = Instant::now();

        let fill = tokio::select! {
            result = self.source.wait_for_fill(query) => result?,
            _ = tokio::time::sleep(deadline) => {
                warn!("Intent {} not filled within {:?}", query.intent_id, deadline);
                return Err(FundingError::Timeout {
                    operation: format!("fill of intent {}", query.intent_id),
                });
            }
            _ = cancel.cancelled() => {
                info!("Stopped waiting for intent {}", query.intent_id);
                return Err(FundingError::Cancelled {
                    intent_id: query.intent_id,
                });
            }
        };

        filled.store(true, Ordering::Release);
        crate::metrics::record_fill(query.chain_id, started.elapsed());

        if let Err(e) = self.store.remove(requester, query.intent_id).await {
            warn!(
                "Intent {} filled but could not be cleared from recovery store: {}",
                query.intent_id, e
            );
        }

        info!(
            "Intent {} filled on chain {} by {} (tx {})",
            fill.intent_id, fill.chain_id, fill.solver, fill.tx_hash
        );
        Ok(fill)
    }

    /// Run the wait on its own task
    pub fn spawn(
        &self,
        requester: String,
        query: FillQuery,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> FillWaiter {
        let filled = Arc::new(AtomicBool::new(false));
        let watcher = self.clone();
        let flag = filled.clone();
        let token = cancel.clone();
        let intent_id = query.intent_id;

        let handle = tokio::spawn(async move {
            watcher
                .wait_for_fill(&requester, &query, deadline, token, &flag)
                .await
        });

        FillWaiter {
            intent_id,
            filled,
            cancel,
            handle,
        }
    }
}
