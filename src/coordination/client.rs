//! Coordination-chain client over the Cosmos REST gateway

use crate::config::CoordinatorConfig;
use crate::error::{FundingError, FundingResult};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Verification message for one source chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoubleCheckTx {
    pub intent_id: u64,
    pub chain_id: u64,
    pub universe: u8,
    pub requester: String,
    pub gas_refunded: bool,
}

/// Signs coordination-chain transactions; the encoding is opaque here
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TxSigner: Send + Sync {
    /// Wrap a request-for-funds message into signed tx bytes
    async fn sign_rff_tx(&self, message: &[u8]) -> FundingResult<Vec<u8>>;

    /// Wrap a double-check message into signed tx bytes
    async fn sign_double_check_tx(&self, tx: &DoubleCheckTx) -> FundingResult<Vec<u8>>;
}

/// Submits requests and verifications to the coordination chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoordinatorClient: Send + Sync {
    /// Submit a request for funds and return the assigned intent id
    async fn submit_rff(&self, message: &[u8]) -> FundingResult<u64>;

    async fn submit_double_check(&self, tx: &DoubleCheckTx) -> FundingResult<()>;
}

#[derive(Debug, Serialize)]
struct BroadcastRequest<'a> {
    tx_bytes: String,
    mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct TxEnvelope {
    tx_response: TxResponse,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    raw_log: String,
    #[serde(default)]
    events: Vec<TxEvent>,
}

#[derive(Debug, Deserialize)]
struct TxEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Vec<EventAttribute>,
}

#[derive(Debug, Deserialize)]
struct EventAttribute {
    key: String,
    #[serde(default)]
    value: String,
}

/// REST client for a Cosmos SDK coordination chain
pub struct CosmosRestClient {
    http: Client,
    config: CoordinatorConfig,
    signer: Arc<dyn TxSigner>,
}

impl CosmosRestClient {
    pub fn new(config: CoordinatorConfig, signer: Arc<dyn TxSigner>) -> FundingResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            config,
            signer,
        })
    }

    /// Broadcast in sync mode and return the tx hash once accepted into the mempool
    async fn broadcast(&self, tx_bytes: &[u8]) -> FundingResult<String> {
        let url = format!("{}/cosmos/tx/v1beta1/txs", self.base_url());
        let body = BroadcastRequest {
            tx_bytes: BASE64.encode(tx_bytes),
            mode: "BROADCAST_MODE_SYNC",
        };

        let envelope: TxEnvelope = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let response = envelope.tx_response;
        if response.code != 0 {
            return Err(FundingError::Coordination(format!(
                "broadcast rejected with code {}: {}",
                response.code, response.raw_log
            )));
        }

        debug!("Broadcast accepted: {}", response.txhash);
        Ok(response.txhash)
    }

    /// Poll until the tx is included in a block
    async fn wait_for_inclusion(&self, hash: &str) -> FundingResult<TxResponse> {
        let url = format!("{}/cosmos/tx/v1beta1/txs/{}", self.base_url(), hash);
        let interval = Duration::from_millis(self.config.tx_poll_interval_ms);

        for attempt in 0..self.config.tx_poll_attempts {
            if attempt > 0 {
                tokio::time::sleep(interval).await;
            }

            let response = self.http.get(&url).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                debug!("Tx {} not yet included (attempt {})", hash, attempt + 1);
                continue;
            }

            let envelope: TxEnvelope = response.error_for_status()?.json().await?;
            let included = envelope.tx_response;
            if included.code != 0 {
                return Err(FundingError::Coordination(format!(
                    "tx {} failed with code {}: {}",
                    hash, included.code, included.raw_log
                )));
            }
            return Ok(included);
        }

        Err(FundingError::Timeout {
            operation: format!("inclusion of coordination tx {}", hash),
        })
    }

    fn base_url(&self) -> &str {
        self.config.rest_url.trim_end_matches('/')
    }

    fn intent_id_from(&self, response: &TxResponse) -> FundingResult<u64> {
        response
            .events
            .iter()
            .filter(|event| event.kind == self.config.rff_event_type)
            .flat_map(|event| event.attributes.iter())
            .find(|attr| attr.key == self.config.intent_id_attribute)
            .ok_or_else(|| {
                FundingError::Coordination(format!(
                    "tx {} has no {}.{} attribute",
                    response.txhash, self.config.rff_event_type, self.config.intent_id_attribute
                ))
            })
            .and_then(|attr| {
                attr.value.trim_matches('"').parse::<u64>().map_err(|_| {
                    FundingError::Coordination(format!("invalid intent id {:?}", attr.value))
                })
            })
    }
}

#[async_trait]
impl CoordinatorClient for CosmosRestClient {
    async fn submit_rff(&self, message: &[u8]) -> FundingResult<u64> {
        let tx_bytes = self.signer.sign_rff_tx(message).await?;
        let hash = self.broadcast(&tx_bytes).await?;
        let included = self.wait_for_inclusion(&hash).await?;
        let intent_id = self.intent_id_from(&included)?;

        info!(
            "Request for funds included on {} as intent {} ({})",
            self.config.chain_id, intent_id, hash
        );
        Ok(intent_id)
    }

    async fn submit_double_check(&self, tx: &DoubleCheckTx) -> FundingResult<()> {
        let tx_bytes = self.signer.sign_double_check_tx(tx).await?;
        let hash = self.broadcast(&tx_bytes).await.map_err(|e| {
            warn!("Double-check broadcast for chain {} failed: {}", tx.chain_id, e);
            e
        })?;
        self.wait_for_inclusion(&hash).await?;

        debug!(
            "Double-check for intent {} on chain {} included ({})",
            tx.intent_id, tx.chain_id, hash
        );
        Ok(())
    }
}
