//! EVM fill source with WebSocket streaming and HTTP polling fallback

use super::{FillQuery, FillSource};
use crate::chain::{ChainProvider, ChainRegistry};
use crate::config::FulfillmentConfig;
use crate::error::{FundingError, FundingResult};
use crate::events::{fulfilment_topic, intent_id_topic, FillEvent};

use async_trait::async_trait;
use ethers::prelude::*;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on blocks fetched per `eth_getLogs` call
const MAX_BLOCK_RANGE: u64 = 1000;

/// Watches vault logs on EVM destination chains
pub struct EvmFillSource {
    registry: Arc<ChainRegistry>,
    poll_interval: Duration,
}

impl EvmFillSource {
    pub fn new(registry: Arc<ChainRegistry>, poll_interval: Duration) -> Self {
        Self {
            registry,
            poll_interval,
        }
    }

    pub fn from_config(registry: Arc<ChainRegistry>, config: &FulfillmentConfig) -> Self {
        Self::new(registry, Duration::from_millis(config.poll_interval_ms))
    }

    fn filter(query: &FillQuery) -> Filter {
        Filter::new()
            .address(H160::from_slice(query.vault.as_slice()))
            .topic0(fulfilment_topic())
            .topic1(H256(query.request_hash.0))
            .topic2(intent_id_topic(query.intent_id))
    }

    fn find_fill(query: &FillQuery, logs: &[Log]) -> Option<FillEvent> {
        logs.iter().find_map(|log| {
            FillEvent::from_log(query.chain_id, log, query.request_hash, query.intent_id)
        })
    }

    /// Search `from..=to` in bounded ranges
    async fn scan(
        provider: &ChainProvider,
        query: &FillQuery,
        from: u64,
        to: u64,
    ) -> FundingResult<Option<FillEvent>> {
        let mut start = from;
        while start <= to {
            let end = std::cmp::min(to, start + MAX_BLOCK_RANGE - 1);
            let filter = Self::filter(query).from_block(start).to_block(end);
            let logs = provider.get_logs(&filter).await?;
            if let Some(fill) = Self::find_fill(query, &logs) {
                return Ok(Some(fill));
            }
            start = end + 1;
        }
        Ok(None)
    }

    /// WebSocket subscription; the stream unsubscribes when dropped
    async fn wait_ws(&self, ws_url: &str, query: &FillQuery) -> FundingResult<FillEvent> {
        let ws = Provider::<Ws>::connect(ws_url)
            .await
            .map_err(|e| FundingError::Subscription {
                chain_id: query.chain_id,
                message: format!("WebSocket connect failed: {}", e),
            })?;

        let filter = Self::filter(query);
        let mut stream = ws
            .subscribe_logs(&filter)
            .await
            .map_err(|e| FundingError::Subscription {
                chain_id: query.chain_id,
                message: format!("Log subscription failed: {}", e),
            })?;

        info!(
            "Subscribed to fills for intent {} on chain {}",
            query.intent_id, query.chain_id
        );

        // The subscription only carries new logs; anything mined since
        // submission is read over HTTP
        let provider = self.registry.get_provider(query.chain_id)?;
        let head = provider.get_block_number().await?;
        if let Some(fill) = Self::scan(&provider, query, query.from_block, head).await? {
            return Ok(fill);
        }

        while let Some(log) = stream.next().await {
            if let Some(fill) =
                FillEvent::from_log(query.chain_id, &log, query.request_hash, query.intent_id)
            {
                return Ok(fill);
            }
            debug!("Chain {}: ignoring unrelated vault log", query.chain_id);
        }

        Err(FundingError::Subscription {
            chain_id: query.chain_id,
            message: "Log subscription closed".to_string(),
        })
    }

    /// HTTP polling from the block recorded before submission
    async fn wait_polling(&self, query: &FillQuery) -> FundingResult<FillEvent> {
        let provider = self.registry.get_provider(query.chain_id)?;
        let mut next_block = query.from_block;

        info!(
            "Polling for fills of intent {} on chain {} from block {}",
            query.intent_id, query.chain_id, next_block
        );

        loop {
            match provider.get_block_number().await {
                Ok(head) if head >= next_block => {
                    match Self::scan(&provider, query, next_block, head).await {
                        Ok(Some(fill)) => return Ok(fill),
                        Ok(None) => next_block = head + 1,
                        // Range is retried on the next tick
                        Err(e) => warn!("Failed to get logs: {}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to get block number: {}", e),
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl FillSource for EvmFillSource {
    async fn head_block(&self, chain_id: u64) -> FundingResult<u64> {
        self.registry.get_provider(chain_id)?.get_block_number().await
    }

    async fn wait_for_fill(&self, query: &FillQuery) -> FundingResult<FillEvent> {
        let chain = self.registry.chain(query.chain_id)?;

        match chain.ws_url.as_deref() {
            Some(ws_url) if !ws_url.is_empty() => self.wait_ws(ws_url, query).await,
            _ => self.wait_polling(query).await,
        }
    }
}
