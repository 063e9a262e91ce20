//! Chain provider with multi-RPC support and automatic failover

use crate::config::ChainConfig;
use crate::error::{FundingError, FundingResult};
use crate::events::IERC20;

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: ChainConfig) -> FundingResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(FundingError::ChainConnection {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.chain_id, next);
    }

    /// Get current block number with failover
    pub async fn get_block_number(&self) -> FundingResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!(
                        "Failed to get block number from chain {}: {}",
                        self.config.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(FundingError::ChainConnection {
            chain_id: self.config.chain_id,
            message: "All providers failed".to_string(),
        })
    }

    /// Get logs for a filter
    pub async fn get_logs(&self, filter: &Filter) -> FundingResult<Vec<Log>> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_logs(filter).await {
                Ok(logs) => return Ok(logs),
                Err(e) => {
                    warn!(
                        "Failed to get logs from chain {}: {}",
                        self.config.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(FundingError::ChainConnection {
            chain_id: self.config.chain_id,
            message: "All providers failed to get logs".to_string(),
        })
    }

    /// Read the ERC-20 allowance `owner` has granted `spender`
    pub async fn erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> FundingResult<U256> {
        let call = IERC20::allowanceCall { owner, spender };
        let tx: TypedTransaction = TransactionRequest::new()
            .to(H160::from_slice(token.as_slice()))
            .data(call.abi_encode())
            .into();

        for _ in 0..self.http_providers.len() {
            match self.http().call(&tx, None).await {
                Ok(output) => {
                    let decoded = IERC20::allowanceCall::abi_decode_returns(output.as_ref(), true)
                        .map_err(|e| FundingError::ChainConnection {
                            chain_id: self.config.chain_id,
                            message: format!("Malformed allowance response: {}", e),
                        })?;
                    return Ok(decoded._0);
                }
                Err(e) => {
                    warn!(
                        "Allowance call failed on chain {}: {}",
                        self.config.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(FundingError::ChainConnection {
            chain_id: self.config.chain_id,
            message: "All providers failed to read allowance".to_string(),
        })
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.config.chain_id, e);
                false
            }
        }
    }

    /// Get chain ID
    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }
}
