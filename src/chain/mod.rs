//! Chain module - chain families, address codecs and per-chain providers
//!
//! This module provides:
//! - Chain family tags shared by requests and signatures
//! - Address conversion between native and universal forms
//! - Multi-RPC provider management with automatic failover
//! - On-chain allowance lookups for deposit assembly

pub mod codec;
pub mod provider;

pub use codec::{codec_for, AddressCodec, EvmCodec, FuelCodec};
pub use provider::ChainProvider;

use crate::config::{ChainConfig, Settings};
use crate::error::{FundingError, FundingResult};

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Class of chains sharing an address and transaction encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Fuel,
}

impl ChainFamily {
    /// Universe tag used inside requests and signature data
    pub fn universe(self) -> u8 {
        match self {
            ChainFamily::Evm => 0,
            ChainFamily::Fuel => 1,
        }
    }

    /// Reverse of [`ChainFamily::universe`]
    pub fn from_universe(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ChainFamily::Evm),
            1 => Some(ChainFamily::Fuel),
            _ => None,
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainFamily::Evm => write!(f, "evm"),
            ChainFamily::Fuel => write!(f, "fuel"),
        }
    }
}

/// One allowance to look up before depositing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceQuery {
    pub chain_id: u64,
    pub token: Address,
    pub holder: Address,
    pub spender: Address,
}

/// Reads current token allowances granted to vault contracts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AllowanceReader: Send + Sync {
    /// Allowance per chain ID for each query
    async fn allowances(&self, queries: &[AllowanceQuery]) -> FundingResult<HashMap<u64, U256>>;
}

/// Known chains, indexed by chain ID
pub struct ChainRegistry {
    /// Chain configurations indexed by chain ID
    chains: DashMap<u64, ChainConfig>,
    /// Chain providers indexed by chain ID
    providers: DashMap<u64, Arc<ChainProvider>>,
}

impl ChainRegistry {
    /// Create a registry with providers for all enabled chains
    pub fn new(settings: &Settings) -> FundingResult<Self> {
        Self::connect(
            settings
                .enabled_chains()
                .into_iter()
                .map(|(_, c)| c.clone())
                .collect(),
        )
    }

    /// Registry with an HTTP provider per EVM chain
    ///
    /// Vault addresses are checked with their family's codec up front.
    pub fn connect(configs: Vec<ChainConfig>) -> FundingResult<Self> {
        let registry = Self::from_configs(configs);

        for entry in registry.chains.iter() {
            let chain_config = entry.value();
            if !chain_config.vault_address.is_empty() {
                codec_for(chain_config.family).to_universal(&chain_config.vault_address)?;
            }

            if chain_config.family != ChainFamily::Evm {
                warn!(
                    "Chain {} is {} - no RPC provider attached",
                    chain_config.name, chain_config.family
                );
                continue;
            }

            let provider = ChainProvider::new(chain_config.clone())?;
            registry
                .providers
                .insert(chain_config.chain_id, Arc::new(provider));

            info!(
                "Chain {} (ID: {}) registered",
                chain_config.name, chain_config.chain_id
            );
        }

        Ok(registry)
    }

    /// Registry without providers, for pure lookups
    pub fn from_configs(configs: Vec<ChainConfig>) -> Self {
        let chains = DashMap::new();
        for config in configs {
            chains.insert(config.chain_id, config);
        }
        Self {
            chains,
            providers: DashMap::new(),
        }
    }

    /// Get chain config by ID
    pub fn chain(&self, chain_id: u64) -> FundingResult<ChainConfig> {
        self.chains
            .get(&chain_id)
            .map(|c| c.clone())
            .ok_or(FundingError::UnknownChain { chain_id })
    }

    /// Family of a known chain
    pub fn family(&self, chain_id: u64) -> FundingResult<ChainFamily> {
        Ok(self.chain(chain_id)?.family)
    }

    /// Address codec for a known chain
    pub fn codec(&self, chain_id: u64) -> FundingResult<&'static dyn AddressCodec> {
        Ok(codec_for(self.family(chain_id)?))
    }

    /// Vault address of an EVM chain
    pub fn vault_address(&self, chain_id: u64) -> FundingResult<Address> {
        let chain = self.chain(chain_id)?;
        if chain.vault_address.is_empty() {
            return Err(FundingError::UnknownVault { chain_id });
        }
        chain
            .vault_address
            .parse::<Address>()
            .map_err(|_| FundingError::UnknownVault { chain_id })
    }

    /// Get provider for a specific chain
    pub fn get_provider(&self, chain_id: u64) -> FundingResult<Arc<ChainProvider>> {
        self.providers
            .get(&chain_id)
            .map(|p| p.clone())
            .ok_or(FundingError::UnknownChain { chain_id })
    }

    /// Health check for all chains with a provider
    pub async fn health_check(&self) -> Vec<(u64, bool)> {
        let providers: Vec<_> = self
            .providers
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();

        let mut results = Vec::new();
        for (chain_id, provider) in providers {
            let healthy = provider.health_check().await;
            results.push((chain_id, healthy));

            crate::metrics::record_chain_health(chain_id, healthy);
        }

        results
    }

    /// Get all registered chain IDs
    pub fn connected_chains(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.chains.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl AllowanceReader for ChainRegistry {
    async fn allowances(&self, queries: &[AllowanceQuery]) -> FundingResult<HashMap<u64, U256>> {
        let mut result = HashMap::new();
        for query in queries {
            let provider = self.get_provider(query.chain_id)?;
            let allowance = provider
                .erc20_allowance(query.token, query.holder, query.spender)
                .await?;
            result.insert(query.chain_id, allowance);
        }
        Ok(result)
    }
}
