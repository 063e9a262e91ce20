//! Configuration management for the RFF relayer
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::chain::ChainFamily;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub relayer: RelayerConfig,
    pub database: Option<DatabaseConfig>,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub double_check: DoubleCheckConfig,
    #[serde(default)]
    pub fulfillment: FulfillmentConfig,
    pub fees: FeeScheduleConfig,
    pub chains: HashMap<String, ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    pub instance_id: String,
    pub health_check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

/// Coordination chain REST endpoint and event layout
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    pub rest_url: String,
    pub chain_id: String,
    /// Event type emitted when an RFF is accepted
    pub rff_event_type: String,
    /// Attribute on that event carrying the assigned intent id
    #[serde(default = "default_intent_id_attribute")]
    pub intent_id_attribute: String,
    #[serde(default = "default_tx_poll_interval_ms")]
    pub tx_poll_interval_ms: u64,
    #[serde(default = "default_tx_poll_attempts")]
    pub tx_poll_attempts: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoubleCheckConfig {
    /// 1 keeps the verification pass strictly sequential
    pub max_parallel: usize,
}

impl Default for DoubleCheckConfig {
    fn default() -> Self {
        Self { max_parallel: 1 }
    }
}

/// Fill observation; the wait deadline is chosen per call
#[derive(Debug, Clone, Deserialize)]
pub struct FulfillmentConfig {
    /// HTTP polling interval for chains without a ws url
    pub poll_interval_ms: u64,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
        }
    }
}

/// Fee schedule backing the default fee store
#[derive(Debug, Clone, Deserialize)]
pub struct FeeScheduleConfig {
    pub protocol_fee_bps: u32,
    #[serde(default)]
    pub default_solver_fee_bps: u32,
    #[serde(default)]
    pub fulfilment: Vec<FulfilmentFeeConfig>,
    #[serde(default)]
    pub solver_routes: Vec<SolverRouteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FulfilmentFeeConfig {
    pub chain_id: u64,
    pub token_address: String,
    pub fee: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolverRouteConfig {
    pub source_chain_id: u64,
    pub source_token: String,
    pub destination_chain_id: u64,
    pub destination_token: String,
    pub fee_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub family: ChainFamily,
    pub rpc_urls: Vec<String>,
    pub ws_url: Option<String>,
    pub vault_address: String,
    pub enabled: bool,
}

fn default_intent_id_attribute() -> String {
    "id".to_string()
}

fn default_tx_poll_interval_ms() -> u64 {
    1000
}

fn default_tx_poll_attempts() -> u32 {
    30
}

fn default_request_timeout_secs() -> u64 {
    15
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("RFF_RELAYER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text, substituting `${VAR}` references first
    pub fn from_toml(input: &str) -> Result<Self> {
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        for (name, chain) in &self.chains {
            if chain.enabled {
                if chain.rpc_urls.is_empty() {
                    anyhow::bail!("Chain {} has no RPC URLs configured", name);
                }
                if chain.vault_address.is_empty() {
                    anyhow::bail!("Chain {} has no vault address configured", name);
                }
            }
        }

        if self.double_check.max_parallel == 0 {
            anyhow::bail!("double_check.max_parallel must be at least 1");
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }
}

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid pattern");
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
