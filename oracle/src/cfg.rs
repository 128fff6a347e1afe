use std::{collections::BTreeSet, fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::transaction::ChainId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleConfig {
    /// The location of persistence data. If not set, uses a temporary in-memory store.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Delay before each reconciliation round.
    #[serde(default = "tick_time_default")]
    pub tick_time: Duration,
    /// Every chain this oracle observes.
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub bridging: BridgingSettings,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    /// Number of destination blocks past an outbound action's time-to-live before it is considered expired.
    #[serde(default = "expiry_safety_offset_default")]
    pub expiry_safety_offset: u64,
    #[serde(default)]
    pub retry_unprocessed: RetryUnprocessedSettings,
    #[serde(default)]
    pub try_count_limits: TryCountLimits,
    /// The base address of the OTLP collector. If not set, metrics will not be exported.
    #[serde(default)]
    pub otlp_collector_endpoint: Option<String>,
}

impl OracleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(anyhow!("at least one chain must be configured"));
        }
        let mut seen = BTreeSet::new();
        for chain in &self.chains {
            if !seen.insert(&chain.chain_id) {
                return Err(anyhow!("chain {} is configured twice", chain.chain_id));
            }
        }
        if self.bridging.max_bridging_claims_to_group == 0 {
            return Err(anyhow!("max_bridging_claims_to_group must be at least 1"));
        }
        if self.throttle.gas_limit_multiplier_increment <= 0.0 {
            return Err(anyhow!("gas_limit_multiplier_increment must be positive"));
        }
        if self.throttle.gas_limit_multiplier_default > self.throttle.gas_limit_multiplier_max {
            return Err(anyhow!(
                "gas_limit_multiplier_default ({}) exceeds gas_limit_multiplier_max ({})",
                self.throttle.gas_limit_multiplier_default,
                self.throttle.gas_limit_multiplier_max
            ));
        }
        if self.retry_unprocessed.base_timeout > self.retry_unprocessed.max_timeout {
            return Err(anyhow!("retry base_timeout exceeds max_timeout"));
        }
        Ok(())
    }

    pub fn chain(&self, chain_id: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    /// Configured chain IDs in a deterministic order.
    pub fn sorted_chain_ids(&self) -> Vec<ChainId> {
        let mut ids: Vec<_> = self.chains.iter().map(|c| c.chain_id.clone()).collect();
        ids.sort();
        ids
    }
}

pub fn tick_time_default() -> Duration {
    Duration::from_millis(2000)
}

pub fn expiry_safety_offset_default() -> u64 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFamily {
    /// Block positions are slots, outbound actions expire at the first confirmed slot past their TTL.
    Utxo,
    /// Block positions are heights, outbound actions expire once the confirmed height passes their TTL.
    Account,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub family: ChainFamily,
    /// The multisig address which receives bridging deposits on this chain.
    pub bridging_address: String,
    /// Receivers paid to this address are counted as bridging fee.
    #[serde(default)]
    pub fee_address: String,
    #[serde(default = "min_fee_for_bridging_default")]
    pub min_fee_for_bridging: u64,
    /// Smallest amount a single receiver may be sent on this chain.
    #[serde(default = "min_utxo_amount_default")]
    pub min_utxo_amount: u64,
}

pub fn min_fee_for_bridging_default() -> u64 {
    1_000_010
}

pub fn min_utxo_amount_default() -> u64 {
    1_000_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgingSettings {
    /// Default upper bound on the number of claims submitted together.
    #[serde(default = "max_bridging_claims_to_group_default")]
    pub max_bridging_claims_to_group: usize,
    #[serde(default = "max_receivers_per_bridging_request_default")]
    pub max_receivers_per_bridging_request: usize,
    /// Whether rejected bridging requests are turned into refund claims.
    #[serde(default)]
    pub refund_enabled: bool,
}

impl Default for BridgingSettings {
    fn default() -> Self {
        BridgingSettings {
            max_bridging_claims_to_group: max_bridging_claims_to_group_default(),
            max_receivers_per_bridging_request: max_receivers_per_bridging_request_default(),
            refund_enabled: false,
        }
    }
}

pub fn max_bridging_claims_to_group_default() -> usize {
    10
}

pub fn max_receivers_per_bridging_request_default() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThrottleConfig {
    #[serde(default = "gas_limit_multiplier_default")]
    pub gas_limit_multiplier_default: f64,
    /// Added to the multiplier each time a single-claim submission fails.
    #[serde(default = "gas_limit_multiplier_increment_default")]
    pub gas_limit_multiplier_increment: f64,
    #[serde(default = "gas_limit_multiplier_max_default")]
    pub gas_limit_multiplier_max: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        ThrottleConfig {
            gas_limit_multiplier_default: gas_limit_multiplier_default(),
            gas_limit_multiplier_increment: gas_limit_multiplier_increment_default(),
            gas_limit_multiplier_max: gas_limit_multiplier_max_default(),
        }
    }
}

pub fn gas_limit_multiplier_default() -> f64 {
    1.0
}

pub fn gas_limit_multiplier_increment_default() -> f64 {
    0.5
}

pub fn gas_limit_multiplier_max_default() -> f64 {
    3.0
}

/// Backoff for records returned to the unprocessed queue. The n-th retry waits `min(base * 2^(n-1), max)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryUnprocessedSettings {
    #[serde(default = "retry_base_timeout_default")]
    pub base_timeout: Duration,
    #[serde(default = "retry_max_timeout_default")]
    pub max_timeout: Duration,
}

impl Default for RetryUnprocessedSettings {
    fn default() -> Self {
        RetryUnprocessedSettings {
            base_timeout: retry_base_timeout_default(),
            max_timeout: retry_max_timeout_default(),
        }
    }
}

pub fn retry_base_timeout_default() -> Duration {
    Duration::from_secs(60)
}

pub fn retry_max_timeout_default() -> Duration {
    Duration::from_secs(60 * 60)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TryCountLimits {
    #[serde(default = "try_count_default")]
    pub max_batch_try_count: u32,
    #[serde(default = "try_count_default")]
    pub max_submit_try_count: u32,
    #[serde(default = "try_count_default")]
    pub max_refund_try_count: u32,
}

impl Default for TryCountLimits {
    fn default() -> Self {
        TryCountLimits {
            max_batch_try_count: try_count_default(),
            max_submit_try_count: try_count_default(),
            max_refund_try_count: try_count_default(),
        }
    }
}

pub fn try_count_default() -> u32 {
    3
}

pub fn read_config(path: impl AsRef<Path>) -> Result<OracleConfig> {
    let path = path.as_ref();
    let config = fs::read_to_string(path).with_context(|| format!("Unable to read {path:?}"))?;
    let config: OracleConfig = toml::from_str(&config)?;
    config.validate()?;
    Ok(config)
}
