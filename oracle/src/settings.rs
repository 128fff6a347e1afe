use std::collections::BTreeMap;

use crate::{cfg::OracleConfig, transaction::ChainId};

/// Submission limits for rounds started by one chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainThrottle {
    pub max_claims_to_group: usize,
    pub gas_limit_multiplier: f64,
}

/// Per-chain throttle state, tuned by submission outcomes only.
///
/// A failed submission shrinks the group size towards one; once a single claim still fails, the gas multiplier is
/// raised instead, up to its ceiling. A successful submission restores the defaults.
#[derive(Debug, Clone)]
pub struct ThrottleSettings {
    default: ChainThrottle,
    multiplier_increment: f64,
    multiplier_max: f64,
    chains: BTreeMap<ChainId, ChainThrottle>,
}

impl ThrottleSettings {
    pub fn new(config: &OracleConfig) -> Self {
        let default = ChainThrottle {
            max_claims_to_group: config.bridging.max_bridging_claims_to_group.max(1),
            gas_limit_multiplier: config.throttle.gas_limit_multiplier_default,
        };
        ThrottleSettings {
            default,
            multiplier_increment: config.throttle.gas_limit_multiplier_increment,
            multiplier_max: config.throttle.gas_limit_multiplier_max,
            chains: config
                .chains
                .iter()
                .map(|c| (c.chain_id.clone(), default))
                .collect(),
        }
    }

    pub fn get(&self, chain_id: &str) -> ChainThrottle {
        self.chains.get(chain_id).copied().unwrap_or(self.default)
    }

    pub fn on_submit_claims_failed(&mut self, chain_id: &str, claims_count: usize) {
        let (increment, max) = (self.multiplier_increment, self.multiplier_max);
        let throttle = self
            .chains
            .entry(chain_id.to_owned())
            .or_insert(self.default);

        throttle.max_claims_to_group = claims_count.saturating_sub(1).max(1);
        if claims_count <= 1 {
            throttle.gas_limit_multiplier = (throttle.gas_limit_multiplier + increment).min(max);
        }
    }

    pub fn reset(&mut self, chain_id: &str) {
        self.chains.insert(chain_id.to_owned(), self.default);
    }
}
