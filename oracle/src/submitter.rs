//! The boundary to the on-chain bridge contract.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    claims::{BridgeClaims, ClaimKind},
    transaction::TxKey,
};

/// A claim the bridge accepted as well-formed but could not act on because the destination's hot wallet lacks the
/// funds. `index` points into the claim sequence of `claim_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotEnoughFunds {
    pub claim_kind: ClaimKind,
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub not_enough_funds: Vec<NotEnoughFunds>,
}

#[async_trait]
pub trait ClaimsSubmitter: Send + Sync {
    /// Submit a batch on behalf of `start_chain_id`. An error means nothing was accepted.
    async fn submit(
        &self,
        start_chain_id: &str,
        claims: &BridgeClaims,
        gas_limit_multiplier: f64,
    ) -> Result<SubmitReceipt>;
}

/// Read access to what the bridge knows about batches.
#[async_trait]
pub trait BridgeDataFetcher: Send + Sync {
    /// The source records carried by a batch sent to `chain_id`.
    async fn batch_transactions(&self, chain_id: &str, batch_id: u64) -> Result<Vec<TxKey>>;
}

/// Tracks validator set changes on the bridge. While a new set is pending, the bridge will not accept bridging or
/// refund requests.
pub trait ValidatorSetObserver: Send + Sync {
    fn is_validator_set_pending(&self) -> bool;
}

/// Logs every batch instead of sending it. Knows of no batches or validator set changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunSubmitter;

#[async_trait]
impl ClaimsSubmitter for DryRunSubmitter {
    async fn submit(
        &self,
        start_chain_id: &str,
        claims: &BridgeClaims,
        gas_limit_multiplier: f64,
    ) -> Result<SubmitReceipt> {
        info!(
            start_chain_id,
            gas_limit_multiplier,
            claims = %serde_json::to_string(claims)?,
            "dry run: not submitting claims"
        );
        Ok(SubmitReceipt::default())
    }
}

#[async_trait]
impl BridgeDataFetcher for DryRunSubmitter {
    async fn batch_transactions(&self, _: &str, _: u64) -> Result<Vec<TxKey>> {
        Ok(vec![])
    }
}

impl ValidatorSetObserver for DryRunSubmitter {
    fn is_validator_set_pending(&self) -> bool {
        false
    }
}
