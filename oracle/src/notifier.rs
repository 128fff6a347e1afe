//! Lifecycle notifications for bridging requests. Every notification is best-effort: callers log failures and carry
//! on.

use anyhow::Result;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::transaction::{ChainId, TxHash, TxKey};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BridgingRequestStateKey {
    pub source_chain_id: ChainId,
    pub tx_hash: TxHash,
}

impl From<TxKey> for BridgingRequestStateKey {
    fn from(key: TxKey) -> Self {
        BridgingRequestStateKey {
            source_chain_id: key.chain_id,
            tx_hash: key.hash,
        }
    }
}

pub trait BridgingRequestStateNotifier: Send + Sync {
    fn submitted_to_bridge(&self, keys: &[BridgingRequestStateKey]) -> Result<()>;

    fn executed_on_destination(
        &self,
        keys: &[BridgingRequestStateKey],
        dst_tx_hash: TxHash,
        dst_chain_id: &str,
    ) -> Result<()>;

    fn failed_to_execute_on_destination(
        &self,
        keys: &[BridgingRequestStateKey],
        dst_chain_id: &str,
    ) -> Result<()>;

    fn invalid(&self, keys: &[BridgingRequestStateKey]) -> Result<()>;
}

/// Writes each notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

fn hashes(keys: &[BridgingRequestStateKey]) -> String {
    keys.iter()
        .map(|key| format!("{}/{}", key.source_chain_id, key.tx_hash))
        .join(", ")
}

impl BridgingRequestStateNotifier for LoggingNotifier {
    fn submitted_to_bridge(&self, keys: &[BridgingRequestStateKey]) -> Result<()> {
        info!(txs = %hashes(keys), "submitted to bridge");
        Ok(())
    }

    fn executed_on_destination(
        &self,
        keys: &[BridgingRequestStateKey],
        dst_tx_hash: TxHash,
        dst_chain_id: &str,
    ) -> Result<()> {
        info!(txs = %hashes(keys), %dst_tx_hash, dst_chain_id, "executed on destination");
        Ok(())
    }

    fn failed_to_execute_on_destination(
        &self,
        keys: &[BridgingRequestStateKey],
        dst_chain_id: &str,
    ) -> Result<()> {
        info!(txs = %hashes(keys), dst_chain_id, "failed to execute on destination");
        Ok(())
    }

    fn invalid(&self, keys: &[BridgingRequestStateKey]) -> Result<()> {
        info!(txs = %hashes(keys), "invalid");
        Ok(())
    }
}
