//! Records observed on, or dispatched towards, the bridged chains.
//!
//! A [ChainTx] moves through three queues: it is created unprocessed by the ingestion layer, becomes pending once a
//! claim for it has been accepted by the bridge but has not yet been executed, and ends up processed (valid or
//! invalid). A failed execution sends a pending record back to the unprocessed queue with its try counts bumped.
//!
//! An [ExpectedTx] is an outbound action which we wait to see confirmed on its destination chain before its
//! time-to-live runs out.

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
    time::{Duration, SystemTime},
};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::cfg::RetryUnprocessedSettings;

pub type ChainId = String;

/// Expedited records are reconciled before normal ones.
pub const PRIORITY_EXPEDITED: u8 = 0;
pub const PRIORITY_NORMAL: u8 = 1;
pub const LAST_PROCESSING_PRIORITY: u8 = PRIORITY_NORMAL;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

/// Stands in for the source record of a hot wallet defund carried in a batch.
pub const DEFUND_TX_HASH: TxHash = TxHash(*b"defund-defund-defund-defund-defu");

impl TxHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Display for TxHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl FromStr for TxHash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut bytes)
            .map_err(|e| anyhow!("invalid tx hash {s:?}: {e}"))?;
        Ok(TxHash(bytes))
    }
}

impl From<[u8; 32]> for TxHash {
    fn from(bytes: [u8; 32]) -> Self {
        TxHash(bytes)
    }
}

/// Identifies a record independently of its queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxKey {
    pub chain_id: ChainId,
    pub hash: TxHash,
}

impl TxKey {
    pub fn new(chain_id: impl Into<ChainId>, hash: TxHash) -> Self {
        TxKey {
            chain_id: chain_id.into(),
            hash,
        }
    }
}

impl Display for TxKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chain_id, self.hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTx {
    pub origin_chain_id: ChainId,
    pub hash: TxHash,
    pub priority: u8,
    /// Block number (account chains) or slot (UTXO chains) the transaction was included in.
    pub block_number: u64,
    pub tx_index: u32,
    pub log_index: u32,
    pub value: u128,
    /// The address the value was sent to.
    pub receiver: String,
    /// JSON metadata carrying a `t` type tag. Empty for plain transfers.
    pub metadata: Vec<u8>,
    /// On account chains, the hash of the outbound action this event reports on.
    pub inner_action_hash: Option<TxHash>,
    pub submit_try_count: u32,
    pub batch_try_count: u32,
    pub refund_try_count: u32,
    pub last_time_tried: Option<SystemTime>,
}

impl ChainTx {
    pub fn key(&self) -> TxKey {
        TxKey::new(self.origin_chain_id.clone(), self.hash)
    }

    /// The key of the outbound action this record proves executed.
    pub fn action_key(&self) -> TxKey {
        TxKey::new(
            self.origin_chain_id.clone(),
            self.inner_action_hash.unwrap_or(self.hash),
        )
    }

    /// Whether enough time has passed since the last failed attempt for this record to be claimed again.
    pub fn is_ready(&self, now: SystemTime, settings: &RetryUnprocessedSettings) -> bool {
        let Some(last_time_tried) = self.last_time_tried else {
            return true;
        };
        let backoff = retry_backoff(self.submit_try_count, settings);
        now.duration_since(last_time_tried)
            .is_ok_and(|elapsed| elapsed >= backoff)
    }

    pub fn into_processed(self, is_invalid: bool) -> ProcessedTx {
        ProcessedTx {
            tx: self,
            is_invalid,
        }
    }
}

impl Display for ChainTx {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (block {}, priority {})",
            self.key(),
            self.block_number,
            self.priority
        )
    }
}

pub fn retry_backoff(try_count: u32, settings: &RetryUnprocessedSettings) -> Duration {
    let exponent = try_count.saturating_sub(1).min(31);
    settings
        .base_timeout
        .checked_mul(1 << exponent)
        .unwrap_or(settings.max_timeout)
        .min(settings.max_timeout)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedTx {
    pub tx: ChainTx,
    pub is_invalid: bool,
}

impl ProcessedTx {
    pub fn key(&self) -> TxKey {
        self.tx.key()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedTx {
    /// The destination chain the action was sent to.
    pub chain_id: ChainId,
    pub hash: TxHash,
    pub metadata: Vec<u8>,
    /// The last destination block (or slot) at which the action may still be included.
    pub ttl: u64,
    pub priority: u8,
    pub is_processed: bool,
    pub is_invalid: bool,
}

impl ExpectedTx {
    pub fn key(&self) -> TxKey {
        TxKey::new(self.chain_id.clone(), self.hash)
    }

    pub fn is_active(&self) -> bool {
        !self.is_processed && !self.is_invalid
    }
}

/// The outcome of a batch we claimed as executed or failed, together with the source records it carried. Saved when
/// the claims are submitted and applied to those records at the start of the next round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfoEvent {
    /// The chain the batch was executed on.
    pub chain_id: ChainId,
    pub batch_id: u64,
    pub dst_tx_hash: TxHash,
    pub is_failed: bool,
    pub txs: Vec<TxKey>,
}
