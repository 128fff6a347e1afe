//! Destination-chain confirmation state and the two ways an outbound action can expire against it.

use anyhow::Result;

use crate::cfg::ChainFamily;

/// Confirmed chain progress, maintained by the ingestion layer.
pub trait ConfirmationTracker: Send + Sync {
    /// The highest confirmed block (or slot). Zero before anything has been confirmed.
    fn last_confirmed_block(&self, chain_id: &str) -> Result<u64>;

    /// The first confirmed block (or slot) at or after `from`.
    fn first_confirmed_block_from(&self, chain_id: &str, from: u64) -> Result<Option<u64>>;
}

/// Decides whether an outbound action has outlived its time-to-live, and if so, at which block cursor its expiry is
/// reconciled.
pub trait ExpiryPredicate: Send + Sync {
    fn expired_at(
        &self,
        tracker: &dyn ConfirmationTracker,
        chain_id: &str,
        ttl: u64,
    ) -> Result<Option<u64>>;
}

/// Heights are dense, so the expiry threshold itself is the cursor once the chain has confirmed it.
#[derive(Debug, Clone, Copy)]
pub struct AccountExpiry {
    pub safety_offset: u64,
}

impl ExpiryPredicate for AccountExpiry {
    fn expired_at(
        &self,
        tracker: &dyn ConfirmationTracker,
        chain_id: &str,
        ttl: u64,
    ) -> Result<Option<u64>> {
        let threshold = ttl.saturating_add(self.safety_offset);
        let last_confirmed = tracker.last_confirmed_block(chain_id)?;
        Ok((last_confirmed >= threshold).then_some(threshold))
    }
}

/// Slots may be empty, so the cursor is the first slot that actually holds a confirmed block past the threshold.
#[derive(Debug, Clone, Copy)]
pub struct UtxoExpiry {
    pub safety_offset: u64,
}

impl ExpiryPredicate for UtxoExpiry {
    fn expired_at(
        &self,
        tracker: &dyn ConfirmationTracker,
        chain_id: &str,
        ttl: u64,
    ) -> Result<Option<u64>> {
        let from_slot = ttl.saturating_add(self.safety_offset);
        tracker.first_confirmed_block_from(chain_id, from_slot)
    }
}

pub fn expiry_for(family: ChainFamily, safety_offset: u64) -> Box<dyn ExpiryPredicate> {
    match family {
        ChainFamily::Account => Box::new(AccountExpiry { safety_offset }),
        ChainFamily::Utxo => Box::new(UtxoExpiry { safety_offset }),
    }
}
