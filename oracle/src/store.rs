use anyhow::Result;

use crate::transaction::{BatchInfoEvent, ChainTx, ExpectedTx, ProcessedTx, TxHash};

/// Every record state change produced by one round. Applied to the store in a single transaction.
#[derive(Debug, Clone, Default)]
pub struct TxTransitions {
    pub expected_invalid: Vec<ExpectedTx>,
    pub expected_processed: Vec<ExpectedTx>,
    /// Unprocessed records which stay queued but with new try counts or timestamps.
    pub update_unprocessed: Vec<ChainTx>,
    pub move_unprocessed_to_pending: Vec<ChainTx>,
    pub move_unprocessed_to_processed: Vec<ProcessedTx>,
    pub move_pending_to_unprocessed: Vec<ChainTx>,
    pub move_pending_to_processed: Vec<ProcessedTx>,
    pub add_batch_info_events: Vec<BatchInfoEvent>,
    pub remove_batch_info_events: Vec<BatchInfoEvent>,
}

impl TxTransitions {
    pub fn is_empty(&self) -> bool {
        self.expected_invalid.is_empty()
            && self.expected_processed.is_empty()
            && self.update_unprocessed.is_empty()
            && self.move_unprocessed_to_pending.is_empty()
            && self.move_unprocessed_to_processed.is_empty()
            && self.move_pending_to_unprocessed.is_empty()
            && self.move_pending_to_processed.is_empty()
            && self.add_batch_info_events.is_empty()
            && self.remove_batch_info_events.is_empty()
    }
}

/// Persisted record queues. The ingestion layer writes new records concurrently; the scheduler is the only caller of
/// [TxStore::apply_transitions].
pub trait TxStore: Send + Sync {
    /// Unprocessed records of one priority, in block order. A `limit` of `None` returns all of them.
    fn fetch_unprocessed(
        &self,
        chain_id: &str,
        priority: u8,
        limit: Option<usize>,
    ) -> Result<Vec<ChainTx>>;

    /// Expected records of one priority which are neither processed nor invalid, ordered by hash.
    fn fetch_expected(
        &self,
        chain_id: &str,
        priority: u8,
        limit: Option<usize>,
    ) -> Result<Vec<ExpectedTx>>;

    fn processed_by_hash(&self, chain_id: &str, hash: &TxHash) -> Result<Option<ProcessedTx>>;

    fn processed_by_inner_action_hash(
        &self,
        chain_id: &str,
        inner_action_hash: &TxHash,
    ) -> Result<Option<ProcessedTx>>;

    fn pending_by_hash(&self, chain_id: &str, hash: &TxHash) -> Result<Option<ChainTx>>;

    fn batch_info_events(&self) -> Result<Vec<BatchInfoEvent>>;

    /// Apply every transition or none of them.
    fn apply_transitions(&self, transitions: &TxTransitions) -> Result<()>;
}
