mod tables;

use std::{fs, path::Path};

use anyhow::{Context, Result};
use redb::{Database, backends::InMemoryBackend};
use tracing::{debug, info};

pub use self::tables::{TxRead, TxWrite};
use crate::{
    store::{TxStore, TxTransitions},
    tracker::ConfirmationTracker,
    transaction::{BatchInfoEvent, ChainTx, ExpectedTx, ProcessedTx, TxHash},
};

/// Transaction queues, expected outbound actions and confirmed chain progress, backed by `redb`.
///
/// Readers never block the writer, so ingestion can keep appending while a round reads.
pub struct Db {
    db: Database,
}

impl Db {
    /// Open (or create) the database under `data_dir`. Without a data directory the database lives in memory.
    pub fn new<P>(data_dir: Option<P>) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let db = match data_dir {
            Some(path) => {
                let path = path.as_ref();
                fs::create_dir_all(path).context(format!("Unable to create {path:?}"))?;
                Database::builder()
                    .set_repair_callback(|repair| {
                        info!(progress = repair.progress(), "repairing database");
                    })
                    .create(path.join("oracle.redb"))?
            }
            None => Database::builder().create_with_backend(InMemoryBackend::new())?,
        };
        let db = Db { db };

        // Ensure tables exist.
        let write = db.write()?;
        write.create_all()?;
        write.commit()?;

        Ok(db)
    }

    /// Begin a read transaction. It sees a consistent snapshot of the committed state.
    pub fn read(&self) -> Result<TxRead> {
        Ok(TxRead(self.db.begin_read()?))
    }

    /// Begin a write transaction.
    ///
    /// Only a single write may be in progress at a time. If a write is in progress, this function will block until it
    /// completes. Nothing is persisted until [TxWrite::commit] is called.
    pub fn write(&self) -> Result<TxWrite> {
        let mut tx = self.db.begin_write()?;
        tx.set_quick_repair(true);
        Ok(TxWrite(tx))
    }

    /// Queue newly observed transactions.
    pub fn add_unprocessed(&self, txs: &[ChainTx]) -> Result<()> {
        let write = self.write()?;
        {
            let mut unprocessed = write.unprocessed()?;
            for tx in txs {
                unprocessed.insert(tx)?;
            }
        }
        write.commit()
    }

    /// Start watching outbound actions.
    pub fn add_expected(&self, txs: &[ExpectedTx]) -> Result<()> {
        let write = self.write()?;
        {
            let mut expected = write.expected()?;
            for tx in txs {
                expected.insert(tx)?;
            }
        }
        write.commit()
    }

    pub fn record_confirmed_block(&self, chain_id: &str, block: u64) -> Result<()> {
        let write = self.write()?;
        write.confirmed_blocks()?.insert(chain_id, block)?;
        write.commit()
    }

    pub fn expected_by_hash(&self, chain_id: &str, hash: &TxHash) -> Result<Option<ExpectedTx>> {
        self.read()?.expected()?.get(chain_id, hash)
    }
}

impl TxStore for Db {
    fn fetch_unprocessed(
        &self,
        chain_id: &str,
        priority: u8,
        limit: Option<usize>,
    ) -> Result<Vec<ChainTx>> {
        self.read()?
            .unprocessed()?
            .by_priority(chain_id, priority, limit)
    }

    fn fetch_expected(
        &self,
        chain_id: &str,
        priority: u8,
        limit: Option<usize>,
    ) -> Result<Vec<ExpectedTx>> {
        self.read()?
            .expected()?
            .active_by_priority(chain_id, priority, limit)
    }

    fn processed_by_hash(&self, chain_id: &str, hash: &TxHash) -> Result<Option<ProcessedTx>> {
        self.read()?.processed()?.by_hash(chain_id, hash)
    }

    fn processed_by_inner_action_hash(
        &self,
        chain_id: &str,
        inner_action_hash: &TxHash,
    ) -> Result<Option<ProcessedTx>> {
        self.read()?
            .processed()?
            .by_inner_action_hash(chain_id, inner_action_hash)
    }

    fn pending_by_hash(&self, chain_id: &str, hash: &TxHash) -> Result<Option<ChainTx>> {
        self.read()?.pending()?.get(chain_id, hash)
    }

    fn batch_info_events(&self) -> Result<Vec<BatchInfoEvent>> {
        self.read()?.batch_info_events()?.all()
    }

    fn apply_transitions(&self, transitions: &TxTransitions) -> Result<()> {
        let write = self.write()?;
        {
            let mut expected = write.expected()?;
            for tx in &transitions.expected_invalid {
                let mut tx = expected.get(&tx.chain_id, &tx.hash)?.unwrap_or_else(|| tx.clone());
                tx.is_invalid = true;
                expected.insert(&tx)?;
            }
            for tx in &transitions.expected_processed {
                let mut tx = expected.get(&tx.chain_id, &tx.hash)?.unwrap_or_else(|| tx.clone());
                tx.is_processed = true;
                expected.insert(&tx)?;
            }

            let mut unprocessed = write.unprocessed()?;
            let mut pending = write.pending()?;
            let mut processed = write.processed()?;

            for tx in &transitions.update_unprocessed {
                unprocessed.insert(tx)?;
            }
            for tx in &transitions.move_unprocessed_to_pending {
                unprocessed.remove(tx)?;
                pending.insert(tx)?;
            }
            for tx in &transitions.move_unprocessed_to_processed {
                unprocessed.remove(&tx.tx)?;
                processed.insert(tx)?;
            }
            for tx in &transitions.move_pending_to_unprocessed {
                pending.remove(tx)?;
                unprocessed.insert(tx)?;
            }
            for tx in &transitions.move_pending_to_processed {
                pending.remove(&tx.tx)?;
                processed.insert(tx)?;
            }

            let mut events = write.batch_info_events()?;
            for event in &transitions.add_batch_info_events {
                events.insert(event)?;
            }
            for event in &transitions.remove_batch_info_events {
                events.remove(event)?;
            }
        }
        write.commit()?;

        debug!(
            processed = transitions.move_unprocessed_to_processed.len()
                + transitions.move_pending_to_processed.len(),
            pending = transitions.move_unprocessed_to_pending.len(),
            requeued = transitions.move_pending_to_unprocessed.len(),
            "applied transitions"
        );
        Ok(())
    }
}

impl ConfirmationTracker for Db {
    fn last_confirmed_block(&self, chain_id: &str) -> Result<u64> {
        Ok(self
            .read()?
            .confirmed_blocks()?
            .last(chain_id)?
            .unwrap_or_default())
    }

    fn first_confirmed_block_from(&self, chain_id: &str, from: u64) -> Result<Option<u64>> {
        self.read()?.confirmed_blocks()?.first_from(chain_id, from)
    }
}
