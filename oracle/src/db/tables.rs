//! This module defines the tables in our database and provides the abstractions used to interact with them.
//!
//! Each logical table may be backed by one or more concrete tables, for additional indices.

use anyhow::{Result, anyhow};
use redb::{ReadOnlyTable, ReadTransaction, ReadableTable, Table, TableDefinition, WriteTransaction};
use serde::{Serialize, de::DeserializeOwned};

use crate::transaction::{BatchInfoEvent, ChainTx, ExpectedTx, ProcessedTx, TxHash};

// Each logical table consists of:
// 1. The `TableDefinition`s backing this table.
// 2. A table `struct` holding the opened `redb` tables. It is generic so that the same struct serves both `TxRead`
// (read-only tables) and `TxWrite` (mutable tables).
// 3. An `impl` block with the read methods, generic over `ReadableTable`, so they work in either transaction.
// 4. An `impl` block with the write methods over the concrete mutable `Table`, so they only exist on a `TxWrite`.
//
// Every key starts with the length-prefixed chain ID, so all records of one chain are contiguous.

// unprocessed: chain | priority | block | tx_index | log_index | hash -> tx
const UNPROCESSED: TableDefinition<&[u8], Vec<u8>> = TableDefinition::new("unprocessed");
// pending: chain | hash -> tx
const PENDING: TableDefinition<&[u8], Vec<u8>> = TableDefinition::new("pending");
// processed: chain | hash -> processed tx
// processed_inner_action_index: chain | inner action hash -> hash
const PROCESSED: TableDefinition<&[u8], Vec<u8>> = TableDefinition::new("processed");
const PROCESSED_INNER_ACTION_INDEX: TableDefinition<&[u8], Vec<u8>> =
    TableDefinition::new("processed_inner_action_index");
// expected: chain | hash -> expected tx
const EXPECTED: TableDefinition<&[u8], Vec<u8>> = TableDefinition::new("expected");
// batch_info_events: chain | batch id | failed -> event
const BATCH_INFO_EVENTS: TableDefinition<&[u8], Vec<u8>> =
    TableDefinition::new("batch_info_events");
// confirmed_blocks: chain | block -> ()
const CONFIRMED_BLOCKS: TableDefinition<&[u8], ()> = TableDefinition::new("confirmed_blocks");

type ReadOnly = ReadOnlyTable<&'static [u8], Vec<u8>>;
type Writable<'a> = Table<'a, &'static [u8], Vec<u8>>;

fn chain_prefix(chain_id: &str) -> Result<Vec<u8>> {
    let len = u16::try_from(chain_id.len())
        .map_err(|_| anyhow!("chain ID of {} bytes is too long", chain_id.len()))?;
    let mut key = Vec::with_capacity(2 + chain_id.len() + 32);
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(chain_id.as_bytes());
    Ok(key)
}

fn hash_key(chain_id: &str, hash: &TxHash) -> Result<Vec<u8>> {
    let mut key = chain_prefix(chain_id)?;
    key.extend_from_slice(hash.as_bytes());
    Ok(key)
}

fn priority_prefix(chain_id: &str, priority: u8) -> Result<Vec<u8>> {
    let mut key = chain_prefix(chain_id)?;
    key.push(priority);
    Ok(key)
}

/// Orders unprocessed records by priority, then by their position on chain.
fn unprocessed_key(tx: &ChainTx) -> Result<Vec<u8>> {
    let mut key = priority_prefix(&tx.origin_chain_id, tx.priority)?;
    key.extend_from_slice(&tx.block_number.to_be_bytes());
    key.extend_from_slice(&tx.tx_index.to_be_bytes());
    key.extend_from_slice(&tx.log_index.to_be_bytes());
    key.extend_from_slice(tx.hash.as_bytes());
    Ok(key)
}

fn batch_info_event_key(event: &BatchInfoEvent) -> Result<Vec<u8>> {
    let mut key = chain_prefix(&event.chain_id)?;
    key.extend_from_slice(&event.batch_id.to_be_bytes());
    key.push(event.is_failed as u8);
    Ok(key)
}

fn block_key(chain_id: &str, block: u64) -> Result<Vec<u8>> {
    let mut key = chain_prefix(chain_id)?;
    key.extend_from_slice(&block.to_be_bytes());
    Ok(key)
}

fn block_from_key(key: &[u8]) -> Result<u64> {
    let bytes = key
        .len()
        .checked_sub(8)
        .map(|start| &key[start..])
        .ok_or_else(|| anyhow!("block key too short"))?;
    Ok(u64::from_be_bytes(bytes.try_into()?))
}

fn bincode() -> bincode::config::Configuration {
    bincode::config::standard()
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(value, bincode())?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode())?;
    Ok(value)
}

/// Decode every value whose key starts with `prefix`, in key order.
fn scan_prefix<T, V>(table: &T, prefix: &[u8], limit: Option<usize>) -> Result<Vec<V>>
where
    T: ReadableTable<&'static [u8], Vec<u8>>,
    V: DeserializeOwned,
{
    let mut values = Vec::new();
    for kv in table.range(prefix..)? {
        if limit.is_some_and(|limit| values.len() >= limit) {
            break;
        }
        let (key, value) = kv?;
        if !key.value().starts_with(prefix) {
            break;
        }
        values.push(decode(&value.value())?);
    }
    Ok(values)
}

pub struct UnprocessedTable<T>(T);

impl<T> UnprocessedTable<T>
where
    T: ReadableTable<&'static [u8], Vec<u8>>,
{
    pub fn by_priority(
        &self,
        chain_id: &str,
        priority: u8,
        limit: Option<usize>,
    ) -> Result<Vec<ChainTx>> {
        scan_prefix(&self.0, &priority_prefix(chain_id, priority)?, limit)
    }
}

impl UnprocessedTable<Writable<'_>> {
    /// Insert a record, or overwrite it if it is already queued.
    pub fn insert(&mut self, tx: &ChainTx) -> Result<()> {
        self.0.insert(unprocessed_key(tx)?.as_slice(), encode(tx)?)?;
        Ok(())
    }

    pub fn remove(&mut self, tx: &ChainTx) -> Result<()> {
        self.0.remove(unprocessed_key(tx)?.as_slice())?;
        Ok(())
    }
}

pub struct PendingTable<T>(T);

impl<T> PendingTable<T>
where
    T: ReadableTable<&'static [u8], Vec<u8>>,
{
    pub fn get(&self, chain_id: &str, hash: &TxHash) -> Result<Option<ChainTx>> {
        let Some(tx) = self.0.get(hash_key(chain_id, hash)?.as_slice())? else {
            return Ok(None);
        };
        Ok(Some(decode(&tx.value())?))
    }
}

impl PendingTable<Writable<'_>> {
    pub fn insert(&mut self, tx: &ChainTx) -> Result<()> {
        self.0
            .insert(hash_key(&tx.origin_chain_id, &tx.hash)?.as_slice(), encode(tx)?)?;
        Ok(())
    }

    pub fn remove(&mut self, tx: &ChainTx) -> Result<()> {
        self.0
            .remove(hash_key(&tx.origin_chain_id, &tx.hash)?.as_slice())?;
        Ok(())
    }
}

pub struct ProcessedTable<T1, T2> {
    processed: T1,
    inner_action_index: T2,
}

impl<T1, T2> ProcessedTable<T1, T2>
where
    T1: ReadableTable<&'static [u8], Vec<u8>>,
    T2: ReadableTable<&'static [u8], Vec<u8>>,
{
    pub fn by_hash(&self, chain_id: &str, hash: &TxHash) -> Result<Option<ProcessedTx>> {
        let Some(tx) = self.processed.get(hash_key(chain_id, hash)?.as_slice())? else {
            return Ok(None);
        };
        Ok(Some(decode(&tx.value())?))
    }

    pub fn by_inner_action_hash(
        &self,
        chain_id: &str,
        inner_action_hash: &TxHash,
    ) -> Result<Option<ProcessedTx>> {
        let Some(hash) = self
            .inner_action_index
            .get(hash_key(chain_id, inner_action_hash)?.as_slice())?
        else {
            return Ok(None);
        };
        let hash: [u8; 32] = hash
            .value()
            .try_into()
            .map_err(|_| anyhow!("corrupt inner action index entry"))?;
        self.by_hash(chain_id, &TxHash(hash))
    }
}

impl ProcessedTable<Writable<'_>, Writable<'_>> {
    pub fn insert(&mut self, tx: &ProcessedTx) -> Result<()> {
        let chain_id = &tx.tx.origin_chain_id;
        self.processed
            .insert(hash_key(chain_id, &tx.tx.hash)?.as_slice(), encode(tx)?)?;
        if let Some(inner_action_hash) = &tx.tx.inner_action_hash {
            self.inner_action_index.insert(
                hash_key(chain_id, inner_action_hash)?.as_slice(),
                tx.tx.hash.as_bytes().to_vec(),
            )?;
        }
        Ok(())
    }
}

pub struct ExpectedTable<T>(T);

impl<T> ExpectedTable<T>
where
    T: ReadableTable<&'static [u8], Vec<u8>>,
{
    pub fn active_by_priority(
        &self,
        chain_id: &str,
        priority: u8,
        limit: Option<usize>,
    ) -> Result<Vec<ExpectedTx>> {
        let all: Vec<ExpectedTx> = scan_prefix(&self.0, &chain_prefix(chain_id)?, None)?;
        Ok(all
            .into_iter()
            .filter(|tx| tx.priority == priority && tx.is_active())
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    pub fn get(&self, chain_id: &str, hash: &TxHash) -> Result<Option<ExpectedTx>> {
        let Some(tx) = self.0.get(hash_key(chain_id, hash)?.as_slice())? else {
            return Ok(None);
        };
        Ok(Some(decode(&tx.value())?))
    }
}

impl ExpectedTable<Writable<'_>> {
    pub fn insert(&mut self, tx: &ExpectedTx) -> Result<()> {
        self.0
            .insert(hash_key(&tx.chain_id, &tx.hash)?.as_slice(), encode(tx)?)?;
        Ok(())
    }
}

pub struct BatchInfoEventsTable<T>(T);

impl<T> BatchInfoEventsTable<T>
where
    T: ReadableTable<&'static [u8], Vec<u8>>,
{
    pub fn all(&self) -> Result<Vec<BatchInfoEvent>> {
        self.0
            .iter()?
            .map(|kv| decode(&kv?.1.value()))
            .collect()
    }
}

impl BatchInfoEventsTable<Writable<'_>> {
    pub fn insert(&mut self, event: &BatchInfoEvent) -> Result<()> {
        self.0
            .insert(batch_info_event_key(event)?.as_slice(), encode(event)?)?;
        Ok(())
    }

    pub fn remove(&mut self, event: &BatchInfoEvent) -> Result<()> {
        self.0.remove(batch_info_event_key(event)?.as_slice())?;
        Ok(())
    }
}

pub struct ConfirmedBlocksTable<T>(T);

impl<T> ConfirmedBlocksTable<T>
where
    T: ReadableTable<&'static [u8], ()>,
{
    pub fn last(&self, chain_id: &str) -> Result<Option<u64>> {
        let start = block_key(chain_id, 0)?;
        let end = block_key(chain_id, u64::MAX)?;
        let Some(kv) = self.0.range(start.as_slice()..=end.as_slice())?.next_back() else {
            return Ok(None);
        };
        Ok(Some(block_from_key(kv?.0.value())?))
    }

    pub fn first_from(&self, chain_id: &str, from: u64) -> Result<Option<u64>> {
        let start = block_key(chain_id, from)?;
        let end = block_key(chain_id, u64::MAX)?;
        let Some(kv) = self.0.range(start.as_slice()..=end.as_slice())?.next() else {
            return Ok(None);
        };
        Ok(Some(block_from_key(kv?.0.value())?))
    }
}

impl ConfirmedBlocksTable<Table<'_, &'static [u8], ()>> {
    pub fn insert(&mut self, chain_id: &str, block: u64) -> Result<()> {
        self.0.insert(block_key(chain_id, block)?.as_slice(), ())?;
        Ok(())
    }
}

pub struct TxRead(pub(super) ReadTransaction);

impl TxRead {
    pub fn unprocessed(&self) -> Result<UnprocessedTable<ReadOnly>> {
        Ok(UnprocessedTable(self.0.open_table(UNPROCESSED)?))
    }

    pub fn pending(&self) -> Result<PendingTable<ReadOnly>> {
        Ok(PendingTable(self.0.open_table(PENDING)?))
    }

    pub fn processed(&self) -> Result<ProcessedTable<ReadOnly, ReadOnly>> {
        Ok(ProcessedTable {
            processed: self.0.open_table(PROCESSED)?,
            inner_action_index: self.0.open_table(PROCESSED_INNER_ACTION_INDEX)?,
        })
    }

    pub fn expected(&self) -> Result<ExpectedTable<ReadOnly>> {
        Ok(ExpectedTable(self.0.open_table(EXPECTED)?))
    }

    pub fn batch_info_events(&self) -> Result<BatchInfoEventsTable<ReadOnly>> {
        Ok(BatchInfoEventsTable(self.0.open_table(BATCH_INFO_EVENTS)?))
    }

    pub fn confirmed_blocks(
        &self,
    ) -> Result<ConfirmedBlocksTable<ReadOnlyTable<&'static [u8], ()>>> {
        Ok(ConfirmedBlocksTable(self.0.open_table(CONFIRMED_BLOCKS)?))
    }
}

pub struct TxWrite(pub(super) WriteTransaction);

impl TxWrite {
    pub fn commit(self) -> Result<()> {
        self.0.commit()?;
        Ok(())
    }

    pub fn unprocessed(&self) -> Result<UnprocessedTable<Writable<'_>>> {
        Ok(UnprocessedTable(self.0.open_table(UNPROCESSED)?))
    }

    pub fn pending(&self) -> Result<PendingTable<Writable<'_>>> {
        Ok(PendingTable(self.0.open_table(PENDING)?))
    }

    pub fn processed(&self) -> Result<ProcessedTable<Writable<'_>, Writable<'_>>> {
        Ok(ProcessedTable {
            processed: self.0.open_table(PROCESSED)?,
            inner_action_index: self.0.open_table(PROCESSED_INNER_ACTION_INDEX)?,
        })
    }

    pub fn expected(&self) -> Result<ExpectedTable<Writable<'_>>> {
        Ok(ExpectedTable(self.0.open_table(EXPECTED)?))
    }

    pub fn batch_info_events(&self) -> Result<BatchInfoEventsTable<Writable<'_>>> {
        Ok(BatchInfoEventsTable(self.0.open_table(BATCH_INFO_EVENTS)?))
    }

    pub fn confirmed_blocks(
        &self,
    ) -> Result<ConfirmedBlocksTable<Table<'_, &'static [u8], ()>>> {
        Ok(ConfirmedBlocksTable(self.0.open_table(CONFIRMED_BLOCKS)?))
    }

    pub fn create_all(&self) -> Result<()> {
        self.unprocessed()?;
        self.pending()?;
        self.processed()?;
        self.expected()?;
        self.batch_info_events()?;
        self.confirmed_blocks()?;
        Ok(())
    }
}
