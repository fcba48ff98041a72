//! Transaction-local read, write and node sets
//!
//! - [`WriteSet`]: buffered writes, ordered for locking at commit and
//!   indexed by `(storage, key)` for read-your-own-write lookups
//! - [`ReadSet`]: records read from shared state with the TID observed
//! - [`NodeSet`]: storage structure versions observed by scans, used for
//!   phantom detection

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;
use tessera_core::{StorageId, TidWord};
use tessera_storage::Record;

/// Kind of a buffered write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    /// New key; the record is linked in the index as a pending insert
    Insert,
    /// Replace the value of a visible record
    Update,
    /// Remove a visible record
    Delete,
}

/// One buffered write
#[derive(Debug)]
pub(crate) struct WriteEntry {
    pub storage: StorageId,
    pub record: Arc<Record>,
    pub kind: WriteKind,
    /// New value; `None` for deletes
    pub value: Option<Vec<u8>>,
    /// Tombstone TID this insert took over, restored on abort
    pub revived: Option<TidWord>,
}

impl WriteEntry {
    pub fn new(storage: StorageId, record: Arc<Record>, kind: WriteKind, value: Option<Vec<u8>>) -> Self {
        Self {
            storage,
            record,
            kind,
            value,
            revived: None,
        }
    }

    #[inline]
    pub fn key(&self) -> &[u8] {
        self.record.key()
    }
}

/// Buffered writes of one transaction
#[derive(Debug, Default)]
pub(crate) struct WriteSet {
    entries: Vec<WriteEntry>,
    positions: FxHashMap<StorageId, FxHashMap<Box<[u8]>, usize>>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, storage: StorageId, key: &[u8]) -> Option<usize> {
        self.positions.get(&storage)?.get(key).copied()
    }

    pub fn get(&self, storage: StorageId, key: &[u8]) -> Option<&WriteEntry> {
        self.position(storage, key).map(|i| &self.entries[i])
    }

    pub fn get_mut(&mut self, storage: StorageId, key: &[u8]) -> Option<&mut WriteEntry> {
        self.position(storage, key).map(move |i| &mut self.entries[i])
    }

    /// Add a write for a key not yet in the set
    ///
    /// # Panics
    ///
    /// Panics if the set already holds an entry for the same key.
    pub fn push(&mut self, entry: WriteEntry) {
        let slot = self
            .positions
            .entry(entry.storage)
            .or_default()
            .insert(entry.key().into(), self.entries.len());
        assert!(slot.is_none(), "duplicate write set entry in {}", entry.storage);
        self.entries.push(entry);
    }

    pub fn remove(&mut self, storage: StorageId, key: &[u8]) -> Option<WriteEntry> {
        let index = self.positions.get_mut(&storage)?.remove(key)?;
        let removed = self.entries.swap_remove(index);
        if let Some(moved) = self.entries.get(index) {
            if let Some(pos) = self
                .positions
                .get_mut(&moved.storage)
                .and_then(|keys| keys.get_mut(moved.record.key()))
            {
                *pos = index;
            }
        }
        Some(removed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WriteEntry> {
        self.entries.iter()
    }

    /// Whether this transaction holds `record` in its write set
    pub fn holds(&self, storage: StorageId, record: &Arc<Record>) -> bool {
        self.get(storage, record.key())
            .map_or(false, |e| Arc::ptr_eq(&e.record, record))
    }

    /// Order entries by `(storage, key)`, the global lock order
    ///
    /// # Panics
    ///
    /// Two entries with the same identity mean the set is corrupt.
    pub fn sort_for_commit(&mut self) {
        self.entries
            .sort_unstable_by(|a, b| (a.storage, a.key()).cmp(&(b.storage, b.key())));
        for pair in self.entries.windows(2) {
            if pair[0].storage == pair[1].storage && pair[0].key() == pair[1].key() {
                unreachable!("write set holds two entries for one key in {}", pair[0].storage);
            }
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if let Some(pos) = self
                .positions
                .get_mut(&entry.storage)
                .and_then(|keys| keys.get_mut(entry.record.key()))
            {
                *pos = i;
            }
        }
    }

    /// Distinct storages written, ascending
    pub fn storages(&self) -> SmallVec<[StorageId; 4]> {
        let mut ids: SmallVec<[StorageId; 4]> = self
            .positions
            .iter()
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(storage, _)| *storage)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Take every entry, leaving the set empty
    pub fn drain(&mut self) -> Vec<WriteEntry> {
        self.positions.clear();
        std::mem::take(&mut self.entries)
    }
}

/// A record read from shared state
#[derive(Debug)]
pub(crate) struct ReadEntry {
    pub storage: StorageId,
    pub record: Arc<Record>,
    pub observed: TidWord,
}

/// Reads to validate at commit
#[derive(Debug, Default)]
pub(crate) struct ReadSet {
    entries: Vec<ReadEntry>,
}

impl ReadSet {
    pub fn push(&mut self, storage: StorageId, record: Arc<Record>, observed: TidWord) {
        self.entries.push(ReadEntry {
            storage,
            record,
            observed,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReadEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Structure version observed by a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeEntry {
    pub storage: StorageId,
    pub version: u64,
    /// This transaction's own structure changes at observation time
    pub own_changes: u64,
}

/// Scan observations plus this transaction's own index changes
#[derive(Debug, Default)]
pub(crate) struct NodeSet {
    observations: Vec<NodeEntry>,
    own_changes: FxHashMap<StorageId, u64>,
}

impl NodeSet {
    /// Count an index insertion or removal made by this transaction
    pub fn record_own_change(&mut self, storage: StorageId) {
        *self.own_changes.entry(storage).or_default() += 1;
    }

    pub fn own_changes(&self, storage: StorageId) -> u64 {
        self.own_changes.get(&storage).copied().unwrap_or(0)
    }

    pub fn observe(&mut self, storage: StorageId, version: u64) {
        let own_changes = self.own_changes(storage);
        self.observations.push(NodeEntry {
            storage,
            version,
            own_changes,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeEntry> {
        self.observations.iter()
    }
}
