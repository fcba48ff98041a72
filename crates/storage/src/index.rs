//! Ordered key index
//!
//! The concurrency layer does not own the key -> record mapping; it consumes
//! it through the [`Index`] trait. The index owns linkage (which record a key
//! currently maps to), while records themselves are shared `Arc`s whose
//! contents the concurrency layer reads and locks.
//!
//! Each storage also exposes a structure version, bumped on every insertion
//! and removal, which range readers use for phantom detection.
//!
//! [`SkipListIndex`] is the default implementation: a `DashMap` of storages,
//! each an ordered lock-free `SkipMap`.

use crate::record::Record;
use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_core::StorageId;
use thiserror::Error;

/// Index failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndexError {
    /// No storage with this id
    #[error("storage {0} not found")]
    StorageNotFound(StorageId),
}

impl From<IndexError> for tessera_core::Error {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::StorageNotFound(_) => tessera_core::Error::StorageNotFound,
        }
    }
}

/// Result type for index operations
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Outcome of [`Index::insert`]
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// The record is now linked under its key
    Inserted,
    /// The key already maps to this record; nothing changed
    Exists(Arc<Record>),
}

/// Ordered key -> record mapping, partitioned by storage
pub trait Index: Send + Sync {
    /// Create an empty storage; returns false if it already exists
    fn create_storage(&self, storage: StorageId) -> bool;

    /// Drop a storage and every record linked in it; returns false if absent
    fn delete_storage(&self, storage: StorageId) -> bool;

    /// Whether the storage exists
    fn has_storage(&self, storage: StorageId) -> bool;

    /// All storage ids, ascending
    fn list_storages(&self) -> Vec<StorageId>;

    /// Record currently linked under `key`
    fn get(&self, storage: StorageId, key: &[u8]) -> IndexResult<Option<Arc<Record>>>;

    /// Link `record` under its key unless the key is already mapped
    fn insert(&self, storage: StorageId, record: Arc<Record>) -> IndexResult<InsertOutcome>;

    /// Unlink `record` if its key still maps to that exact record
    fn remove(&self, storage: StorageId, record: &Arc<Record>) -> IndexResult<bool>;

    /// Records whose keys fall in `(lower, upper)`, ascending, at most `limit`
    fn scan(
        &self,
        storage: StorageId,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        limit: Option<usize>,
    ) -> IndexResult<Vec<Arc<Record>>>;

    /// Number of linked records
    fn len(&self, storage: StorageId) -> IndexResult<usize>;

    /// Counter bumped on every insertion into or removal from the storage
    fn structure_version(&self, storage: StorageId) -> IndexResult<u64>;
}

/// One storage of a [`SkipListIndex`]
struct Tree {
    map: SkipMap<Box<[u8]>, Arc<Record>>,
    version: AtomicU64,
}

impl Tree {
    fn new() -> Self {
        Self {
            map: SkipMap::new(),
            version: AtomicU64::new(0),
        }
    }

    #[inline]
    fn bump(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }
}

/// Default [`Index`]: storages in a `DashMap`, keys in lock-free skip lists
///
/// # Thread Safety
///
/// All operations are lock-free with respect to other keys: the `DashMap`
/// shard lock is only held long enough to clone out the storage's `Arc`.
pub struct SkipListIndex {
    storages: DashMap<StorageId, Arc<Tree>>,
}

impl SkipListIndex {
    /// Empty index with no storages
    pub fn new() -> Self {
        Self {
            storages: DashMap::new(),
        }
    }

    #[inline]
    fn tree(&self, storage: StorageId) -> IndexResult<Arc<Tree>> {
        self.storages
            .get(&storage)
            .map(|t| Arc::clone(t.value()))
            .ok_or(IndexError::StorageNotFound(storage))
    }
}

impl Default for SkipListIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SkipListIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipListIndex")
            .field("storages", &self.storages.len())
            .finish()
    }
}

impl Index for SkipListIndex {
    fn create_storage(&self, storage: StorageId) -> bool {
        match self.storages.entry(storage) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Tree::new()));
                true
            }
        }
    }

    fn delete_storage(&self, storage: StorageId) -> bool {
        self.storages.remove(&storage).is_some()
    }

    fn has_storage(&self, storage: StorageId) -> bool {
        self.storages.contains_key(&storage)
    }

    fn list_storages(&self) -> Vec<StorageId> {
        let mut ids: Vec<StorageId> = self.storages.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    fn get(&self, storage: StorageId, key: &[u8]) -> IndexResult<Option<Arc<Record>>> {
        let tree = self.tree(storage)?;
        let found = tree.map.get(key).map(|entry| Arc::clone(entry.value()));
        Ok(found)
    }

    fn insert(&self, storage: StorageId, record: Arc<Record>) -> IndexResult<InsertOutcome> {
        let tree = self.tree(storage)?;
        let entry = tree
            .map
            .get_or_insert(record.key().into(), Arc::clone(&record));
        if Arc::ptr_eq(entry.value(), &record) {
            tree.bump();
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::Exists(Arc::clone(entry.value())))
        }
    }

    fn remove(&self, storage: StorageId, record: &Arc<Record>) -> IndexResult<bool> {
        let tree = self.tree(storage)?;
        let Some(entry) = tree.map.get(record.key()) else {
            return Ok(false);
        };
        if !Arc::ptr_eq(entry.value(), record) {
            return Ok(false);
        }
        let removed = entry.remove();
        if removed {
            tree.bump();
        }
        Ok(removed)
    }

    fn scan(
        &self,
        storage: StorageId,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        limit: Option<usize>,
    ) -> IndexResult<Vec<Arc<Record>>> {
        let tree = self.tree(storage)?;
        let limit = limit.unwrap_or(usize::MAX);
        let records = tree
            .map
            .range::<[u8], _>((lower, upper))
            .take(limit)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        Ok(records)
    }

    fn len(&self, storage: StorageId) -> IndexResult<usize> {
        Ok(self.tree(storage)?.map.len())
    }

    fn structure_version(&self, storage: StorageId) -> IndexResult<u64> {
        Ok(self.tree(storage)?.version.load(Ordering::Acquire))
    }
}
