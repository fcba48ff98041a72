//! Records and snapshot versions
//!
//! A [`Record`] is the unit the concurrency layer locks and validates. It
//! holds the latest value together with its [`TidWord`], plus a chain of
//! older [`Version`]s kept for read-only snapshot readers.
//!
//! # Synchronization
//!
//! - `tid` is the lock word. Writers change `value` and the chain only while
//!   holding the lock bit, and publish with a release store of the new TID.
//! - Optimistic readers load the TID, copy the value, and reload the TID; a
//!   mismatch means the copy may be torn and must be retried.
//! - The value and chain sit behind `parking_lot::RwLock`s so copies are
//!   memory-safe even when a reader races a writer.

use crate::backoff::Backoff;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tessera_core::epoch::{snapshot_epoch, Epoch};
use tessera_core::TidWord;

/// One older state of a record
///
/// `value == None` marks a deleted state, which snapshot readers observe as
/// "not found".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// TID the state was committed with
    pub tid: TidWord,
    /// Value, or `None` for a deleted state
    pub value: Option<Vec<u8>>,
}

impl Version {
    /// Version holding a value
    pub fn live(tid: TidWord, value: Vec<u8>) -> Self {
        Version {
            tid,
            value: Some(value),
        }
    }

    /// Version marking a deletion
    pub fn deleted(tid: TidWord) -> Self {
        Version { tid, value: None }
    }

    /// Epoch of the commit that produced this version
    pub fn epoch(&self) -> Epoch {
        self.tid.epoch()
    }
}

/// A key with its latest value, lock word and snapshot chain
pub struct Record {
    key: Box<[u8]>,
    tid: AtomicU64,
    value: RwLock<Vec<u8>>,
    /// Newest first
    versions: RwLock<VecDeque<Version>>,
}

impl Record {
    /// Record with a committed value
    pub fn new(key: &[u8], value: Vec<u8>, tid: TidWord) -> Self {
        Self {
            key: key.into(),
            tid: AtomicU64::new(tid.raw()),
            value: RwLock::new(value),
            versions: RwLock::new(VecDeque::new()),
        }
    }

    /// Record placed in the index by an uncommitted insert
    ///
    /// The record is locked and absent until the inserting transaction
    /// commits or aborts.
    pub fn pending_insert(key: &[u8]) -> Self {
        Self::new(key, Vec::new(), TidWord::pending_insert())
    }

    /// Key bytes
    #[inline]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    // ========================================================================
    // Lock word
    // ========================================================================

    /// Current TID
    #[inline]
    pub fn load_tid(&self) -> TidWord {
        TidWord::from_raw(self.tid.load(Ordering::Acquire))
    }

    /// Publish a new TID
    #[inline]
    pub fn store_tid(&self, tid: TidWord) {
        self.tid.store(tid.raw(), Ordering::Release);
    }

    /// Replace `current` with `new` if the TID still equals `current`
    ///
    /// Returns the observed TID on failure.
    #[inline]
    pub fn compare_exchange_tid(&self, current: TidWord, new: TidWord) -> Result<TidWord, TidWord> {
        self.tid
            .compare_exchange(current.raw(), new.raw(), Ordering::AcqRel, Ordering::Acquire)
            .map(TidWord::from_raw)
            .map_err(TidWord::from_raw)
    }

    /// Acquire the lock bit of a present record
    ///
    /// Spins while another writer holds the lock over a present state.
    /// Returns the TID as it was just before locking (lock bit clear), or
    /// `Err` with the observed TID as soon as the record is absent. An absent
    /// record can stay locked for a whole transaction (a pending insert or a
    /// revived tombstone), so it is never waited on.
    pub fn lock(&self) -> Result<TidWord, TidWord> {
        let mut backoff = Backoff::new();
        loop {
            let current = self.load_tid();
            if current.is_absent() {
                return Err(current);
            }
            if current.is_locked() {
                backoff.snooze();
                continue;
            }
            if self
                .compare_exchange_tid(current, current.with_lock(true))
                .is_ok()
            {
                return Ok(current);
            }
        }
    }

    /// Clear the lock bit, leaving the rest of the TID untouched
    #[inline]
    pub fn unlock(&self) {
        self.tid.fetch_and(!TidWord::default().with_lock(true).raw(), Ordering::Release);
    }

    // ========================================================================
    // Value
    // ========================================================================

    /// Copy of the latest value
    pub fn read_value(&self) -> Vec<u8> {
        self.value.read().clone()
    }

    /// Install `value` as the latest value, returning the previous one
    ///
    /// Callers must hold the record lock.
    pub fn replace_value(&self, value: Vec<u8>) -> Vec<u8> {
        std::mem::replace(&mut *self.value.write(), value)
    }

    /// Move the latest value out, leaving an empty buffer
    ///
    /// Callers must hold the record lock.
    pub fn take_value(&self) -> Vec<u8> {
        std::mem::take(&mut *self.value.write())
    }

    // ========================================================================
    // Snapshot chain
    // ========================================================================

    /// Push an older state to the front of the chain
    ///
    /// Callers must hold the record lock.
    pub fn push_version(&self, version: Version) {
        self.versions.write().push_front(version);
    }

    /// Newest version matching `visible`
    pub fn find_version(&self, visible: impl Fn(&Version) -> bool) -> Option<Version> {
        self.versions.read().iter().find(|v| visible(v)).cloned()
    }

    /// Whether any older state is retained
    pub fn has_versions(&self) -> bool {
        !self.versions.read().is_empty()
    }

    /// Number of retained versions
    pub fn version_count(&self) -> usize {
        self.versions.read().len()
    }

    /// Drop versions no snapshot reader can reach
    ///
    /// Walking the chain from the live state (`live_epoch`), a version is
    /// unreachable once the snapshot epoch of its newer neighbour is below
    /// `min_snapshot_epoch`: every live reader already sees that neighbour or
    /// something newer. Returns the removed versions, oldest last.
    pub fn prune_versions(
        &self,
        live_epoch: Epoch,
        min_snapshot_epoch: Epoch,
        interval: u32,
    ) -> Vec<Version> {
        let mut chain = self.versions.write();
        let mut newer = live_epoch;
        let mut cut = chain.len();
        for (i, version) in chain.iter().enumerate() {
            if snapshot_epoch(newer, interval) < min_snapshot_epoch {
                cut = i;
                break;
            }
            newer = version.epoch();
        }
        chain.split_off(cut).into()
    }

    /// Remove the whole chain
    pub fn clear_versions(&self) -> Vec<Version> {
        std::mem::take(&mut *self.versions.write()).into()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("key", &self.key)
            .field("tid", &self.load_tid())
            .field("versions", &self.version_count())
            .finish()
    }
}
