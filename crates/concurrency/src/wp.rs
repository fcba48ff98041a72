//! Write-preserve reservations
//!
//! A long transaction declares up front which storages it will write. At
//! admission it registers a reservation `(valid_epoch, id)` in each of them,
//! where `valid_epoch` is one past the epoch read while holding every
//! involved storage's lock. From `valid_epoch` on:
//!
//! - short transactions writing to a reserved storage are rejected at write
//!   time, and aborted at commit if their commit epoch reached a reservation;
//! - long transactions sharing a storage resolve in `(valid_epoch, id)`
//!   order, each waiting for every reservation ordered before it.
//!
//! Finished long transactions leave a result per storage so successors can
//! order their commit TIDs after committed predecessors.

use crate::epoch::EpochClock;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tessera_core::{Epoch, Error, LongTxId, Result, StorageId, TidWord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WpSlot {
    epoch: Epoch,
    id: LongTxId,
}

/// Outcome a finished long transaction leaves on each reserved storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WpResult {
    pub epoch: Epoch,
    pub id: LongTxId,
    pub committed: bool,
    pub tid: TidWord,
}

#[derive(Debug, Default)]
struct WpMeta {
    slots: Vec<WpSlot>,
    results: Vec<WpResult>,
}

/// Reservation tables of every storage
#[derive(Debug)]
pub(crate) struct WpRegistry {
    metas: DashMap<StorageId, Arc<Mutex<WpMeta>>>,
    limit: usize,
}

impl WpRegistry {
    pub fn new(limit: usize) -> Self {
        Self {
            metas: DashMap::new(),
            limit,
        }
    }

    pub fn create(&self, storage: StorageId) {
        self.metas.entry(storage).or_default();
    }

    pub fn remove(&self, storage: StorageId) {
        self.metas.remove(&storage);
    }

    fn meta(&self, storage: StorageId) -> Option<Arc<Mutex<WpMeta>>> {
        self.metas.get(&storage).map(|m| Arc::clone(m.value()))
    }

    /// Register `id` on every storage in `storages` (sorted, deduplicated)
    ///
    /// Returns the valid epoch. Nothing is registered on failure.
    pub fn admit(&self, id: LongTxId, storages: &[StorageId], clock: &EpochClock) -> Result<Epoch> {
        debug_assert!(storages.windows(2).all(|w| w[0] < w[1]));
        let metas = storages
            .iter()
            .map(|&s| self.meta(s))
            .collect::<Option<Vec<_>>>()
            .ok_or(Error::StorageNotFound)?;
        // Locks are taken in storage order, so admissions cannot deadlock.
        let mut guards: Vec<_> = metas.iter().map(|m| m.lock()).collect();
        if guards.iter().any(|g| g.slots.len() >= self.limit) {
            return Err(Error::WritePreserveLimit);
        }
        let valid_epoch = clock.current() + 1;
        for guard in guards.iter_mut() {
            guard.slots.push(WpSlot {
                epoch: valid_epoch,
                id,
            });
        }
        Ok(valid_epoch)
    }

    /// Drop the reservations of `id`, leaving `result` behind if given
    pub fn release(&self, id: LongTxId, storages: &[StorageId], result: Option<WpResult>) {
        for &storage in storages {
            if let Some(meta) = self.meta(storage) {
                let mut meta = meta.lock();
                meta.slots.retain(|s| s.id != id);
                if let Some(result) = result {
                    meta.results.push(result);
                }
            }
        }
    }

    /// Whether a reservation valid at or before `epoch` exists on `storage`
    pub fn conflicts(&self, storage: StorageId, epoch: Epoch) -> bool {
        self.meta(storage)
            .map_or(false, |m| m.lock().slots.iter().any(|s| s.epoch <= epoch))
    }

    /// Whether a reservation ordered before `(valid_epoch, id)` remains on
    /// any of `storages`
    pub fn has_predecessor(&self, id: LongTxId, valid_epoch: Epoch, storages: &[StorageId]) -> bool {
        storages.iter().any(|&storage| {
            self.meta(storage).map_or(false, |m| {
                m.lock()
                    .slots
                    .iter()
                    .any(|s| (s.epoch, s.id) < (valid_epoch, id))
            })
        })
    }

    /// Largest TID committed by a finished long transaction on `storages`
    pub fn max_committed_tid(&self, storages: &[StorageId]) -> TidWord {
        storages
            .iter()
            .filter_map(|&storage| self.meta(storage))
            .filter_map(|m| {
                m.lock()
                    .results
                    .iter()
                    .filter(|r| r.committed)
                    .map(|r| r.tid)
                    .max()
            })
            .max()
            .unwrap_or_default()
    }

    /// Forget results of long transactions validated before `epoch`
    pub fn prune_results(&self, epoch: Epoch) {
        for meta in self.metas.iter() {
            meta.value().lock().results.retain(|r| r.epoch >= epoch);
        }
    }

    /// Reservations currently held on `storage`
    pub fn reservations(&self, storage: StorageId) -> usize {
        self.meta(storage).map_or(0, |m| m.lock().slots.len())
    }
}
