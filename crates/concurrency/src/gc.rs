//! Epoch-based garbage collection
//!
//! Nothing shared is dropped at the moment it becomes garbage. Writers move
//! it into a retire queue tagged with the epoch of the retiring commit, and
//! the collector drops it once that epoch is at or below the reclamation
//! epoch, when no in-flight transaction can still reach it.
//!
//! Queues are sharded by session slot so committers never contend with each
//! other; each shard holds four FIFOs:
//!
//! | Queue | Holds | Reclaimable when |
//! |-------|-------|------------------|
//! | records | unlinked records (deleted, aborted inserts) | `epoch <= reclamation` |
//! | tombstones | deleted records kept linked for snapshot readers | also `snap(epoch) < min snapshot` |
//! | values | overwritten values no snapshot needed | `epoch <= reclamation` |
//! | versions | snapshot versions pruned from a chain | `epoch <= reclamation` |
//!
//! Reclaiming a tombstone means unhooking it: lock it, unlink it from the
//! index, drop its chain and mark it unlinked. A tombstone revived by an
//! insert in the meantime no longer matches its retired TID and is skipped.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_core::{snapshot_epoch, Epoch, StorageId, TidWord};
use tessera_storage::{Index, Record, Version};
use tracing::debug;

/// Limits a sweep must respect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcHorizon {
    /// Newest epoch whose garbage may be dropped
    pub reclamation_epoch: Epoch,
    /// Smallest snapshot epoch any reader may still use
    pub min_snapshot_epoch: Epoch,
    /// Epochs per snapshot epoch
    pub snapshot_interval: u32,
}

#[derive(Debug)]
struct Retired<T> {
    epoch: Epoch,
    item: T,
}

#[derive(Debug)]
struct Tombstone {
    storage: StorageId,
    record: Arc<Record>,
    tid: TidWord,
}

#[derive(Debug, Default)]
struct GcShard {
    records: VecDeque<Retired<Arc<Record>>>,
    tombstones: VecDeque<Retired<Tombstone>>,
    values: VecDeque<Retired<Vec<u8>>>,
    versions: VecDeque<Retired<Vec<Version>>>,
}

/// Pop and drop every front item retired at or before `epoch`
fn drain_through<T>(queue: &mut VecDeque<Retired<T>>, epoch: Epoch) -> u64 {
    let mut n = 0;
    while queue.front().map_or(false, |r| r.epoch <= epoch) {
        queue.pop_front();
        n += 1;
    }
    n
}

/// GC counters
///
/// Counters are lock-free `AtomicU64`s updated with relaxed ordering; read
/// them together through [`GcStats::snapshot`].
#[derive(Debug, Default)]
pub struct GcStats {
    retired_records: AtomicU64,
    retired_tombstones: AtomicU64,
    retired_values: AtomicU64,
    retired_versions: AtomicU64,
    reclaimed_records: AtomicU64,
    unhooked_tombstones: AtomicU64,
    reclaimed_values: AtomicU64,
    reclaimed_versions: AtomicU64,
    sweeps: AtomicU64,
}

impl GcStats {
    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> GcStatsSnapshot {
        GcStatsSnapshot {
            retired_records: self.retired_records.load(Ordering::Relaxed),
            retired_tombstones: self.retired_tombstones.load(Ordering::Relaxed),
            retired_values: self.retired_values.load(Ordering::Relaxed),
            retired_versions: self.retired_versions.load(Ordering::Relaxed),
            reclaimed_records: self.reclaimed_records.load(Ordering::Relaxed),
            unhooked_tombstones: self.unhooked_tombstones.load(Ordering::Relaxed),
            reclaimed_values: self.reclaimed_values.load(Ordering::Relaxed),
            reclaimed_versions: self.reclaimed_versions.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`GcStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStatsSnapshot {
    /// Unlinked records queued
    pub retired_records: u64,
    /// Tombstones queued
    pub retired_tombstones: u64,
    /// Overwritten values queued
    pub retired_values: u64,
    /// Pruned version batches queued
    pub retired_versions: u64,
    /// Unlinked records dropped
    pub reclaimed_records: u64,
    /// Tombstones unlinked and dropped (including revived ones skipped)
    pub unhooked_tombstones: u64,
    /// Values dropped
    pub reclaimed_values: u64,
    /// Version batches dropped
    pub reclaimed_versions: u64,
    /// Completed sweeps
    pub sweeps: u64,
}

impl GcStatsSnapshot {
    /// Queued items not reclaimed yet
    pub fn pending(&self) -> u64 {
        (self.retired_records - self.reclaimed_records)
            + (self.retired_tombstones - self.unhooked_tombstones)
            + (self.retired_values - self.reclaimed_values)
            + (self.retired_versions - self.reclaimed_versions)
    }
}

/// Sharded retire queues
#[derive(Debug)]
pub(crate) struct GarbageCollector {
    shards: Box<[Mutex<GcShard>]>,
    stats: GcStats,
}

impl GarbageCollector {
    pub fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards).map(|_| Mutex::new(GcShard::default())).collect(),
            stats: GcStats::default(),
        }
    }

    pub fn retire_record(&self, shard: usize, record: Arc<Record>, epoch: Epoch) {
        self.shards[shard]
            .lock()
            .records
            .push_back(Retired { epoch, item: record });
        self.stats.retired_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retire_tombstone(&self, shard: usize, storage: StorageId, record: Arc<Record>, tid: TidWord) {
        self.shards[shard].lock().tombstones.push_back(Retired {
            epoch: tid.epoch(),
            item: Tombstone {
                storage,
                record,
                tid,
            },
        });
        self.stats.retired_tombstones.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retire_value(&self, shard: usize, value: Vec<u8>, epoch: Epoch) {
        if value.capacity() == 0 {
            return;
        }
        self.shards[shard]
            .lock()
            .values
            .push_back(Retired { epoch, item: value });
        self.stats.retired_values.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retire_versions(&self, shard: usize, versions: Vec<Version>, epoch: Epoch) {
        if versions.is_empty() {
            return;
        }
        self.shards[shard]
            .lock()
            .versions
            .push_back(Retired {
                epoch,
                item: versions,
            });
        self.stats.retired_versions.fetch_add(1, Ordering::Relaxed);
    }

    /// Sweep every shard, waiting for shards in use
    pub fn sweep(&self, horizon: GcHorizon, index: &dyn Index) -> u64 {
        let mut reclaimed = 0;
        for shard in self.shards.iter() {
            reclaimed += self.sweep_locked(&mut shard.lock(), horizon, index);
        }
        self.stats.sweeps.fetch_add(1, Ordering::Relaxed);
        if reclaimed > 0 {
            debug!(
                reclaimed,
                reclamation_epoch = horizon.reclamation_epoch,
                min_snapshot_epoch = horizon.min_snapshot_epoch,
                "GC sweep"
            );
        }
        reclaimed
    }

    /// Sweep one shard if nobody else holds it
    pub fn try_sweep_shard(&self, shard: usize, horizon: GcHorizon, index: &dyn Index) -> u64 {
        match self.shards[shard].try_lock() {
            Some(mut guard) => self.sweep_locked(&mut guard, horizon, index),
            None => 0,
        }
    }

    fn sweep_locked(&self, shard: &mut GcShard, horizon: GcHorizon, index: &dyn Index) -> u64 {
        let epoch = horizon.reclamation_epoch;
        let records = drain_through(&mut shard.records, epoch);
        let values = drain_through(&mut shard.values, epoch);
        let versions = drain_through(&mut shard.versions, epoch);

        let mut tombstones = 0;
        while let Some(front) = shard.tombstones.front() {
            let retired_snapshot = snapshot_epoch(front.epoch, horizon.snapshot_interval);
            if front.epoch > epoch || retired_snapshot >= horizon.min_snapshot_epoch {
                break;
            }
            if let Some(retired) = shard.tombstones.pop_front() {
                unhook(retired.item, index);
                tombstones += 1;
            }
        }

        self.stats.reclaimed_records.fetch_add(records, Ordering::Relaxed);
        self.stats.reclaimed_values.fetch_add(values, Ordering::Relaxed);
        self.stats.reclaimed_versions.fetch_add(versions, Ordering::Relaxed);
        self.stats.unhooked_tombstones.fetch_add(tombstones, Ordering::Relaxed);
        records + values + versions + tombstones
    }

    pub fn stats(&self) -> GcStatsSnapshot {
        self.stats.snapshot()
    }
}

fn unhook(tombstone: Tombstone, index: &dyn Index) {
    let Tombstone {
        storage,
        record,
        tid,
    } = tombstone;
    if record.compare_exchange_tid(tid, tid.with_lock(true)).is_err() {
        // Revived (or deleted again, which queued a newer tombstone).
        return;
    }
    // A dropped storage has nothing left to unlink from.
    let _ = index.remove(storage, &record);
    drop(record.clear_versions());
    record.store_tid(tid.with_latest(false));
}
