//! Snapshot versions for read-only transactions
//!
//! A read-only transaction begun at epoch `b` reads as of snapshot epoch
//! `S = (b - 1) / snapshot_interval`: it sees exactly the versions whose
//! snapshot epoch is strictly below `S`. A committer still applying writes
//! holds an epoch `>= b - 1`, and later commits land at `>= b`, so every
//! version below `S` is final. The view is stable and needs no validation.
//!
//! Writers keep that view intact: whenever a commit overwrites a version
//! from an older snapshot epoch, the old version moves to the front of the
//! record's chain, and the chain is pruned of versions no running reader can
//! reach.

use crate::gc::GarbageCollector;
use tessera_core::{snapshot_epoch, Epoch, Error, Result, TidWord};
use tessera_storage::{Backoff, Record, Version};

/// Snapshot settings in effect for one commit
#[derive(Debug, Clone, Copy)]
pub(crate) struct SnapshotPolicy {
    pub interval: u32,
    /// Smallest snapshot epoch any running reader may use
    pub min_snapshot_epoch: Epoch,
}

impl SnapshotPolicy {
    #[inline]
    pub fn needs_version(&self, old: Epoch, new: Epoch) -> bool {
        snapshot_epoch(old, self.interval) != snapshot_epoch(new, self.interval)
    }

    /// Keep `old` reachable for snapshot readers if they can still need it,
    /// otherwise retire its value
    ///
    /// Callers hold the record lock and have not yet published `new_tid`.
    pub fn preserve(
        &self,
        record: &Record,
        old: Version,
        new_tid: TidWord,
        gc: &GarbageCollector,
        shard: usize,
    ) {
        let epoch = new_tid.epoch();
        if self.needs_version(old.epoch(), epoch) {
            record.push_version(old);
            let pruned = record.prune_versions(epoch, self.min_snapshot_epoch, self.interval);
            gc.retire_versions(shard, pruned, epoch);
        } else if let Some(value) = old.value {
            gc.retire_value(shard, value, epoch);
        }
    }
}

/// Read `record` as of snapshot epoch `tx_snapshot`
///
/// | Record state | Outcome |
/// |--------------|---------|
/// | pending insert | `ConcurrentInsert` |
/// | locked by a committer | spin, then `ConcurrentUpdate` |
/// | live state visible | its value, or `NotFound` if absent |
/// | live state too new | first visible chain version, or `NotFound` |
pub(crate) fn read_snapshot(
    record: &Record,
    tx_snapshot: Epoch,
    interval: u32,
    spin_retries: u32,
) -> Result<Vec<u8>> {
    let visible = |epoch: Epoch| snapshot_epoch(epoch, interval) < tx_snapshot;
    let mut backoff = Backoff::new();
    loop {
        let tid = record.load_tid();
        if tid.is_locked() {
            if tid.is_absent() {
                return Err(Error::ConcurrentInsert);
            }
            if backoff.is_exhausted(spin_retries) {
                return Err(Error::ConcurrentUpdate);
            }
            backoff.snooze();
            continue;
        }

        if visible(tid.epoch()) {
            if tid.is_absent() {
                return Err(Error::NotFound);
            }
            let value = record.read_value();
            if record.load_tid() != tid {
                backoff.snooze();
                continue;
            }
            return Ok(value);
        }

        return match record.find_version(|v| visible(v.epoch())) {
            Some(Version {
                value: Some(value), ..
            }) => Ok(value),
            _ => Err(Error::NotFound),
        };
    }
}
