//! Optimistic commit protocol
//!
//! Commits run without any global lock. Correctness comes from locking the
//! write set in a global order and validating the read set after a single
//! serialization point.
//!
//! ## Commit Sequence
//!
//! ```text
//! Phase 1  sort the write set by (storage, key)      global lock order
//! Phase 2  lock every non-insert entry                absent => ERR_WRITE_TO_DELETED_RECORD
//! Phase 3  fence; commit_epoch = publish(); fence     serialization point
//! Phase 4  short tx: reservation <= commit_epoch      => ERR_CONFLICT_ON_WRITE_PRESERVE
//!          reads unchanged, not locked by others      => ERR_VALIDATION
//!          no foreign structure change under scans    => ERR_PHANTOM
//! Phase 5  choose the TID, apply and log each write,
//!          publish the TID (unlocks the record)
//! ```
//!
//! Pending inserts are locked from the moment they were placed in the
//! index, so phase 2 skips them and phase 5 unlocks them.
//!
//! Every failure releases the locks taken in phase 2 and rolls back pending
//! inserts before returning, so the caller only has to discard the context.

use crate::epoch::EpochClock;
use crate::gc::GarbageCollector;
use crate::local_set::{WriteEntry, WriteKind, WriteSet};
use crate::session::{Session, TxContext};
use crate::snapshot::SnapshotPolicy;
use crate::wp::WpRegistry;
use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;
use tessera_core::{Epoch, Error, Result, StorageId, TidWord, TxType};
use tessera_durability::LogSink;
use tessera_storage::{Index, Record, Version};
use tracing::trace;

/// Shared components a commit or rollback touches
pub(crate) struct CommitEnv<'a> {
    pub clock: &'a EpochClock,
    pub index: &'a dyn Index,
    pub log: &'a dyn LogSink,
    pub gc: &'a GarbageCollector,
    pub wp: &'a WpRegistry,
    pub snapshots: SnapshotPolicy,
    /// Slot of the committing session, also its GC shard
    pub shard: usize,
    pub session: &'a Session,
}

/// Run the protocol for `tx`
///
/// `last_tid` is the committing session's previous TID; `floor` is a TID the
/// result must exceed (committed long-transaction predecessors).
///
/// On success returns the commit TID. On error the transaction has been
/// rolled back.
pub(crate) fn commit(
    env: &CommitEnv<'_>,
    tx: &mut TxContext,
    last_tid: TidWord,
    floor: TidWord,
) -> Result<TidWord> {
    // Phase 1
    tx.write_set.sort_for_commit();

    // Phase 2
    let (locked, max_wset) = match lock_write_set(&tx.write_set) {
        Ok(max_wset) => (tx.write_set.len(), max_wset),
        Err(locked) => return Err(abort(env, tx, locked, Error::WriteToDeletedRecord)),
    };

    // Phase 3
    fence(Ordering::SeqCst);
    let commit_epoch = env.clock.publish(&env.session.observed_epoch);
    fence(Ordering::SeqCst);

    // Phase 4
    let max_rset = match validate(env, tx, commit_epoch) {
        Ok(max_rset) => max_rset,
        Err(reason) => return Err(abort(env, tx, locked, reason)),
    };

    // Phase 5
    let tid = max_wset
        .max(max_rset)
        .next_sequence()
        .max(last_tid.timestamp().next_sequence())
        .max(floor.timestamp().next_sequence())
        .max(TidWord::new(commit_epoch, 0))
        .with_latest(true);

    for entry in tx.write_set.drain() {
        apply(env, entry, tid);
    }
    Ok(tid)
}

/// Lock every non-insert entry in order
///
/// Returns the largest timestamp seen, or on hitting a deleted record the
/// number of leading entries that are still locked.
fn lock_write_set(write_set: &WriteSet) -> std::result::Result<TidWord, usize> {
    let mut max_wset = TidWord::default();
    for (i, entry) in write_set.iter().enumerate() {
        if entry.kind == WriteKind::Insert {
            continue;
        }
        let tid = entry.record.lock().map_err(|_| i)?;
        max_wset = max_wset.max(tid.timestamp());
    }
    Ok(max_wset)
}

/// Check reservations, the read set and the node set
///
/// Returns the largest timestamp read.
fn validate(env: &CommitEnv<'_>, tx: &TxContext, commit_epoch: Epoch) -> Result<TidWord> {
    if tx.kind == TxType::Short
        && tx
            .write_set
            .storages()
            .iter()
            .any(|&storage| env.wp.conflicts(storage, commit_epoch))
    {
        return Err(Error::AbortedByWritePreserve);
    }

    let mut max_rset = TidWord::default();
    for read in tx.read_set.iter() {
        let current = read.record.load_tid();
        let foreign_lock = current.is_locked() && !tx.write_set.holds(read.storage, &read.record);
        if !current.same_version(read.observed) || foreign_lock {
            return Err(Error::Validation);
        }
        max_rset = max_rset.max(read.observed.timestamp());
    }

    for node in tx.node_set.iter() {
        let current = env
            .index
            .structure_version(node.storage)
            .map_err(|_| Error::Phantom)?;
        let own = tx.node_set.own_changes(node.storage) - node.own_changes;
        if current.wrapping_sub(node.version) != own {
            return Err(Error::Phantom);
        }
    }
    Ok(max_rset)
}

/// Apply one write under its record lock and publish `tid`
fn apply(env: &CommitEnv<'_>, entry: WriteEntry, tid: TidWord) {
    let WriteEntry {
        storage,
        record,
        kind,
        value,
        revived,
    } = entry;
    match kind {
        WriteKind::Update => {
            let value = value.unwrap_or_default();
            env.log.add_entry(storage, record.key(), &value, tid);
            let old_tid = record.load_tid().with_lock(false);
            let old_value = record.replace_value(value);
            env.snapshots
                .preserve(&record, Version::live(old_tid, old_value), tid, env.gc, env.shard);
            record.store_tid(tid);
        }
        WriteKind::Insert => {
            let value = value.unwrap_or_default();
            env.log.add_entry(storage, record.key(), &value, tid);
            record.replace_value(value);
            if let Some(tombstone) = revived {
                env.snapshots
                    .preserve(&record, Version::deleted(tombstone), tid, env.gc, env.shard);
            }
            record.store_tid(tid);
        }
        WriteKind::Delete => {
            env.log.remove_entry(storage, record.key(), tid);
            let old_tid = record.load_tid().with_lock(false);
            let old_value = record.take_value();
            env.snapshots
                .preserve(&record, Version::live(old_tid, old_value), tid, env.gc, env.shard);
            let deleted = tid.with_absent(true);
            if record.has_versions() {
                record.store_tid(deleted);
                env.gc.retire_tombstone(env.shard, storage, record, deleted);
            } else {
                // Storage may have been dropped underneath; nothing to unlink then.
                let _ = env.index.remove(storage, &record);
                record.store_tid(deleted.with_latest(false));
                env.gc.retire_record(env.shard, record, tid.epoch());
            }
        }
    }
}

/// Release the first `locked` write-set entries' locks and roll back
fn abort(env: &CommitEnv<'_>, tx: &mut TxContext, locked: usize, reason: Error) -> Error {
    for entry in tx.write_set.iter().take(locked) {
        if entry.kind != WriteKind::Insert {
            entry.record.unlock();
        }
    }
    rollback(env, &mut tx.write_set);
    trace!(slot = env.shard, reason = reason.code(), "Commit aborted");
    reason
}

/// Undo the pending inserts of an unlocked write set and empty it
///
/// Fresh inserts are unlinked and retired; revived tombstones get their
/// tombstone TID back.
pub(crate) fn rollback(env: &CommitEnv<'_>, write_set: &mut WriteSet) {
    let epoch = env.clock.current();
    for entry in write_set.drain() {
        if entry.kind == WriteKind::Insert {
            discard_insert(env, entry.storage, entry.record, entry.revived, epoch);
        }
    }
}

/// Undo one pending insert
pub(crate) fn discard_insert(
    env: &CommitEnv<'_>,
    storage: StorageId,
    record: Arc<Record>,
    revived: Option<TidWord>,
    epoch: Epoch,
) {
    match revived {
        Some(tombstone) => record.store_tid(tombstone),
        None => {
            let _ = env.index.remove(storage, &record);
            record.store_tid(TidWord::default().with_absent(true));
            env.gc.retire_record(env.shard, record, epoch);
        }
    }
}
