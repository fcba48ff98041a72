//! Epoch-based garbage collection tests
//!
//! Checks that retired memory is held for two epochs, that tombstones wait
//! for the snapshot horizon, and that a log sink's durable epoch bounds
//! reclamation.

use crate::common::*;
use std::sync::Arc;
use tessera::durability::{EpochLog, LogEntry, LogSink};
use tessera::prelude::*;

#[test]
fn test_overwritten_values_wait_two_epochs() {
    let db = manual_db();
    let st = db.create_storage();
    let t = db.enter().unwrap();
    put(&db, t, st, b"k", b"v0");
    put(&db, t, st, b"k", b"v1");
    put(&db, t, st, b"k", b"v2");

    let stats = db.gc_stats();
    assert_eq!(stats.retired_values, 2);
    db.collect_garbage();
    assert_eq!(db.gc_stats().reclaimed_values, 0);

    advance(&db, 2);
    db.collect_garbage();
    let stats = db.gc_stats();
    assert_eq!(stats.reclaimed_values, 2);
    assert_eq!(stats.pending(), 0);
    assert_eq!(get(&db, t, st, b"k"), Some(b"v2".to_vec()));
}

#[test]
fn test_unlinked_records_reclaimed() {
    let db = manual_db();
    let st = db.create_storage();
    let t = db.enter().unwrap();
    for i in 0..10u64 {
        put(&db, t, st, &encode(i), b"v");
    }
    for i in 0..10u64 {
        db.delete_record(t, st, &encode(i)).unwrap();
    }
    commit_tid(&db, t);

    // Same snapshot epoch: no chain kept, records unlinked at once.
    assert_eq!(db.gc_stats().retired_records, 10);
    assert_eq!(db.gc_stats().retired_tombstones, 0);
    advance(&db, 2);
    db.collect_garbage();
    assert_eq!(db.gc_stats().reclaimed_records, 10);
}

#[test]
fn test_aborted_insert_reclaimed() {
    let db = manual_db();
    let st = db.create_storage();
    let t = db.enter().unwrap();
    db.insert(t, st, b"k", b"v").unwrap();
    db.abort(t).unwrap();
    assert_eq!(db.gc_stats().retired_records, 1);

    advance(&db, 2);
    db.collect_garbage();
    assert_eq!(db.gc_stats().pending(), 0);
}

#[test]
fn test_tombstone_waits_for_snapshot_horizon() {
    let db = manual_db();
    let st = db.create_storage();
    let writer = db.enter().unwrap();
    let reader = db.enter().unwrap();
    put(&db, writer, st, b"k", b"v");
    advance(&db, 4);

    db.tx_begin(reader, TxOptions::read_only()).unwrap();
    db.delete_record(writer, st, b"k").unwrap();
    commit_tid(&db, writer);
    assert_eq!(db.gc_stats().retired_tombstones, 1);

    advance(&db, 6);
    db.collect_garbage();
    assert_eq!(db.gc_stats().unhooked_tombstones, 0);
    assert_eq!(db.search_key(reader, st, b"k").unwrap().0, b"v".to_vec());
    db.commit(reader).unwrap();

    advance(&db, 1);
    db.collect_garbage();
    assert_eq!(db.gc_stats().unhooked_tombstones, 1);
    assert_eq!(get_snapshot(&db, reader, st, b"k"), None);
    assert_eq!(get(&db, reader, st, b"k"), None);

    db.insert(writer, st, b"k", b"back").unwrap();
    commit_tid(&db, writer);
    assert_eq!(get(&db, reader, st, b"k"), Some(b"back".to_vec()));
}

#[test]
fn test_revived_tombstone_survives_sweep() {
    let db = manual_db();
    let st = db.create_storage();
    let t = db.enter().unwrap();
    put(&db, t, st, b"k", b"v1");
    advance(&db, 4);

    db.delete_record(t, st, b"k").unwrap();
    commit_tid(&db, t);
    db.insert(t, st, b"k", b"v2").unwrap();
    commit_tid(&db, t);

    advance(&db, 6);
    db.collect_garbage();
    assert_eq!(get(&db, t, st, b"k"), Some(b"v2".to_vec()));
    assert_eq!(get_snapshot(&db, t, st, b"k"), Some(b"v2".to_vec()));
}

#[test]
fn test_running_short_transaction_holds_reclamation() {
    let db = manual_db();
    let st = db.create_storage();
    let writer = db.enter().unwrap();
    let idle = db.enter().unwrap();
    put(&db, writer, st, b"k", b"v0");

    assert_eq!(get(&db, idle, st, b"k"), Some(b"v0".to_vec()));
    db.search_key(idle, st, b"k").unwrap();
    put(&db, writer, st, b"k", b"v1");

    // The open transaction pins the clock within one epoch of its view.
    assert!(db.try_advance_epoch());
    assert!(!db.try_advance_epoch());
    db.collect_garbage();
    assert_eq!(db.gc_stats().reclaimed_values, 0);

    db.abort(idle).unwrap();
    advance(&db, 1);
    db.collect_garbage();
    assert_eq!(db.gc_stats().reclaimed_values, 1);
}

// =============================================================================
// LOG SINK
// =============================================================================

#[test]
fn test_epoch_log_persists_closed_epochs_only() {
    let log = Arc::new(EpochLog::new());
    let db = manual_db_with_log(log.clone());
    let st = db.create_storage();
    let t = db.enter().unwrap();

    put(&db, t, st, b"a", b"1");
    advance(&db, 1);
    put(&db, t, st, b"b", b"2");
    db.delete_record(t, st, b"a").unwrap();
    commit_tid(&db, t);

    assert_eq!(log.persisted_len(), 0);
    assert_eq!(log.pending_len(), 3);

    // Epoch 3: epoch 1 closes.
    advance(&db, 1);
    assert_eq!(log.persisted_len(), 1);
    advance(&db, 1);
    assert_eq!(log.persisted_len(), 3);

    let replayed = log.replay().unwrap();
    let keys: Vec<_> = replayed.iter().map(|e| e.key().to_vec()).collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    assert!(matches!(replayed[2], LogEntry::Delete { .. }));
    assert!(replayed.windows(2).all(|w| w[0].tid() < w[1].tid()));
}

#[test]
fn test_durable_epoch_bounds_reclamation() {
    let log = Arc::new(EpochLog::new());
    let db = manual_db_with_log(log.clone());
    let st = db.create_storage();
    let t = db.enter().unwrap();
    put(&db, t, st, b"k", b"v0");
    put(&db, t, st, b"k", b"v1");

    advance(&db, 2);
    assert_eq!(log.durable_epoch(), Some(1));
    db.collect_garbage();
    assert_eq!(db.gc_stats().reclaimed_values, 1);
}

/// Sink whose persistence never gets past epoch 0
struct StalledLog;

impl LogSink for StalledLog {
    fn add_entry(&self, _storage: StorageId, _key: &[u8], _value: &[u8], _tid: TidWord) {}

    fn remove_entry(&self, _storage: StorageId, _key: &[u8], _tid: TidWord) {}

    fn durable_epoch(&self) -> Option<Epoch> {
        Some(0)
    }
}

#[test]
fn test_stalled_log_holds_back_reclamation() {
    let db = manual_db_with_log(Arc::new(StalledLog));
    let st = db.create_storage();
    let t = db.enter().unwrap();
    put(&db, t, st, b"k", b"v0");
    put(&db, t, st, b"k", b"v1");

    advance(&db, 10);
    db.collect_garbage();
    let stats = db.gc_stats();
    assert_eq!(stats.reclaimed_values, 0);
    assert_eq!(stats.pending(), 1);
}
