//! Optimistic commit protocol tests
//!
//! Two-session interleavings checking that validation, write locking and
//! TID assignment keep short transactions serializable.

use crate::common::*;
use tessera::prelude::*;

// =============================================================================
// READ-WRITE CONFLICTS
// =============================================================================

/// Two sessions read the same value and both write back an increment: the
/// second committer must fail validation.
#[test]
fn test_lost_update_is_prevented() {
    let db = manual_db();
    let st = db.create_storage();
    let t1 = db.enter().unwrap();
    let t2 = db.enter().unwrap();
    put(&db, t1, st, b"a", &encode(0));

    let v1 = decode(&db.search_key(t1, st, b"a").unwrap().0);
    let v2 = decode(&db.search_key(t2, st, b"a").unwrap().0);
    db.update(t1, st, b"a", &encode(v1 + 1)).unwrap();
    db.update(t2, st, b"a", &encode(v2 + 1)).unwrap();

    commit_tid(&db, t1);
    assert_eq!(db.commit(t2), Err(Error::Validation));

    assert_eq!(get(&db, t2, st, b"a"), Some(encode(1)));
}

#[test]
fn test_read_only_short_transaction_fails_after_overwrite() {
    let db = manual_db();
    let st = db.create_storage();
    let reader = db.enter().unwrap();
    let writer = db.enter().unwrap();
    put(&db, writer, st, b"k", b"old");

    db.search_key(reader, st, b"k").unwrap();
    put(&db, writer, st, b"k", b"new");
    assert_eq!(db.commit(reader), Err(Error::Validation));
}

#[test]
fn test_read_of_missing_tombstone_detects_reinsert() {
    let db = manual_builder().snapshot_interval(1).open().unwrap();
    let st = db.create_storage();
    let t1 = db.enter().unwrap();
    let t2 = db.enter().unwrap();
    put(&db, t1, st, b"k", b"v");
    advance(&db, 1);

    // Keep a snapshot reader so the delete leaves a tombstone behind.
    let ro = db.enter().unwrap();
    db.tx_begin(ro, TxOptions::read_only()).unwrap();
    db.delete_record(t1, st, b"k").unwrap();
    commit_tid(&db, t1);

    assert_eq!(db.search_key(t1, st, b"k"), Err(Error::NotFound));
    db.insert(t2, st, b"k", b"again").unwrap();
    commit_tid(&db, t2);
    db.upsert(t1, st, b"other", b"x").unwrap();
    assert_eq!(db.commit(t1), Err(Error::Validation));
    db.commit(ro).unwrap();
}

// =============================================================================
// WRITE-WRITE
// =============================================================================

#[test]
fn test_blind_writes_both_commit_in_order() {
    let db = manual_db();
    let st = db.create_storage();
    let t1 = db.enter().unwrap();
    let t2 = db.enter().unwrap();
    put(&db, t1, st, b"k", b"0");

    db.update(t1, st, b"k", b"1").unwrap();
    db.update(t2, st, b"k", b"2").unwrap();
    let first = commit_tid(&db, t1);
    let second = commit_tid(&db, t2);

    assert!(second > first);
    assert_eq!(get(&db, t1, st, b"k"), Some(b"2".to_vec()));
}

#[test]
fn test_update_of_concurrently_deleted_record() {
    let db = manual_db();
    let st = db.create_storage();
    let t1 = db.enter().unwrap();
    let t2 = db.enter().unwrap();
    put(&db, t1, st, b"k", b"v");

    db.update(t1, st, b"k", b"w").unwrap();
    db.delete_record(t2, st, b"k").unwrap();
    commit_tid(&db, t2);

    assert_eq!(db.commit(t1), Err(Error::WriteToDeletedRecord));
    assert_eq!(get(&db, t1, st, b"k"), None);
}

#[test]
fn test_update_of_revived_tombstone_fails_fast() {
    let db = manual_db();
    let st = db.create_storage();
    let reviver = db.enter().unwrap();
    let updater = db.enter().unwrap();
    let deleter = db.enter().unwrap();
    put(&db, reviver, st, b"k", b"v");
    advance(&db, 3);

    db.update(updater, st, b"k", b"w").unwrap();
    // A new snapshot epoch: the delete keeps the record linked as a tombstone.
    db.delete_record(deleter, st, b"k").unwrap();
    commit_tid(&db, deleter);
    assert_eq!(db.gc_stats().retired_tombstones, 1);

    // The revived tombstone stays locked until the reviver ends.
    db.insert(reviver, st, b"k", b"again").unwrap();
    assert_eq!(db.commit(updater), Err(Error::WriteToDeletedRecord));

    commit_tid(&db, reviver);
    assert_eq!(get(&db, updater, st, b"k"), Some(b"again".to_vec()));
}

#[test]
fn test_concurrent_inserts_of_same_key() {
    let db = manual_db();
    let st = db.create_storage();
    let t1 = db.enter().unwrap();
    let t2 = db.enter().unwrap();

    db.insert(t1, st, b"k", b"1").unwrap();
    assert_eq!(db.insert(t2, st, b"k", b"2"), Err(Error::ConcurrentInsert));
    commit_tid(&db, t1);
    assert_eq!(db.insert(t2, st, b"k", b"2"), Err(Error::AlreadyExists));
    db.abort(t2).unwrap();
    assert_eq!(get(&db, t2, st, b"k"), Some(b"1".to_vec()));
}

// =============================================================================
// LOCAL WRITE SET
// =============================================================================

#[test]
fn test_insert_delete_reinsert_within_one_transaction() {
    let db = manual_db();
    let st = db.create_storage();
    let t = db.enter().unwrap();

    assert_eq!(db.insert(t, st, b"k", b"1"), Ok(Notice::Ok));
    assert_eq!(db.delete_record(t, st, b"k"), Ok(Notice::CancelPreviousInsert));
    assert_eq!(db.insert(t, st, b"k", b"2"), Ok(Notice::Ok));
    commit_tid(&db, t);
    assert_eq!(get(&db, t, st, b"k"), Some(b"2".to_vec()));
}

#[test]
fn test_delete_then_upsert_becomes_update() {
    let db = manual_db();
    let st = db.create_storage();
    let t = db.enter().unwrap();
    put(&db, t, st, b"k", b"1");

    db.delete_record(t, st, b"k").unwrap();
    assert_eq!(db.update(t, st, b"k", b"x"), Err(Error::NotFound));
    assert_eq!(db.upsert(t, st, b"k", b"2"), Ok(Notice::CancelPreviousDelete));
    assert_eq!(
        db.search_key(t, st, b"k"),
        Ok((b"2".to_vec(), Notice::ReadFromOwnOperation))
    );
    commit_tid(&db, t);
    assert_eq!(get(&db, t, st, b"k"), Some(b"2".to_vec()));
}

#[test]
fn test_update_then_delete() {
    let db = manual_db();
    let st = db.create_storage();
    let t = db.enter().unwrap();
    put(&db, t, st, b"k", b"1");

    assert_eq!(db.upsert(t, st, b"k", b"2"), Ok(Notice::Ok));
    assert_eq!(db.upsert(t, st, b"k", b"3"), Ok(Notice::WriteToLocalWrite));
    assert_eq!(db.delete_record(t, st, b"k"), Ok(Notice::CancelPreviousUpdate));
    commit_tid(&db, t);
    assert_eq!(get(&db, t, st, b"k"), None);
}

// =============================================================================
// TIDS
// =============================================================================

#[test]
fn test_tids_increase_per_session_and_follow_epochs() {
    let db = manual_db();
    let st = db.create_storage();
    let t = db.enter().unwrap();

    let mut last = TidWord::default();
    for i in 0..5u64 {
        let tid = put(&db, t, st, b"k", &encode(i));
        assert!(tid > last);
        assert!(tid.is_latest() && !tid.is_locked() && !tid.is_absent());
        assert_eq!(tid.epoch(), db.current_epoch());
        last = tid;
        advance(&db, 1);
    }
}

#[test]
fn test_insert_delete_reinsert_across_transactions() {
    let db = manual_db();
    let st = db.create_storage();
    let t = db.enter().unwrap();

    let inserted = put(&db, t, st, b"k", b"1");
    db.delete_record(t, st, b"k").unwrap();
    let deleted = commit_tid(&db, t);
    assert_eq!(get(&db, t, st, b"k"), None);
    db.insert(t, st, b"k", b"2").unwrap();
    let reinserted = commit_tid(&db, t);

    assert!(inserted < deleted && deleted < reinserted);
    assert_eq!(get(&db, t, st, b"k"), Some(b"2".to_vec()));
}
