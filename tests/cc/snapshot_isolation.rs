//! Snapshot isolation tests for read-only transactions
//!
//! All tests use the default snapshot interval of 2 epochs and drive the
//! clock by hand. A read-only transaction begun at epoch `b` sees commits
//! from snapshot epochs below `(b - 1) / 2`.

use crate::common::*;
use tessera::prelude::*;

/// Open a manual database and move the clock to epoch 5 (snapshot epoch 2)
fn db_at_epoch_five() -> Database {
    let db = manual_db();
    advance(&db, 4);
    assert_eq!(db.current_epoch(), 5);
    db
}

#[test]
fn test_reader_keeps_pre_update_value() {
    let db = manual_db();
    let st = db.create_storage();
    let writer = db.enter().unwrap();
    let reader = db.enter().unwrap();
    put(&db, writer, st, b"k", b"v1");
    advance(&db, 4);

    db.tx_begin(reader, TxOptions::read_only()).unwrap();
    assert_eq!(db.search_key(reader, st, b"k"), Ok((b"v1".to_vec(), Notice::Ok)));

    put(&db, writer, st, b"k", b"v2");
    assert_eq!(db.search_key(reader, st, b"k").unwrap().0, b"v1".to_vec());

    // The view is stable however far the clock moves.
    advance(&db, 6);
    assert_eq!(db.search_key(reader, st, b"k").unwrap().0, b"v1".to_vec());
    assert_eq!(db.commit(reader), Ok(CommitResult::ReadOnly));

    assert_eq!(get_snapshot(&db, reader, st, b"k"), Some(b"v2".to_vec()));
    assert_eq!(get(&db, reader, st, b"k"), Some(b"v2".to_vec()));
}

#[test]
fn test_new_value_visible_after_two_snapshot_boundaries() {
    let db = db_at_epoch_five();
    let st = db.create_storage();
    let writer = db.enter().unwrap();
    let reader = db.enter().unwrap();
    put(&db, writer, st, b"k", b"v1");
    advance(&db, 4);

    put(&db, writer, st, b"k", b"v2");
    assert_eq!(get_snapshot(&db, reader, st, b"k"), Some(b"v1".to_vec()));
    advance(&db, 1);
    assert_eq!(get_snapshot(&db, reader, st, b"k"), Some(b"v1".to_vec()));
    advance(&db, 2);
    assert_eq!(get_snapshot(&db, reader, st, b"k"), Some(b"v2".to_vec()));
}

#[test]
fn test_reader_does_not_see_later_insert() {
    let db = db_at_epoch_five();
    let st = db.create_storage();
    let writer = db.enter().unwrap();
    let reader = db.enter().unwrap();

    db.tx_begin(reader, TxOptions::read_only()).unwrap();
    put(&db, writer, st, b"new", b"v");
    assert_eq!(db.search_key(reader, st, b"new"), Err(Error::NotFound));
    advance(&db, 3);
    assert_eq!(db.search_key(reader, st, b"new"), Err(Error::NotFound));
    db.commit(reader).unwrap();
}

#[test]
fn test_reader_sees_deleted_record() {
    let db = manual_db();
    let st = db.create_storage();
    let writer = db.enter().unwrap();
    let reader = db.enter().unwrap();
    put(&db, writer, st, b"k", b"v");
    advance(&db, 4);

    db.tx_begin(reader, TxOptions::read_only()).unwrap();
    db.delete_record(writer, st, b"k").unwrap();
    commit_tid(&db, writer);

    assert_eq!(get(&db, writer, st, b"k"), None);
    assert_eq!(db.search_key(reader, st, b"k").unwrap().0, b"v".to_vec());

    // Garbage collection must not unhook what the reader can still see.
    advance(&db, 6);
    db.collect_garbage();
    assert_eq!(db.search_key(reader, st, b"k").unwrap().0, b"v".to_vec());
    db.commit(reader).unwrap();
}

#[test]
fn test_reader_never_aborts_on_concurrent_writes() {
    let db = manual_db();
    let st = db.create_storage();
    let writer = db.enter().unwrap();
    let reader = db.enter().unwrap();
    for key in [&b"a"[..], &b"b"[..], &b"c"[..]] {
        put(&db, writer, st, key, &encode(10));
    }
    advance(&db, 4);

    db.tx_begin(reader, TxOptions::read_only()).unwrap();
    db.update(writer, st, b"a", &encode(5)).unwrap();
    db.update(writer, st, b"c", &encode(15)).unwrap();
    commit_tid(&db, writer);

    let total: u64 = [&b"a"[..], &b"b"[..], &b"c"[..]]
        .iter()
        .map(|key| decode(&db.search_key(reader, st, key).unwrap().0))
        .sum();
    assert_eq!(total, 30);
    assert_eq!(db.commit(reader), Ok(CommitResult::ReadOnly));
}

#[test]
fn test_read_only_rejects_writes() {
    let db = manual_db();
    let st = db.create_storage();
    let reader = db.enter().unwrap();
    db.tx_begin(reader, TxOptions::read_only()).unwrap();

    assert_eq!(db.insert(reader, st, b"k", b"v"), Err(Error::IllegalOperation));
    assert_eq!(db.upsert(reader, st, b"k", b"v"), Err(Error::IllegalOperation));
    assert_eq!(db.update(reader, st, b"k", b"v"), Err(Error::IllegalOperation));
    assert_eq!(db.delete_record(reader, st, b"k"), Err(Error::IllegalOperation));
    db.abort(reader).unwrap();
}

#[test]
fn test_reader_pins_min_snapshot_epoch() {
    let db = db_at_epoch_five();
    let reader = db.enter().unwrap();
    db.tx_begin(reader, TxOptions::read_only()).unwrap();

    advance(&db, 10);
    assert_eq!(db.min_snapshot_epoch(), 2);
    db.commit(reader).unwrap();
    advance(&db, 1);
    assert_eq!(db.min_snapshot_epoch(), 7);
}
