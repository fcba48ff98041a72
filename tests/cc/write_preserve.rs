//! Long transaction tests
//!
//! Long transactions reserve the storages they write, wait for their valid
//! epoch and are resolved in admission order. Keys are populated by short
//! transactions before any reservation exists.

use crate::common::*;
use tessera::prelude::*;

fn pending_id(result: Result<CommitResult>) -> LongTxId {
    match result {
        Ok(CommitResult::Pending { id }) => id,
        other => panic!("expected a pending long transaction, got {:?}", other),
    }
}

fn committed(state: Result<LongTxState>) -> TidWord {
    match state {
        Ok(LongTxState::Committed { tid }) => tid,
        other => panic!("expected a committed long transaction, got {:?}", other),
    }
}

#[test]
fn test_long_commit_becomes_visible() {
    let db = manual_db();
    let st = db.create_storage();
    let long = db.enter().unwrap();
    let short = db.enter().unwrap();
    put(&db, short, st, b"k", &encode(1));

    db.tx_begin(long, TxOptions::long([st])).unwrap();
    advance(&db, 1);
    let v = decode(&db.search_key(long, st, b"k").unwrap().0);
    db.update(long, st, b"k", &encode(v * 10)).unwrap();
    db.insert(long, st, b"fresh", b"x").unwrap();

    // Pending insert of the long transaction is visible as such.
    assert_eq!(db.search_key(short, st, b"fresh"), Err(Error::ConcurrentInsert));
    db.abort(short).unwrap();

    let id = pending_id(db.commit(long));
    let tid = committed(wait_long(&db, long, id));
    assert_eq!(tid.epoch(), 2);
    assert_eq!(db.write_preserve_count(st), 0);
    assert_eq!(db.pending_long_transactions(), 0);

    assert_eq!(get(&db, short, st, b"k"), Some(encode(10)));
    assert_eq!(get(&db, short, st, b"fresh"), Some(b"x".to_vec()));
}

#[test]
fn test_short_commit_before_valid_epoch_succeeds() {
    let db = manual_db();
    let st = db.create_storage();
    let long = db.enter().unwrap();
    let short = db.enter().unwrap();
    put(&db, short, st, b"k", b"0");

    db.upsert(short, st, b"k", b"1").unwrap();
    db.tx_begin(long, TxOptions::long([st])).unwrap();
    commit_tid(&db, short);
    db.abort(long).unwrap();
}

#[test]
fn test_short_aborted_at_commit_by_reservation() {
    let db = manual_db();
    let st = db.create_storage();
    let long = db.enter().unwrap();
    let short = db.enter().unwrap();
    put(&db, short, st, b"k", b"0");

    db.upsert(short, st, b"k", b"short").unwrap();
    db.tx_begin(long, TxOptions::long([st])).unwrap();
    advance(&db, 1);
    let err = db.commit(short).unwrap_err();
    assert_eq!(err, Error::AbortedByWritePreserve);
    assert_eq!(err.code(), "ERR_CONFLICT_ON_WRITE_PRESERVE");
    assert!(err.is_abort());

    // Reads of a reserved storage are still allowed.
    assert_eq!(get(&db, short, st, b"k"), Some(b"0".to_vec()));
    assert_eq!(
        db.upsert(short, st, b"k", b"again"),
        Err(Error::ConflictOnWritePreserve)
    );
    db.abort(short).unwrap();

    db.upsert(long, st, b"k", b"long").unwrap();
    let id = pending_id(db.commit(long));
    committed(wait_long(&db, long, id));
    assert_eq!(get(&db, short, st, b"k"), Some(b"long".to_vec()));
}

#[test]
fn test_long_transactions_resolve_in_admission_order() {
    let db = manual_db();
    let st = db.create_storage();
    let first = db.enter().unwrap();
    let second = db.enter().unwrap();
    put(&db, first, st, b"k", b"0");

    db.tx_begin(first, TxOptions::long([st])).unwrap();
    db.tx_begin(second, TxOptions::long([st])).unwrap();
    assert_eq!(db.write_preserve_count(st), 2);
    advance(&db, 1);

    db.upsert(second, st, b"k", b"2").unwrap();
    let id2 = pending_id(db.commit(second));
    db.resolve_long_transactions();
    assert_eq!(db.check_commit(second, id2), Ok(LongTxState::Waiting));
    assert_eq!(db.pending_long_transactions(), 1);

    db.upsert(first, st, b"k", b"1").unwrap();
    let id1 = pending_id(db.commit(first));
    let tid1 = committed(wait_long(&db, first, id1));
    let tid2 = committed(wait_long(&db, second, id2));

    assert!(tid2 > tid1);
    assert_eq!(get(&db, first, st, b"k"), Some(b"2".to_vec()));
}

#[test]
fn test_write_preserve_limit() {
    let db = manual_builder().write_preserve_limit(1).open().unwrap();
    let a = db.create_storage();
    let b = db.create_storage();
    let t1 = db.enter().unwrap();
    let t2 = db.enter().unwrap();

    db.tx_begin(t1, TxOptions::long([a])).unwrap();
    assert_eq!(
        db.tx_begin(t2, TxOptions::long([b, a])),
        Err(Error::WritePreserveLimit)
    );
    // Nothing was registered by the failed admission.
    assert_eq!(db.write_preserve_count(b), 0);
    db.tx_begin(t2, TxOptions::long([b, b])).unwrap();
    assert_eq!(db.write_preserve_count(b), 1);

    db.abort(t1).unwrap();
    db.abort(t2).unwrap();
    db.tx_begin(t2, TxOptions::long([a])).unwrap();
    db.abort(t2).unwrap();
}

#[test]
fn test_operations_before_valid_epoch_are_premature() {
    let db = manual_db();
    let st = db.create_storage();
    let t = db.enter().unwrap();
    put(&db, t, st, b"k", b"v");

    db.tx_begin(t, TxOptions::long([st])).unwrap();
    assert_eq!(db.search_key(t, st, b"k"), Err(Error::Premature));
    assert_eq!(db.upsert(t, st, b"k", b"w"), Err(Error::Premature));
    assert_eq!(
        db.open_scan(t, st, Bound::Unbounded, Bound::Unbounded, None),
        Err(Error::Premature)
    );

    // Committing early queues it until the valid epoch arrives.
    let id = pending_id(db.commit(t));
    assert_eq!(db.check_commit(t, id), Ok(LongTxState::Waiting));
    committed(wait_long(&db, t, id));
    assert_eq!(get(&db, t, st, b"k"), Some(b"v".to_vec()));
}

#[test]
fn test_write_outside_reservation_rejected() {
    let db = manual_db();
    let reserved = db.create_storage();
    let other = db.create_storage();
    let t = db.enter().unwrap();
    put(&db, t, other, b"k", b"v");

    db.tx_begin(t, TxOptions::long([reserved])).unwrap();
    advance(&db, 1);
    assert_eq!(db.upsert(t, other, b"k", b"w"), Err(Error::WriteWithoutWp));
    assert_eq!(db.search_key(t, other, b"k").unwrap().0, b"v".to_vec());
    db.abort(t).unwrap();
    assert_eq!(db.write_preserve_count(reserved), 0);
}

#[test]
fn test_long_transaction_fails_validation() {
    let db = manual_db();
    let reserved = db.create_storage();
    let source = db.create_storage();
    let long = db.enter().unwrap();
    let short = db.enter().unwrap();
    put(&db, short, source, b"k", &encode(1));
    put(&db, short, reserved, b"x", b"old");

    db.tx_begin(long, TxOptions::long([reserved])).unwrap();
    advance(&db, 1);
    db.search_key(long, source, b"k").unwrap();
    db.update(long, reserved, b"x", b"new").unwrap();

    put(&db, short, source, b"k", &encode(2));

    let id = pending_id(db.commit(long));
    assert_eq!(wait_long(&db, long, id), Err(Error::Validation));
    assert_eq!(db.check_commit(long, id), Err(Error::NotFound));
    assert_eq!(db.write_preserve_count(reserved), 0);
    assert_eq!(get(&db, short, reserved, b"x"), Some(b"old".to_vec()));
}

#[test]
fn test_check_commit_unknown_id() {
    let db = manual_db();
    let t = db.enter().unwrap();
    assert_eq!(
        db.check_commit(t, LongTxId::new(u64::MAX)),
        Err(Error::NotFound)
    );
}

#[test]
fn test_long_transaction_does_not_hold_epochs() {
    let db = manual_db();
    let st = db.create_storage();
    let t = db.enter().unwrap();
    put(&db, t, st, b"k", b"v");

    db.tx_begin(t, TxOptions::long([st])).unwrap();
    advance(&db, 1);
    db.search_key(t, st, b"k").unwrap();
    advance(&db, 5);
    db.upsert(t, st, b"k", b"w").unwrap();
    let id = pending_id(db.commit(t));
    let tid = committed(wait_long(&db, t, id));
    assert_eq!(tid.epoch(), db.current_epoch());
}
