//! Model-based tests
//!
//! Random single-session workloads checked against a `BTreeMap`. Each case
//! runs a series of transactions that either commit or abort, with epoch
//! advances and collections in between, and compares every read, scan and
//! snapshot with the model.

use crate::common::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use tessera::prelude::*;

type Model = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Debug, Clone)]
enum Op {
    Insert(u8, u8),
    Update(u8, u8),
    Upsert(u8, u8),
    Delete(u8),
    Read(u8),
    Scan,
}

#[derive(Debug, Clone)]
struct Tx {
    ops: Vec<Op>,
    commit: bool,
    /// Epochs to advance after the transaction ends
    advance: u32,
    collect: bool,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let key = 0u8..6;
    prop_oneof![
        (key.clone(), any::<u8>()).prop_map(|(k, v)| Op::Insert(k, v)),
        (key.clone(), any::<u8>()).prop_map(|(k, v)| Op::Update(k, v)),
        (key.clone(), any::<u8>()).prop_map(|(k, v)| Op::Upsert(k, v)),
        key.clone().prop_map(Op::Delete),
        key.prop_map(Op::Read),
        Just(Op::Scan),
    ]
}

fn tx_strategy() -> impl Strategy<Value = Tx> {
    (
        prop::collection::vec(op_strategy(), 1..8),
        prop::bool::weighted(0.8),
        0u32..3,
        any::<bool>(),
    )
        .prop_map(|(ops, commit, advance, collect)| Tx {
            ops,
            commit,
            advance,
            collect,
        })
}

/// Apply `op` to the engine and to the transaction's view of the model
fn apply(db: &Database, token: Token, st: StorageId, view: &mut Model, op: &Op) {
    match *op {
        Op::Insert(k, v) => {
            let result = db.insert(token, st, &[k], &[v]);
            if view.contains_key(&[k][..]) {
                assert_eq!(result, Err(Error::AlreadyExists));
            } else {
                assert!(result.is_ok(), "insert {}: {:?}", k, result);
                view.insert(vec![k], vec![v]);
            }
        }
        Op::Update(k, v) => {
            let result = db.update(token, st, &[k], &[v]);
            if view.contains_key(&[k][..]) {
                assert!(result.is_ok(), "update {}: {:?}", k, result);
                view.insert(vec![k], vec![v]);
            } else {
                assert_eq!(result, Err(Error::NotFound));
            }
        }
        Op::Upsert(k, v) => {
            let result = db.upsert(token, st, &[k], &[v]);
            assert!(result.is_ok(), "upsert {}: {:?}", k, result);
            view.insert(vec![k], vec![v]);
        }
        Op::Delete(k) => {
            let result = db.delete_record(token, st, &[k]);
            if view.remove(&[k][..]).is_some() {
                assert!(result.is_ok(), "delete {}: {:?}", k, result);
            } else {
                assert_eq!(result, Err(Error::NotFound));
            }
        }
        Op::Read(k) => {
            let result = db.search_key(token, st, &[k]).map(|(value, _)| value);
            match view.get(&[k][..]) {
                Some(value) => assert_eq!(result.as_ref(), Ok(value)),
                None => assert_eq!(result, Err(Error::NotFound)),
            }
        }
        Op::Scan => {
            let expected: Vec<_> = view.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            assert_eq!(scan_all(db, token, st), expected);
        }
    }
}

fn scan_all(db: &Database, token: Token, st: StorageId) -> Vec<(Vec<u8>, Vec<u8>)> {
    let handle = match db.open_scan(token, st, Bound::Unbounded, Bound::Unbounded, None) {
        Ok(handle) => handle,
        Err(Error::NotFound) => return Vec::new(),
        Err(e) => panic!("open_scan failed: {:?}", e),
    };
    let mut items = Vec::new();
    while let Some(item) = db.read_from_scan(token, handle).unwrap() {
        items.push((item.key, item.value));
    }
    db.close_scan(token, handle).unwrap();
    items
}

fn run(txs: Vec<Tx>) {
    let db = manual_db();
    let st = db.create_storage();
    let t = db.enter().unwrap();
    let mut committed = Model::new();

    for tx in &txs {
        let mut view = committed.clone();
        for op in &tx.ops {
            apply(&db, t, st, &mut view, op);
        }
        if tx.commit {
            commit_tid(&db, t);
            committed = view;
        } else {
            db.abort(t).unwrap();
        }
        advance(&db, tx.advance);
        if tx.collect {
            db.collect_garbage();
        }
    }

    for k in 0u8..6 {
        assert_eq!(get(&db, t, st, &[k]), committed.get(&[k][..]).cloned());
    }

    // Once the snapshot horizon passes the last commit, snapshots agree too.
    advance(&db, 3);
    db.collect_garbage();
    db.tx_begin(t, TxOptions::read_only()).unwrap();
    let expected: Vec<_> = committed.into_iter().collect();
    assert_eq!(scan_all(&db, t, st), expected);
    assert_eq!(db.commit(t), Ok(CommitResult::ReadOnly));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_single_session_matches_model(txs in prop::collection::vec(tx_strategy(), 1..12)) {
        run(txs);
    }
}
