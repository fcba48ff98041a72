//! Long transaction resolution queue
//!
//! `commit` on a long transaction only hands its context over; the
//! transaction is resolved later, in `(valid_epoch, id)` order, once nothing
//! ordered before it still holds a reservation on one of its storages.
//! Outcomes are kept until the owner collects them with `check_commit`.

use crate::session::{LongTxInfo, TxContext};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tessera_core::{Error, LongTxId, TidWord};

/// A long transaction waiting for resolution
#[derive(Debug)]
pub(crate) struct PendingLongTx {
    pub info: LongTxInfo,
    pub tx: TxContext,
}

/// Final state of a resolved long transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LongTxOutcome {
    Committed(TidWord),
    Aborted(Error),
}

/// What `check_commit` reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    Waiting,
    Resolved(LongTxOutcome),
    Unknown,
}

#[derive(Debug)]
pub(crate) struct LongTxResolver {
    next_id: AtomicU64,
    queue: Mutex<Vec<PendingLongTx>>,
    waiting: DashSet<LongTxId>,
    outcomes: DashMap<LongTxId, LongTxOutcome>,
}

impl LongTxResolver {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            queue: Mutex::new(Vec::new()),
            waiting: DashSet::new(),
            outcomes: DashMap::new(),
        }
    }

    pub fn next_id(&self) -> LongTxId {
        LongTxId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn submit(&self, pending: PendingLongTx) {
        self.waiting.insert(pending.info.id);
        self.queue.lock().push(pending);
    }

    /// Resolve every ready transaction
    ///
    /// With `blocking == false` the pass is skipped when another thread is
    /// already resolving. After each resolution the scan restarts, since
    /// releasing reservations can make earlier entries ready.
    pub fn resolve<R, F>(&self, blocking: bool, mut is_ready: R, mut finalize: F) -> usize
    where
        R: FnMut(&PendingLongTx) -> bool,
        F: FnMut(PendingLongTx) -> LongTxOutcome,
    {
        let mut queue = if blocking {
            self.queue.lock()
        } else {
            match self.queue.try_lock() {
                Some(queue) => queue,
                None => return 0,
            }
        };
        queue.sort_by_key(|p| (p.info.valid_epoch, p.info.id));

        let mut resolved = 0;
        let mut i = 0;
        while i < queue.len() {
            if !is_ready(&queue[i]) {
                i += 1;
                continue;
            }
            let pending = queue.remove(i);
            let id = pending.info.id;
            let outcome = finalize(pending);
            // Outcome first: a concurrent lookup must never see neither.
            self.outcomes.insert(id, outcome);
            self.waiting.remove(&id);
            resolved += 1;
            i = 0;
        }
        resolved
    }

    /// Current state of `id`; a resolved outcome is handed out once
    pub fn lookup(&self, id: LongTxId) -> Lookup {
        if self.waiting.contains(&id) {
            return Lookup::Waiting;
        }
        match self.outcomes.remove(&id) {
            Some((_, outcome)) => Lookup::Resolved(outcome),
            None => Lookup::Unknown,
        }
    }

    pub fn queued(&self) -> usize {
        self.waiting.len()
    }
}
