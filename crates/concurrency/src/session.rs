//! Session table
//!
//! Sessions live in a fixed arena sized at engine construction. `enter`
//! claims a free slot with a CAS on its `occupied` flag and hands out a
//! [`Token`] carrying the slot index and its generation; `leave` bumps the
//! generation, so stale tokens are rejected instead of touching a reused
//! slot.
//!
//! One extra slot past the caller-visible capacity belongs to the long
//! transaction resolver. It is never handed out, but participates in the
//! epoch gate and owns a GC shard like any other slot.
//!
//! # Shared vs local state
//!
//! Each slot exposes two atomics other threads read without locking:
//! - `observed_epoch`: epoch cached by a running short transaction or a
//!   committer, 0 when none. The epoch thread waits for these to catch up.
//! - `reader_epoch`: begin epoch of a running read-only transaction, 0 when
//!   none. Snapshot retention is computed from these.
//!
//! Everything else sits behind the slot's `Mutex<SessionState>`, which only
//! the token holder takes.

use crate::local_set::{NodeSet, ReadSet, WriteSet};
use crate::scan::ScanCache;
use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tessera_core::{reader_snapshot_epoch, Epoch, Error, LongTxId, Result, StorageId, TidWord, TxType};

/// Handle of an entered session
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    slot: u32,
    generation: u32,
}

impl Token {
    /// Slot index in the session table
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot as usize
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({}#{})", self.slot, self.generation)
    }
}

/// Admission data of a long transaction
#[derive(Debug, Clone)]
pub(crate) struct LongTxInfo {
    pub id: LongTxId,
    pub valid_epoch: Epoch,
    pub write_preserve: SmallVec<[StorageId; 4]>,
}

/// A running transaction
#[derive(Debug)]
pub(crate) struct TxContext {
    pub kind: TxType,
    pub begin_epoch: Epoch,
    pub write_set: WriteSet,
    pub read_set: ReadSet,
    pub node_set: NodeSet,
    pub long: Option<LongTxInfo>,
}

impl TxContext {
    pub fn new(kind: TxType, begin_epoch: Epoch) -> Self {
        Self {
            kind,
            begin_epoch,
            write_set: WriteSet::new(),
            read_set: ReadSet::default(),
            node_set: NodeSet::default(),
            long: None,
        }
    }

    pub fn long(info: LongTxInfo, begin_epoch: Epoch) -> Self {
        Self {
            long: Some(info),
            ..Self::new(TxType::Long, begin_epoch)
        }
    }
}

/// State only the token holder touches
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub tx: Option<TxContext>,
    /// Most recent commit TID chosen by this session
    pub last_tid: TidWord,
    pub scans: ScanCache,
}

/// One slot of the session table
pub(crate) struct Session {
    occupied: AtomicBool,
    generation: AtomicU32,
    pub observed_epoch: AtomicU32,
    pub reader_epoch: AtomicU32,
    state: Mutex<SessionState>,
}

impl Session {
    fn new(occupied: bool) -> Self {
        Self {
            occupied: AtomicBool::new(occupied),
            generation: AtomicU32::new(0),
            observed_epoch: AtomicU32::new(0),
            reader_epoch: AtomicU32::new(0),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    /// Stop holding back the epoch gate and snapshot retention
    pub fn clear_epochs(&self) {
        self.observed_epoch.store(0, Ordering::SeqCst);
        self.reader_epoch.store(0, Ordering::SeqCst);
    }
}

/// Fixed arena of sessions
pub(crate) struct SessionTable {
    slots: Box<[Session]>,
    capacity: usize,
}

impl SessionTable {
    /// Table with `capacity` caller slots plus the resolver slot
    pub fn new(capacity: usize) -> Self {
        let slots = (0..=capacity)
            .map(|i| Session::new(i == capacity))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { slots, capacity }
    }

    /// Total slot count, including the resolver slot
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Index of the resolver slot
    pub fn resolver_slot(&self) -> usize {
        self.capacity
    }

    pub fn resolver(&self) -> &Session {
        &self.slots[self.capacity]
    }

    /// Claim a free caller slot
    pub fn acquire(&self) -> Result<Token> {
        for (i, session) in self.slots[..self.capacity].iter().enumerate() {
            if session
                .occupied
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(Token {
                    slot: i as u32,
                    generation: session.generation.load(Ordering::Acquire),
                });
            }
        }
        Err(Error::SessionLimit)
    }

    /// Lock the session `token` refers to
    ///
    /// The generation is checked under the state lock, so a concurrent
    /// `release` cannot slip in between the check and the caller's use.
    pub fn lock(&self, token: Token) -> Result<(&Session, MutexGuard<'_, SessionState>)> {
        let session = self
            .slots
            .get(token.slot())
            .filter(|_| token.slot() < self.capacity)
            .ok_or(Error::NotInASession)?;
        let state = session.lock_state();
        if !session.occupied.load(Ordering::Acquire)
            || session.generation.load(Ordering::Acquire) != token.generation
        {
            return Err(Error::NotInASession);
        }
        Ok((session, state))
    }

    /// Free the slot held by a locked session
    ///
    /// The caller must have ended any transaction first.
    pub fn release(&self, session: &Session, mut state: MutexGuard<'_, SessionState>) {
        *state = SessionState::default();
        session.clear_epochs();
        session.generation.fetch_add(1, Ordering::AcqRel);
        session.occupied.store(false, Ordering::Release);
    }

    /// Whether every slot running a short transaction or a commit has
    /// observed at least `current`
    pub fn all_observed(&self, current: Epoch) -> bool {
        self.slots.iter().all(|s| {
            let observed = s.observed_epoch.load(Ordering::SeqCst);
            observed == 0 || observed >= current
        })
    }

    /// Smallest snapshot epoch among running read-only transactions
    pub fn min_reader_snapshot(&self, interval: u32) -> Option<Epoch> {
        self.slots
            .iter()
            .map(|s| s.reader_epoch.load(Ordering::SeqCst))
            .filter(|&e| e != 0)
            .map(|e| reader_snapshot_epoch(e, interval))
            .min()
    }

    /// Number of caller slots currently entered
    pub fn active_count(&self) -> usize {
        self.slots[..self.capacity]
            .iter()
            .filter(|s| s.occupied.load(Ordering::Acquire))
            .count()
    }
}

impl fmt::Debug for SessionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTable")
            .field("capacity", &self.capacity)
            .field("active", &self.active_count())
            .finish()
    }
}
