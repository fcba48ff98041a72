//! Concurrency control engine
//!
//! `Engine` owns every shared component and implements
//! [`ConcurrencyControl`] on top of them:
//!
//! | Component | Role |
//! |-----------|------|
//! | [`EpochClock`] | global epoch, advanced by `try_advance_epoch` |
//! | `SessionTable` | session slots, epoch gate, snapshot horizon |
//! | [`Index`] | storages of records |
//! | [`LogSink`] | receives every applied write |
//! | `GarbageCollector` | epoch-tagged retire queues |
//! | `WpRegistry` | write-preserve reservations |
//! | `LongTxResolver` | queued long transactions |
//!
//! The engine spawns no threads. Periodic work (epoch advance, GC, long
//! transaction resolution) is exposed as plain methods the embedding layer
//! calls from its own workers, or tests call directly.

use crate::commit::{self, CommitEnv};
use crate::config::{ConfigError, EngineConfig};
use crate::epoch::EpochClock;
use crate::gc::{GarbageCollector, GcHorizon, GcStatsSnapshot};
use crate::interface::{CommitResult, ConcurrencyControl, LongTxState, ScanItem};
use crate::local_set::{WriteEntry, WriteKind};
use crate::resolver::{LongTxOutcome, LongTxResolver, Lookup, PendingLongTx};
use crate::session::{LongTxInfo, Session, SessionState, SessionTable, Token, TxContext};
use crate::snapshot::{read_snapshot, SnapshotPolicy};
use crate::wp::{WpRegistry, WpResult};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tessera_core::{
    reader_snapshot_epoch, reclamation_epoch, Epoch, Error, LongTxId, Notice, Result,
    ScanHandle, StorageId, TidWord, TxOptions, TxType,
};
use tessera_durability::{LogSink, NullLog};
use tessera_storage::{Backoff, Index, InsertOutcome, Record, SkipListIndex};
use tracing::{debug, trace, warn};

/// Consecutive refused advances before the stall is logged
const STALL_WARN_THRESHOLD: u64 = 256;

/// In-memory OCC engine
pub struct Engine {
    config: EngineConfig,
    clock: EpochClock,
    sessions: SessionTable,
    index: Arc<dyn Index>,
    log: Arc<dyn LogSink>,
    gc: GarbageCollector,
    wp: WpRegistry,
    resolver: LongTxResolver,
    next_storage: AtomicU64,
    /// Cached at each epoch advance; may lag behind, never ahead
    min_snapshot_epoch: AtomicU32,
    /// Serializes epoch advances
    advance_lock: Mutex<()>,
    stalled_advances: AtomicU64,
}

impl Engine {
    /// Engine over a fresh skip-list index, without a log
    pub fn new(config: EngineConfig) -> std::result::Result<Self, ConfigError> {
        Self::with_components(config, Arc::new(SkipListIndex::new()), Arc::new(NullLog))
    }

    /// Engine over the given index and log sink
    pub fn with_components(
        config: EngineConfig,
        index: Arc<dyn Index>,
        log: Arc<dyn LogSink>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let clock = EpochClock::new();
        let sessions = SessionTable::new(config.max_sessions);
        let min_snapshot = reader_snapshot_epoch(clock.current(), config.snapshot_interval);
        let next_storage = index
            .list_storages()
            .iter()
            .map(|s| s.as_u64() + 1)
            .max()
            .unwrap_or(1);
        let wp = WpRegistry::new(config.write_preserve_limit);
        for storage in index.list_storages() {
            wp.create(storage);
        }
        Ok(Self {
            gc: GarbageCollector::new(sessions.len()),
            wp,
            resolver: LongTxResolver::new(),
            next_storage: AtomicU64::new(next_storage),
            min_snapshot_epoch: AtomicU32::new(min_snapshot),
            advance_lock: Mutex::new(()),
            stalled_advances: AtomicU64::new(0),
            config,
            clock,
            sessions,
            index,
            log,
        })
    }

    /// Configuration in effect
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current global epoch
    pub fn current_epoch(&self) -> Epoch {
        self.clock.current()
    }

    /// Smallest snapshot epoch a running read-only transaction may use
    pub fn min_snapshot_epoch(&self) -> Epoch {
        self.min_snapshot_epoch.load(Ordering::Acquire)
    }

    /// Number of entered sessions
    pub fn active_sessions(&self) -> usize {
        self.sessions.active_count()
    }

    /// Long transactions queued and not yet resolved
    pub fn pending_long_transactions(&self) -> usize {
        self.resolver.queued()
    }

    /// Reservations currently held on `storage`
    pub fn write_preserve_count(&self, storage: StorageId) -> usize {
        self.wp.reservations(storage)
    }

    /// GC counters
    pub fn gc_stats(&self) -> GcStatsSnapshot {
        self.gc.stats()
    }

    // ========================================================================
    // Storage catalog
    // ========================================================================

    /// Create an empty storage with a fresh id
    pub fn create_storage(&self) -> StorageId {
        loop {
            let id = StorageId::new(self.next_storage.fetch_add(1, Ordering::Relaxed));
            if self.index.create_storage(id) {
                self.wp.create(id);
                debug!(storage = %id, "Storage created");
                return id;
            }
        }
    }

    /// Drop a storage and its reservations
    ///
    /// Transactions still holding records of the storage keep them alive,
    /// but further operations on it fail with `StorageNotFound`.
    pub fn delete_storage(&self, storage: StorageId) -> Result<()> {
        if !self.index.delete_storage(storage) {
            return Err(Error::StorageNotFound);
        }
        self.wp.remove(storage);
        debug!(storage = %storage, "Storage deleted");
        Ok(())
    }

    /// Ids of every storage
    pub fn list_storages(&self) -> Vec<StorageId> {
        self.index.list_storages()
    }

    // ========================================================================
    // Periodic work
    // ========================================================================

    /// Advance the epoch if every running short transaction has observed it
    ///
    /// Notifies the log sink and refreshes the snapshot horizon on success.
    pub fn try_advance_epoch(&self) -> bool {
        let _guard = self.advance_lock.lock();
        let current = self.clock.current();
        if !self.sessions.all_observed(current) {
            let stalled = self.stalled_advances.fetch_add(1, Ordering::Relaxed) + 1;
            if stalled % STALL_WARN_THRESHOLD == 0 {
                warn!(epoch = current, stalled, "Epoch advance blocked by a running transaction");
            }
            return false;
        }
        self.stalled_advances.store(0, Ordering::Relaxed);

        let next = self.clock.advance();
        self.log.on_epoch_advanced(next);
        self.refresh_min_snapshot_epoch(next);
        trace!(epoch = next, "Epoch advanced");
        true
    }

    fn refresh_min_snapshot_epoch(&self, current: Epoch) {
        let interval = self.config.snapshot_interval;
        let floor = reader_snapshot_epoch(current, interval);
        let min = self
            .sessions
            .min_reader_snapshot(interval)
            .map_or(floor, |reader| reader.min(floor));
        self.min_snapshot_epoch.store(min, Ordering::Release);
    }

    fn horizon(&self) -> GcHorizon {
        let mut reclamation = reclamation_epoch(self.clock.current());
        if let Some(durable) = self.log.durable_epoch() {
            reclamation = reclamation.min(durable);
        }
        GcHorizon {
            reclamation_epoch: reclamation,
            min_snapshot_epoch: self.min_snapshot_epoch(),
            snapshot_interval: self.config.snapshot_interval,
        }
    }

    /// Sweep every GC shard and return the number of items reclaimed
    pub fn collect_garbage(&self) -> u64 {
        let horizon = self.horizon();
        self.wp.prune_results(horizon.reclamation_epoch);
        self.gc.sweep(horizon, &*self.index)
    }

    /// Resolve every ready long transaction, waiting for a concurrent pass
    pub fn resolve_long_transactions(&self) -> usize {
        self.resolve(true)
    }

    fn resolve(&self, blocking: bool) -> usize {
        let current = self.clock.current();
        self.resolver.resolve(
            blocking,
            |p| {
                current >= p.info.valid_epoch
                    && !self
                        .wp
                        .has_predecessor(p.info.id, p.info.valid_epoch, &p.info.write_preserve)
            },
            |p| self.finalize_long(p),
        )
    }

    /// Commit a ready long transaction on the resolver slot
    fn finalize_long(&self, pending: PendingLongTx) -> LongTxOutcome {
        let PendingLongTx { info, mut tx } = pending;
        let session = self.sessions.resolver();
        let mut state = session.lock_state();
        let env = self.env(self.sessions.resolver_slot(), session);
        let floor = self.wp.max_committed_tid(&info.write_preserve);

        let result = commit::commit(&env, &mut tx, state.last_tid, floor);
        session.clear_epochs();

        let (outcome, tid) = match result {
            Ok(tid) => {
                state.last_tid = tid;
                (LongTxOutcome::Committed(tid), tid)
            }
            Err(reason) => (LongTxOutcome::Aborted(reason), TidWord::default()),
        };
        self.wp.release(
            info.id,
            &info.write_preserve,
            Some(WpResult {
                epoch: info.valid_epoch,
                id: info.id,
                committed: tid != TidWord::default(),
                tid,
            }),
        );
        debug!(id = %info.id, valid_epoch = info.valid_epoch, ?outcome, "Long transaction resolved");
        outcome
    }

    // ========================================================================
    // Transaction helpers
    // ========================================================================

    fn env<'a>(&'a self, shard: usize, session: &'a Session) -> CommitEnv<'a> {
        CommitEnv {
            clock: &self.clock,
            index: &*self.index,
            log: &*self.log,
            gc: &self.gc,
            wp: &self.wp,
            snapshots: SnapshotPolicy {
                interval: self.config.snapshot_interval,
                min_snapshot_epoch: self.min_snapshot_epoch(),
            },
            shard,
            session,
        }
    }

    /// Running transaction of the session, beginning a short one if none
    ///
    /// A short transaction re-publishes the epoch on every call so the epoch
    /// gate tracks its most recent operation.
    fn ensure_tx<'s>(&self, session: &Session, tx: &'s mut Option<TxContext>) -> &'s mut TxContext {
        let short = tx.as_ref().map_or(true, |tx| tx.kind == TxType::Short);
        let epoch = if short {
            self.clock.publish(&session.observed_epoch)
        } else {
            self.clock.current()
        };
        tx.get_or_insert_with(|| TxContext::new(TxType::Short, epoch))
    }

    fn check_long_ready(&self, tx: &TxContext) -> Result<()> {
        match &tx.long {
            Some(info) if self.clock.current() < info.valid_epoch => Err(Error::Premature),
            _ => Ok(()),
        }
    }

    fn check_write(&self, tx: &TxContext, storage: StorageId) -> Result<()> {
        if !self.index.has_storage(storage) {
            return Err(Error::StorageNotFound);
        }
        match tx.kind {
            TxType::ReadOnly => Err(Error::IllegalOperation),
            TxType::Long => {
                self.check_long_ready(tx)?;
                match &tx.long {
                    Some(info) if info.write_preserve.contains(&storage) => Ok(()),
                    _ => Err(Error::WriteWithoutWp),
                }
            }
            TxType::Short => {
                if self.wp.conflicts(storage, self.clock.current()) {
                    Err(Error::ConflictOnWritePreserve)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Read the latest committed state of `record`, registering the read
    fn read_latest(&self, tx: &mut TxContext, storage: StorageId, record: &Arc<Record>) -> Result<Vec<u8>> {
        let mut backoff = Backoff::new();
        loop {
            let tid = record.load_tid();
            if tid.is_locked() {
                if tid.is_absent() {
                    tx.read_set.push(storage, Arc::clone(record), tid);
                    return Err(Error::ConcurrentInsert);
                }
                if backoff.is_exhausted(self.config.spin_retries) {
                    return Err(Error::ConcurrentUpdate);
                }
                backoff.snooze();
                continue;
            }
            if tid.is_absent() {
                if tid.is_latest() {
                    tx.read_set.push(storage, Arc::clone(record), tid);
                    return Err(Error::NotFound);
                }
                return Err(Error::ConcurrentDelete);
            }
            let value = record.read_value();
            if record.load_tid() != tid {
                backoff.snooze();
                continue;
            }
            tx.read_set.push(storage, Arc::clone(record), tid);
            return Ok(value);
        }
    }

    /// Place a pending insert for `key`, reviving a tombstone if one is linked
    fn place_insert(&self, tx: &mut TxContext, storage: StorageId, key: &[u8], value: Vec<u8>) -> Result<()> {
        let mut backoff = Backoff::new();
        loop {
            match self.index.get(storage, key)? {
                Some(existing) => {
                    let tid = existing.load_tid();
                    if !tid.is_absent() {
                        return Err(Error::AlreadyExists);
                    }
                    if tid.is_locked() {
                        return Err(Error::ConcurrentInsert);
                    }
                    if !tid.is_latest() {
                        // Being unlinked; wait for it to leave the index.
                        backoff.snooze();
                        continue;
                    }
                    if existing
                        .compare_exchange_tid(tid, tid.with_lock(true))
                        .is_err()
                    {
                        continue;
                    }
                    let mut entry = WriteEntry::new(storage, existing, WriteKind::Insert, Some(value));
                    entry.revived = Some(tid);
                    tx.write_set.push(entry);
                    return Ok(());
                }
                None => {
                    let record = Arc::new(Record::pending_insert(key));
                    match self.index.insert(storage, Arc::clone(&record))? {
                        InsertOutcome::Inserted => {
                            tx.node_set.record_own_change(storage);
                            tx.write_set
                                .push(WriteEntry::new(storage, record, WriteKind::Insert, Some(value)));
                            return Ok(());
                        }
                        InsertOutcome::Exists(_) => continue,
                    }
                }
            }
        }
    }

    /// Existing live record for an update or delete
    fn live_record(&self, storage: StorageId, key: &[u8]) -> Result<Arc<Record>> {
        let record = self.index.get(storage, key)?.ok_or(Error::NotFound)?;
        let tid = record.load_tid();
        if tid.is_absent() {
            return Err(if tid.is_locked() {
                Error::ConcurrentInsert
            } else {
                Error::NotFound
            });
        }
        Ok(record)
    }

    /// Drop a transaction without committing it
    fn discard(&self, slot: usize, session: &Session, mut tx: TxContext) {
        let env = self.env(slot, session);
        commit::rollback(&env, &mut tx.write_set);
        if let Some(info) = tx.long {
            self.wp.release(info.id, &info.write_preserve, None);
            debug!(id = %info.id, "Long transaction aborted");
        }
    }

    fn end_tx(&self, session: &Session, state: &mut SessionState) {
        state.scans.clear();
        session.clear_epochs();
    }
}

impl ConcurrencyControl for Engine {
    fn enter(&self) -> Result<Token> {
        let token = self.sessions.acquire()?;
        trace!(?token, "Session entered");
        Ok(token)
    }

    fn leave(&self, token: Token) -> Result<()> {
        let (session, mut state) = self.sessions.lock(token)?;
        if let Some(tx) = state.tx.take() {
            self.discard(token.slot(), session, tx);
        }
        self.sessions.release(session, state);
        trace!(?token, "Session left");
        Ok(())
    }

    fn tx_begin(&self, token: Token, options: TxOptions) -> Result<()> {
        let (session, mut state) = self.sessions.lock(token)?;
        if state.tx.is_some() {
            return Err(Error::AlreadyBegin);
        }
        if options.kind != TxType::Long && !options.write_preserve.is_empty() {
            return Err(Error::NotImplemented);
        }
        let tx = match options.kind {
            TxType::Short => TxContext::new(TxType::Short, self.clock.publish(&session.observed_epoch)),
            TxType::ReadOnly => {
                TxContext::new(TxType::ReadOnly, self.clock.publish(&session.reader_epoch))
            }
            TxType::Long => {
                let mut storages: SmallVec<[StorageId; 4]> =
                    options.write_preserve.iter().copied().collect();
                storages.sort_unstable();
                storages.dedup();
                if storages.is_empty() {
                    return Err(Error::WriteWithoutWp);
                }
                if storages.iter().any(|&s| !self.index.has_storage(s)) {
                    return Err(Error::StorageNotFound);
                }
                let id = self.resolver.next_id();
                let valid_epoch = self.wp.admit(id, &storages, &self.clock)?;
                debug!(%id, valid_epoch, storages = storages.len(), "Long transaction admitted");
                TxContext::long(
                    LongTxInfo {
                        id,
                        valid_epoch,
                        write_preserve: storages,
                    },
                    self.clock.current(),
                )
            }
        };
        state.tx = Some(tx);
        Ok(())
    }

    fn abort(&self, token: Token) -> Result<()> {
        let (session, mut state) = self.sessions.lock(token)?;
        if let Some(tx) = state.tx.take() {
            self.discard(token.slot(), session, tx);
        }
        self.end_tx(session, &mut state);
        Ok(())
    }

    fn commit(&self, token: Token) -> Result<CommitResult> {
        let (session, mut state) = self.sessions.lock(token)?;
        let Some(mut tx) = state.tx.take() else {
            return Ok(CommitResult::ReadOnly);
        };

        let result = match tx.kind {
            TxType::ReadOnly => Ok(CommitResult::ReadOnly),
            TxType::Short => {
                let env = self.env(token.slot(), session);
                commit::commit(&env, &mut tx, state.last_tid, TidWord::default()).map(|tid| {
                    state.last_tid = tid;
                    CommitResult::Committed { tid }
                })
            }
            TxType::Long => match tx.long.clone() {
                Some(info) => {
                    let id = info.id;
                    self.resolver.submit(PendingLongTx { info, tx });
                    Ok(CommitResult::Pending { id })
                }
                None => unreachable!("long transaction without admission data"),
            },
        };
        self.end_tx(session, &mut state);
        drop(state);

        if matches!(result, Ok(CommitResult::Pending { .. })) {
            self.resolve(false);
        }
        self.gc.try_sweep_shard(token.slot(), self.horizon(), &*self.index);
        result
    }

    fn check_commit(&self, token: Token, id: LongTxId) -> Result<LongTxState> {
        drop(self.sessions.lock(token)?);
        self.resolve(false);
        match self.resolver.lookup(id) {
            Lookup::Waiting => Ok(LongTxState::Waiting),
            Lookup::Resolved(LongTxOutcome::Committed(tid)) => Ok(LongTxState::Committed { tid }),
            Lookup::Resolved(LongTxOutcome::Aborted(reason)) => Err(reason),
            Lookup::Unknown => Err(Error::NotFound),
        }
    }

    fn search_key(&self, token: Token, storage: StorageId, key: &[u8]) -> Result<(Vec<u8>, Notice)> {
        let (session, mut state) = self.sessions.lock(token)?;
        let tx = self.ensure_tx(session, &mut state.tx);

        if tx.kind == TxType::ReadOnly {
            let record = self.index.get(storage, key)?.ok_or(Error::NotFound)?;
            let interval = self.config.snapshot_interval;
            let value = read_snapshot(
                &record,
                reader_snapshot_epoch(tx.begin_epoch, interval),
                interval,
                self.config.spin_retries,
            )?;
            return Ok((value, Notice::Ok));
        }

        self.check_long_ready(tx)?;
        if let Some(entry) = tx.write_set.get(storage, key) {
            return match entry.kind {
                WriteKind::Delete => Err(Error::NotFound),
                WriteKind::Insert | WriteKind::Update => Ok((
                    entry.value.clone().unwrap_or_default(),
                    Notice::ReadFromOwnOperation,
                )),
            };
        }
        let record = self.index.get(storage, key)?.ok_or(Error::NotFound)?;
        let value = self.read_latest(tx, storage, &record)?;
        Ok((value, Notice::Ok))
    }

    fn insert(&self, token: Token, storage: StorageId, key: &[u8], value: &[u8]) -> Result<Notice> {
        let (session, mut state) = self.sessions.lock(token)?;
        let tx = self.ensure_tx(session, &mut state.tx);
        self.check_write(tx, storage)?;

        if let Some(entry) = tx.write_set.get_mut(storage, key) {
            return match entry.kind {
                WriteKind::Delete => {
                    entry.kind = WriteKind::Update;
                    entry.value = Some(value.to_vec());
                    Ok(Notice::CancelPreviousDelete)
                }
                WriteKind::Insert | WriteKind::Update => Err(Error::AlreadyExists),
            };
        }
        self.place_insert(tx, storage, key, value.to_vec())?;
        Ok(Notice::Ok)
    }

    fn update(&self, token: Token, storage: StorageId, key: &[u8], value: &[u8]) -> Result<Notice> {
        let (session, mut state) = self.sessions.lock(token)?;
        let tx = self.ensure_tx(session, &mut state.tx);
        self.check_write(tx, storage)?;

        if let Some(entry) = tx.write_set.get_mut(storage, key) {
            return match entry.kind {
                WriteKind::Insert | WriteKind::Update => {
                    entry.value = Some(value.to_vec());
                    Ok(Notice::WriteToLocalWrite)
                }
                WriteKind::Delete => Err(Error::NotFound),
            };
        }
        let record = self.live_record(storage, key)?;
        tx.write_set.push(WriteEntry::new(
            storage,
            record,
            WriteKind::Update,
            Some(value.to_vec()),
        ));
        Ok(Notice::Ok)
    }

    fn upsert(&self, token: Token, storage: StorageId, key: &[u8], value: &[u8]) -> Result<Notice> {
        let (session, mut state) = self.sessions.lock(token)?;
        let tx = self.ensure_tx(session, &mut state.tx);
        self.check_write(tx, storage)?;

        if let Some(entry) = tx.write_set.get_mut(storage, key) {
            return Ok(match entry.kind {
                WriteKind::Insert | WriteKind::Update => {
                    entry.value = Some(value.to_vec());
                    Notice::WriteToLocalWrite
                }
                WriteKind::Delete => {
                    entry.kind = WriteKind::Update;
                    entry.value = Some(value.to_vec());
                    Notice::CancelPreviousDelete
                }
            });
        }
        loop {
            if let Some(record) = self.index.get(storage, key)? {
                if !record.load_tid().is_absent() {
                    tx.write_set.push(WriteEntry::new(
                        storage,
                        record,
                        WriteKind::Update,
                        Some(value.to_vec()),
                    ));
                    return Ok(Notice::Ok);
                }
            }
            match self.place_insert(tx, storage, key, value.to_vec()) {
                // Became live in between; take the update path.
                Err(Error::AlreadyExists) => continue,
                other => return other.map(|()| Notice::Ok),
            }
        }
    }

    fn delete_record(&self, token: Token, storage: StorageId, key: &[u8]) -> Result<Notice> {
        let (session, mut state) = self.sessions.lock(token)?;
        let tx = self.ensure_tx(session, &mut state.tx);
        self.check_write(tx, storage)?;

        if let Some(entry) = tx.write_set.get_mut(storage, key) {
            match entry.kind {
                WriteKind::Insert => {}
                WriteKind::Update => {
                    entry.kind = WriteKind::Delete;
                    entry.value = None;
                    return Ok(Notice::CancelPreviousUpdate);
                }
                WriteKind::Delete => return Err(Error::NotFound),
            }
            if let Some(entry) = tx.write_set.remove(storage, key) {
                if entry.revived.is_none() {
                    tx.node_set.record_own_change(storage);
                }
                let env = self.env(token.slot(), session);
                commit::discard_insert(&env, storage, entry.record, entry.revived, self.clock.current());
            }
            return Ok(Notice::CancelPreviousInsert);
        }
        let record = self.live_record(storage, key)?;
        tx.write_set
            .push(WriteEntry::new(storage, record, WriteKind::Delete, None));
        Ok(Notice::Ok)
    }

    fn open_scan(
        &self,
        token: Token,
        storage: StorageId,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        limit: Option<usize>,
    ) -> Result<ScanHandle> {
        let (session, mut state) = self.sessions.lock(token)?;
        let SessionState { tx, scans, .. } = &mut *state;
        let tx = self.ensure_tx(session, tx);
        self.check_long_ready(tx)?;

        let version = match tx.kind {
            TxType::ReadOnly => None,
            _ => Some(self.index.structure_version(storage)?),
        };
        let records = self.index.scan(storage, lower, upper, limit)?;
        if let Some(version) = version {
            tx.node_set.observe(storage, version);
        }
        if records.is_empty() {
            return Err(Error::NotFound);
        }
        Ok(scans.open(storage, records))
    }

    fn read_from_scan(&self, token: Token, handle: ScanHandle) -> Result<Option<ScanItem>> {
        let (session, mut state) = self.sessions.lock(token)?;
        let SessionState { tx, scans, .. } = &mut *state;
        let cursor = scans.get_mut(handle)?;
        let tx = self.ensure_tx(session, tx);
        self.check_long_ready(tx)?;
        let storage = cursor.storage;
        let interval = self.config.snapshot_interval;

        while let Some(record) = cursor.advance() {
            if tx.kind == TxType::ReadOnly {
                let snapshot = reader_snapshot_epoch(tx.begin_epoch, interval);
                match read_snapshot(&record, snapshot, interval, self.config.spin_retries) {
                    Ok(value) => {
                        return Ok(Some(ScanItem {
                            key: record.key().to_vec(),
                            value,
                            notice: Notice::Ok,
                        }))
                    }
                    Err(Error::NotFound) => continue,
                    Err(e) => return Err(e),
                }
            }

            if let Some(entry) = tx.write_set.get(storage, record.key()) {
                match entry.kind {
                    WriteKind::Delete => continue,
                    WriteKind::Insert | WriteKind::Update => {
                        return Ok(Some(ScanItem {
                            key: record.key().to_vec(),
                            value: entry.value.clone().unwrap_or_default(),
                            notice: Notice::ReadFromOwnOperation,
                        }))
                    }
                }
            }
            match self.read_latest(tx, storage, &record) {
                Ok(value) => {
                    return Ok(Some(ScanItem {
                        key: record.key().to_vec(),
                        value,
                        notice: Notice::Ok,
                    }))
                }
                Err(Error::NotFound | Error::ConcurrentDelete) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn close_scan(&self, token: Token, handle: ScanHandle) -> Result<()> {
        let (_, mut state) = self.sessions.lock(token)?;
        state.scans.close(handle)
    }

    fn scannable_total_index_size(&self, token: Token, handle: ScanHandle) -> Result<usize> {
        let (_, state) = self.sessions.lock(token)?;
        state.scans.get(handle).map(|cursor| cursor.total())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("epoch", &self.clock.current())
            .field("sessions", &self.sessions)
            .field("pending_long", &self.resolver.queued())
            .finish()
    }
}
