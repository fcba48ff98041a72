//! Epoch group commit
//!
//! [`EpochLog`] buffers entries as commits apply them and persists whole
//! epochs at once. An epoch is closed for logging two epochs after it ends:
//! a committer that observed epoch `e` at its serialization point keeps the
//! epoch gate from moving past `e + 1` until its write phase (and so its log
//! calls) has finished. When the clock reaches `current`, every entry of an
//! epoch `<= current - 2` has therefore been handed over.
//!
//! Persisted frames accumulate in an in-memory segment using the framing of
//! [`crate::encoding`]; [`EpochLog::replay`] decodes it back.

use crate::encoding::{decode_segment, encode_entry, LogError};
use crate::entry::LogEntry;
use crate::sink::LogSink;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tessera_core::{reclamation_epoch, Epoch, StorageId, TidWord};
use tracing::{error, trace};

/// In-memory epoch-grouped log
#[derive(Debug, Default)]
pub struct EpochLog {
    pending: Mutex<Vec<LogEntry>>,
    segment: Mutex<Vec<u8>>,
    durable: AtomicU32,
    persisted: AtomicU64,
}

impl EpochLog {
    /// Empty log with nothing durable
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries waiting for their epoch to close
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Number of entries persisted so far
    pub fn persisted_len(&self) -> u64 {
        self.persisted.load(Ordering::Acquire)
    }

    /// Copy of the persisted segment bytes
    pub fn segment(&self) -> Vec<u8> {
        self.segment.lock().clone()
    }

    /// Decode every persisted entry, in TID order within each epoch
    pub fn replay(&self) -> Result<Vec<LogEntry>, LogError> {
        decode_segment(&self.segment.lock())
    }

    fn persist_through(&self, horizon: Epoch) {
        let mut ready: Vec<LogEntry> = {
            let mut pending = self.pending.lock();
            let (ready, keep): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|e| e.epoch() <= horizon);
            *pending = keep;
            ready
        };
        ready.sort_by_key(LogEntry::tid);

        let mut segment = self.segment.lock();
        let mut written = 0u64;
        for entry in &ready {
            if let Err(e) = encode_entry(entry, &mut segment) {
                error!(tid = %entry.tid(), error = %e, "Failed to persist log entry");
                continue;
            }
            written += 1;
        }
        self.persisted.fetch_add(written, Ordering::AcqRel);
        self.durable.fetch_max(horizon, Ordering::AcqRel);
        trace!(horizon, written, "Epoch log persisted");
    }
}

impl LogSink for EpochLog {
    fn add_entry(&self, storage: StorageId, key: &[u8], value: &[u8], tid: TidWord) {
        self.pending.lock().push(LogEntry::Put {
            storage,
            key: key.to_vec(),
            value: value.to_vec(),
            tid,
        });
    }

    fn remove_entry(&self, storage: StorageId, key: &[u8], tid: TidWord) {
        self.pending.lock().push(LogEntry::Delete {
            storage,
            key: key.to_vec(),
            tid,
        });
    }

    fn on_epoch_advanced(&self, current: Epoch) {
        self.persist_through(reclamation_epoch(current));
    }

    fn durable_epoch(&self) -> Option<Epoch> {
        Some(self.durable.load(Ordering::Acquire))
    }
}
