//! Durable log collaborator
//!
//! The concurrency layer reports applied writes through [`LogSink`] and asks
//! it how far persistence has progressed. When a sink reports a durable
//! epoch, the garbage collector never reclaims past it.

use tessera_core::{Epoch, StorageId, TidWord};

/// Receiver of committed writes
///
/// `add_entry` and `remove_entry` are called from the write phase of a
/// commit while the record lock is held, so implementations should only
/// buffer. Heavy work belongs in [`on_epoch_advanced`](Self::on_epoch_advanced),
/// which runs on the epoch thread.
pub trait LogSink: Send + Sync {
    /// An insert or update was applied
    fn add_entry(&self, storage: StorageId, key: &[u8], value: &[u8], tid: TidWord);

    /// A delete was applied
    fn remove_entry(&self, storage: StorageId, key: &[u8], tid: TidWord);

    /// The global epoch moved to `current`
    fn on_epoch_advanced(&self, _current: Epoch) {}

    /// Newest epoch whose entries are all durable, if the sink persists
    fn durable_epoch(&self) -> Option<Epoch> {
        None
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLog;

impl LogSink for NullLog {
    #[inline]
    fn add_entry(&self, _storage: StorageId, _key: &[u8], _value: &[u8], _tid: TidWord) {}

    #[inline]
    fn remove_entry(&self, _storage: StorageId, _key: &[u8], _tid: TidWord) {}
}
