//! Global epoch clock
//!
//! The clock only moves forward, one step at a time, and only through
//! `Engine::try_advance_epoch`, which first checks that every short
//! transaction has observed the current value.
//!
//! Threads that need the epoch to stay put while they act on it (short
//! transactions, read-only transactions registering a snapshot) publish the
//! value they observed with [`EpochClock::publish`]: store, then re-read the
//! clock, and retry if it moved in between.

use std::sync::atomic::{AtomicU32, Ordering};
use tessera_core::{Epoch, INITIAL_EPOCH};

/// Monotonic global epoch
#[derive(Debug)]
pub struct EpochClock {
    current: AtomicU32,
}

impl EpochClock {
    /// Clock at [`INITIAL_EPOCH`]
    pub fn new() -> Self {
        Self {
            current: AtomicU32::new(INITIAL_EPOCH),
        }
    }

    /// Current epoch
    #[inline]
    pub fn current(&self) -> Epoch {
        self.current.load(Ordering::SeqCst)
    }

    /// Move to the next epoch and return it
    pub(crate) fn advance(&self) -> Epoch {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Store the current epoch into `slot` so that the stored value was the
    /// clock's value after the store became visible
    pub fn publish(&self, slot: &AtomicU32) -> Epoch {
        loop {
            let epoch = self.current();
            slot.store(epoch, Ordering::SeqCst);
            if self.current() == epoch {
                return epoch;
            }
        }
    }
}

impl Default for EpochClock {
    fn default() -> Self {
        Self::new()
    }
}
