//! Spin-then-yield backoff
//!
//! Record locks and the epoch gate are held for short, bounded critical
//! sections, so waiters spin on the atomic instead of parking. The policy is
//! exponential busy spinning for the first few rounds, then `yield_now`.

use std::hint;
use std::thread;

const SPIN_LIMIT: u32 = 6;

/// Backoff state for one wait loop
#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    /// Fresh backoff
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait a little before the next attempt
    pub fn snooze(&mut self) {
        if self.step <= SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                hint::spin_loop();
            }
        } else {
            thread::yield_now();
        }
        self.step = self.step.saturating_add(1);
    }

    /// Number of times [`snooze`](Self::snooze) has been called
    pub fn attempts(&self) -> u32 {
        self.step
    }

    /// True once `limit` attempts have been made
    pub fn is_exhausted(&self, limit: u32) -> bool {
        self.step >= limit
    }
}
