//! Transaction id word
//!
//! Every record carries a 64-bit [`TidWord`] that doubles as its commit
//! timestamp and its lock word. The layout is fixed because TIDs are compared
//! as raw integers and written to the durable log:
//!
//! ```text
//!  63                32 31                 3   2        1        0
//! +--------------------+--------------------+--------+--------+------+
//! |       epoch        |      sequence      | absent | latest | lock |
//! +--------------------+--------------------+--------+--------+------+
//! ```
//!
//! | State | lock | latest | absent |
//! |-------|------|--------|--------|
//! | visible | 0 | 1 | 0 |
//! | locked by a committing writer | 1 | 1 | 0 |
//! | pending insert | 1 | 1 | 1 |
//! | tombstone (linked for snapshot readers) | 0 | 1 | 1 |
//! | unlinked | 0 | 0 | 1 |

use crate::epoch::Epoch;
use serde::{Deserialize, Serialize};
use std::fmt;

const LOCK_BIT: u64 = 1;
const LATEST_BIT: u64 = 1 << 1;
const ABSENT_BIT: u64 = 1 << 2;
const FLAG_MASK: u64 = LOCK_BIT | LATEST_BIT | ABSENT_BIT;

const SEQUENCE_SHIFT: u32 = 3;
const SEQUENCE_BITS: u32 = 29;
const EPOCH_SHIFT: u32 = 32;

/// Largest representable intra-epoch sequence number
pub const MAX_SEQUENCE: u32 = (1 << SEQUENCE_BITS) - 1;

const SEQUENCE_MASK: u64 = (MAX_SEQUENCE as u64) << SEQUENCE_SHIFT;

/// Bit-packed transaction id
///
/// Ordering is the ordering of the raw integer, so the epoch dominates, then
/// the sequence, then the flag bits.
///
/// # Examples
///
/// ```
/// use tessera_core::tid::TidWord;
///
/// let tid = TidWord::new(5, 3).with_latest(true);
/// assert_eq!(tid.epoch(), 5);
/// assert_eq!(tid.sequence(), 3);
/// assert!(tid.is_latest());
/// assert!(!tid.is_locked());
/// assert!(TidWord::new(6, 0) > TidWord::new(5, 100));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TidWord(u64);

impl TidWord {
    /// TID with the given epoch and sequence and all flags cleared
    ///
    /// # Panics
    ///
    /// Panics if `sequence` exceeds [`MAX_SEQUENCE`].
    pub fn new(epoch: Epoch, sequence: u32) -> Self {
        assert!(sequence <= MAX_SEQUENCE, "tid sequence {sequence} out of range");
        TidWord(((epoch as u64) << EPOCH_SHIFT) | ((sequence as u64) << SEQUENCE_SHIFT))
    }

    /// Reinterpret a raw word
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        TidWord(raw)
    }

    /// Raw word
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// State of a freshly placed, uncommitted insert
    pub const fn pending_insert() -> Self {
        TidWord(LOCK_BIT | LATEST_BIT | ABSENT_BIT)
    }

    /// Epoch of the writing transaction
    #[inline]
    pub const fn epoch(self) -> Epoch {
        (self.0 >> EPOCH_SHIFT) as Epoch
    }

    /// Sequence within the epoch
    #[inline]
    pub const fn sequence(self) -> u32 {
        ((self.0 & SEQUENCE_MASK) >> SEQUENCE_SHIFT) as u32
    }

    /// Lock bit
    #[inline]
    pub const fn is_locked(self) -> bool {
        self.0 & LOCK_BIT != 0
    }

    /// Latest bit: the record is still reachable from the index
    #[inline]
    pub const fn is_latest(self) -> bool {
        self.0 & LATEST_BIT != 0
    }

    /// Absent bit: the record holds no visible value
    #[inline]
    pub const fn is_absent(self) -> bool {
        self.0 & ABSENT_BIT != 0
    }

    /// Linked record whose visible state is "deleted"
    #[inline]
    pub const fn is_tombstone(self) -> bool {
        !self.is_locked() && self.is_latest() && self.is_absent()
    }

    /// Copy with the lock bit set or cleared
    #[inline]
    pub const fn with_lock(self, on: bool) -> Self {
        TidWord(if on { self.0 | LOCK_BIT } else { self.0 & !LOCK_BIT })
    }

    /// Copy with the latest bit set or cleared
    #[inline]
    pub const fn with_latest(self, on: bool) -> Self {
        TidWord(if on { self.0 | LATEST_BIT } else { self.0 & !LATEST_BIT })
    }

    /// Copy with the absent bit set or cleared
    #[inline]
    pub const fn with_absent(self, on: bool) -> Self {
        TidWord(if on { self.0 | ABSENT_BIT } else { self.0 & !ABSENT_BIT })
    }

    /// Copy with every flag cleared, leaving the timestamp only
    #[inline]
    pub const fn timestamp(self) -> Self {
        TidWord(self.0 & !FLAG_MASK)
    }

    /// Same version as `other`, ignoring only the lock bit
    ///
    /// This is the read-set validation predicate: epoch, sequence, absent and
    /// latest must all be unchanged.
    #[inline]
    pub const fn same_version(self, other: TidWord) -> bool {
        (self.0 & !LOCK_BIT) == (other.0 & !LOCK_BIT)
    }

    /// Timestamp immediately after this one within the same epoch
    ///
    /// # Panics
    ///
    /// Sequence exhaustion within an epoch is an invariant violation and
    /// panics.
    pub fn next_sequence(self) -> Self {
        let seq = self.sequence();
        assert!(seq < MAX_SEQUENCE, "tid sequence exhausted in epoch {}", self.epoch());
        TidWord::new(self.epoch(), seq + 1)
    }
}

impl fmt::Debug for TidWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TidWord")
            .field("epoch", &self.epoch())
            .field("seq", &self.sequence())
            .field("lock", &self.is_locked())
            .field("latest", &self.is_latest())
            .field("absent", &self.is_absent())
            .finish()
    }
}

impl fmt::Display for TidWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.epoch(), self.sequence())
    }
}
