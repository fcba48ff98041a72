//! Epoch arithmetic
//!
//! The global epoch is a coarse logical clock. Two derived clocks hang off
//! it: the snapshot epoch, which fixes the granularity at which read-only
//! views change, and the reclamation epoch, the newest epoch whose retired
//! memory no thread can still reach.

/// Global epoch value
pub type Epoch = u32;

/// Epoch the clock starts at
///
/// Zero is reserved to mean "no epoch observed".
pub const INITIAL_EPOCH: Epoch = 1;

/// Distance between the current epoch and the newest reclaimable epoch
pub const RECLAMATION_LAG: Epoch = 2;

/// Snapshot epoch of `epoch` for a snapshot interval of `interval` epochs
///
/// A zero interval is treated as one.
///
/// # Examples
///
/// ```
/// use tessera_core::epoch::snapshot_epoch;
///
/// assert_eq!(snapshot_epoch(7, 2), 3);
/// assert_eq!(snapshot_epoch(7, 1), 7);
/// ```
#[inline]
pub fn snapshot_epoch(epoch: Epoch, interval: u32) -> Epoch {
    epoch / interval.max(1)
}

/// Snapshot epoch a read-only transaction begun at `begin` reads as of
///
/// The clock may run one epoch ahead of a committer still applying its
/// writes, so the view is anchored at `begin - 1`: every commit of a
/// snapshot epoch below the result has completed.
///
/// # Examples
///
/// ```
/// use tessera_core::epoch::reader_snapshot_epoch;
///
/// assert_eq!(reader_snapshot_epoch(5, 2), 2);
/// assert_eq!(reader_snapshot_epoch(4, 2), 1);
/// assert_eq!(reader_snapshot_epoch(1, 1), 0);
/// ```
#[inline]
pub fn reader_snapshot_epoch(begin: Epoch, interval: u32) -> Epoch {
    snapshot_epoch(begin.saturating_sub(1), interval)
}

/// Newest epoch whose retired objects may be freed when the clock reads
/// `current`
///
/// Retired objects tagged with an epoch `<=` this value are unreachable by
/// any in-flight transaction.
#[inline]
pub fn reclamation_epoch(current: Epoch) -> Epoch {
    current.saturating_sub(RECLAMATION_LAG)
}
