//! Identifier and option types shared by every layer
//!
//! This module defines the small value types that cross crate boundaries:
//! - [`StorageId`]: Identifier of one key space in the index
//! - [`TxType`]: Kind of transaction a session runs
//! - [`TxOptions`]: Begin options, including the write-preserve declaration
//! - [`LongTxId`]: Identifier assigned to a long transaction at admission
//! - [`ScanHandle`]: Session-local handle of an open range scan

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a storage (an independent ordered key space)
///
/// Storage ids are allocated by the engine when a storage is created and are
/// never reused within one engine instance.
///
/// # Examples
///
/// ```
/// use tessera_core::types::StorageId;
///
/// let id = StorageId::new(7);
/// assert_eq!(id.as_u64(), 7);
/// assert_eq!(id.to_string(), "storage-7");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StorageId(u64);

impl StorageId {
    /// Wrap a raw storage id
    pub const fn new(raw: u64) -> Self {
        StorageId(raw)
    }

    /// Raw numeric value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "storage-{}", self.0)
    }
}

/// Kind of transaction
///
/// | Type | Reads | Writes | Commit |
/// |------|-------|--------|--------|
/// | `Short` | latest versions, validated | buffered, locked at commit | synchronous OCC |
/// | `Long` | latest versions, validated | only to declared storages | resolved in epoch order |
/// | `ReadOnly` | snapshot versions | rejected | always succeeds |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TxType {
    /// Optimistic transaction validated at commit
    #[default]
    Short,
    /// Long-running transaction with declared write-preserve storages
    Long,
    /// Read-only transaction over a consistent snapshot
    ReadOnly,
}

/// Options passed to `tx_begin`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxOptions {
    /// Transaction kind
    pub kind: TxType,
    /// Storages a long transaction intends to write
    pub write_preserve: Vec<StorageId>,
}

impl TxOptions {
    /// Options for a short transaction
    pub fn short() -> Self {
        Self::default()
    }

    /// Options for a read-only transaction
    pub fn read_only() -> Self {
        TxOptions {
            kind: TxType::ReadOnly,
            write_preserve: Vec::new(),
        }
    }

    /// Options for a long transaction writing to `storages`
    ///
    /// # Examples
    ///
    /// ```
    /// use tessera_core::types::{StorageId, TxOptions, TxType};
    ///
    /// let opts = TxOptions::long([StorageId::new(1), StorageId::new(2)]);
    /// assert_eq!(opts.kind, TxType::Long);
    /// assert_eq!(opts.write_preserve.len(), 2);
    /// ```
    pub fn long(storages: impl IntoIterator<Item = StorageId>) -> Self {
        TxOptions {
            kind: TxType::Long,
            write_preserve: storages.into_iter().collect(),
        }
    }
}

/// Identifier of a long transaction
///
/// Assigned in admission order; together with the valid epoch it totally
/// orders long transactions for resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LongTxId(u64);

impl LongTxId {
    /// Wrap a raw id
    pub const fn new(raw: u64) -> Self {
        LongTxId(raw)
    }

    /// Raw numeric value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LongTxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ltx-{}", self.0)
    }
}

/// Handle of an open scan, valid only within the session that opened it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanHandle(u64);

impl ScanHandle {
    /// Wrap a raw handle
    pub const fn new(raw: u64) -> Self {
        ScanHandle(raw)
    }

    /// Raw numeric value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}
