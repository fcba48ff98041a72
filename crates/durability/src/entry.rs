//! Log entry types
//!
//! The concurrency layer emits one entry per applied write during the write
//! phase of a commit:
//! - Put: insert or update, carrying the new value
//! - Delete: removal of a key
//!
//! Every entry carries the commit TID of its transaction. Entries of one
//! epoch become durable together, and replaying them in TID order
//! reproduces the serial order the commits validated against.

use serde::{Deserialize, Serialize};
use tessera_core::{Epoch, StorageId, TidWord};

/// One logged write
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogEntry {
    /// Insert or update
    Put {
        /// Storage the key lives in
        storage: StorageId,
        /// Key written
        key: Vec<u8>,
        /// New value
        value: Vec<u8>,
        /// Commit TID
        tid: TidWord,
    },

    /// Delete
    Delete {
        /// Storage the key lives in
        storage: StorageId,
        /// Key removed
        key: Vec<u8>,
        /// Commit TID
        tid: TidWord,
    },
}

impl LogEntry {
    /// Commit TID of the writing transaction
    pub fn tid(&self) -> TidWord {
        match self {
            LogEntry::Put { tid, .. } | LogEntry::Delete { tid, .. } => *tid,
        }
    }

    /// Epoch the entry belongs to
    pub fn epoch(&self) -> Epoch {
        self.tid().epoch()
    }

    /// Storage the entry targets
    pub fn storage(&self) -> StorageId {
        match self {
            LogEntry::Put { storage, .. } | LogEntry::Delete { storage, .. } => *storage,
        }
    }

    /// Key the entry targets
    pub fn key(&self) -> &[u8] {
        match self {
            LogEntry::Put { key, .. } | LogEntry::Delete { key, .. } => key,
        }
    }
}
