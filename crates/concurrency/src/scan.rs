//! Per-session scan cursors

use rustc_hash::FxHashMap;
use std::sync::Arc;
use tessera_core::{Error, Result, ScanHandle, StorageId};
use tessera_storage::Record;

/// Records captured by `open_scan`, consumed front to back
#[derive(Debug)]
pub(crate) struct ScanCursor {
    pub storage: StorageId,
    records: Vec<Arc<Record>>,
    position: usize,
}

impl ScanCursor {
    /// Next captured record, advancing the cursor
    pub fn advance(&mut self) -> Option<Arc<Record>> {
        let record = self.records.get(self.position).cloned()?;
        self.position += 1;
        Some(record)
    }

    /// Number of records captured when the scan was opened
    pub fn total(&self) -> usize {
        self.records.len()
    }
}

/// Open scans of one session
#[derive(Debug, Default)]
pub(crate) struct ScanCache {
    next_handle: u64,
    cursors: FxHashMap<ScanHandle, ScanCursor>,
}

impl ScanCache {
    pub fn open(&mut self, storage: StorageId, records: Vec<Arc<Record>>) -> ScanHandle {
        let handle = ScanHandle::new(self.next_handle);
        self.next_handle += 1;
        self.cursors.insert(
            handle,
            ScanCursor {
                storage,
                records,
                position: 0,
            },
        );
        handle
    }

    pub fn get_mut(&mut self, handle: ScanHandle) -> Result<&mut ScanCursor> {
        self.cursors.get_mut(&handle).ok_or(Error::InvalidHandle)
    }

    pub fn get(&self, handle: ScanHandle) -> Result<&ScanCursor> {
        self.cursors.get(&handle).ok_or(Error::InvalidHandle)
    }

    pub fn close(&mut self, handle: ScanHandle) -> Result<()> {
        self.cursors
            .remove(&handle)
            .map(|_| ())
            .ok_or(Error::InvalidHandle)
    }

    pub fn clear(&mut self) {
        self.cursors.clear();
    }
}
