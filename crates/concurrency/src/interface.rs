//! Public transactional interface
//!
//! Every call is made on behalf of an entered session, identified by the
//! [`Token`] returned from `enter`. A session runs at most one transaction at
//! a time; data operations issued outside a transaction implicitly begin a
//! short one.
//!
//! Results follow two channels:
//! - `Ok(Notice)` reports success, possibly with an informational notice
//!   about how the call interacted with the transaction's own earlier writes.
//! - `Err(Error)` reports a warning, after which the transaction stays open
//!   (see [`Error::is_warning`](tessera_core::Error::is_warning)), or an
//!   abort, after which it is gone.

use crate::session::Token;
use std::ops::Bound;
use tessera_core::{LongTxId, Notice, Result, ScanHandle, StorageId, TidWord, TxOptions};

/// Outcome of a successful `commit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitResult {
    /// Writes are visible with this TID
    Committed {
        /// Commit TID
        tid: TidWord,
    },
    /// Nothing to publish: a read-only transaction, or no transaction
    ReadOnly,
    /// A long transaction was queued; poll `check_commit` with this id
    Pending {
        /// Identifier for `check_commit`
        id: LongTxId,
    },
}

/// Progress of a queued long transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongTxState {
    /// Still waiting for its valid epoch or for a predecessor
    Waiting,
    /// Committed with this TID
    Committed {
        /// Commit TID
        tid: TidWord,
    },
}

/// One record produced by `read_from_scan`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanItem {
    /// Record key
    pub key: Vec<u8>,
    /// Value as seen by the transaction
    pub value: Vec<u8>,
    /// `ReadFromOwnOperation` when the value comes from the write set
    pub notice: Notice,
}

/// Session and transaction operations of the engine
pub trait ConcurrencyControl: Send + Sync {
    /// Claim a session slot
    ///
    /// Fails with `SessionLimit` when every slot is taken.
    fn enter(&self) -> Result<Token>;

    /// Release a session, aborting its running transaction
    fn leave(&self, token: Token) -> Result<()>;

    /// Begin a transaction explicitly
    ///
    /// Long transactions must declare their write preserve up front; their
    /// writes and reads are accepted from the returned valid epoch on.
    fn tx_begin(&self, token: Token, options: TxOptions) -> Result<()>;

    /// Abort the running transaction, if any
    fn abort(&self, token: Token) -> Result<()>;

    /// Commit the running transaction
    ///
    /// Short transactions are validated and published synchronously; on
    /// failure the transaction has been aborted and the error names the
    /// reason. Long transactions are queued and reported as
    /// [`CommitResult::Pending`].
    fn commit(&self, token: Token) -> Result<CommitResult>;

    /// Poll a long transaction queued by `commit`
    ///
    /// A final outcome (committed or aborted) is reported once; later polls
    /// of the same id fail with `NotFound`.
    fn check_commit(&self, token: Token, id: LongTxId) -> Result<LongTxState>;

    /// Point read
    fn search_key(&self, token: Token, storage: StorageId, key: &[u8]) -> Result<(Vec<u8>, Notice)>;

    /// Create a record that must not exist
    fn insert(&self, token: Token, storage: StorageId, key: &[u8], value: &[u8]) -> Result<Notice>;

    /// Overwrite a record that must exist
    fn update(&self, token: Token, storage: StorageId, key: &[u8], value: &[u8]) -> Result<Notice>;

    /// Insert or overwrite
    fn upsert(&self, token: Token, storage: StorageId, key: &[u8], value: &[u8]) -> Result<Notice>;

    /// Delete a record that must exist
    fn delete_record(&self, token: Token, storage: StorageId, key: &[u8]) -> Result<Notice>;

    /// Capture the records of `storage` within the bounds, in key order
    ///
    /// Fails with `NotFound` when the range is empty.
    fn open_scan(
        &self,
        token: Token,
        storage: StorageId,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        limit: Option<usize>,
    ) -> Result<ScanHandle>;

    /// Next visible record of an open scan, `None` at the end
    fn read_from_scan(&self, token: Token, handle: ScanHandle) -> Result<Option<ScanItem>>;

    /// Drop an open scan
    fn close_scan(&self, token: Token, handle: ScanHandle) -> Result<()>;

    /// Number of records captured when the scan was opened
    fn scannable_total_index_size(&self, token: Token, handle: ScanHandle) -> Result<usize>;
}
