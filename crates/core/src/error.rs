//! Status taxonomy
//!
//! Every engine operation returns `Result<T, Error>`. The error enum covers
//! two classes of outcome, distinguished by [`Error::is_warning`]:
//!
//! - **WARN_\*** conditions are transaction-local. The transaction stays open
//!   and the caller decides whether to retry, continue or abort.
//! - **ERR_\*** conditions mean the engine already unwound the transaction
//!   (locks released, pending inserts rolled back). No cleanup call is needed.
//!
//! Successful operations may carry an informational [`Notice`].
//!
//! Invariant violations (duplicate write-set identities, TID exhaustion) are
//! not represented here; they panic.

use thiserror::Error;

/// Engine status for anything other than plain success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Error {
    /// Every session slot is occupied
    #[error("session limit reached")]
    SessionLimit,

    /// Token does not refer to a live session
    #[error("not in a session")]
    NotInASession,

    /// A transaction is already running on this session
    #[error("transaction already begun")]
    AlreadyBegin,

    /// Long transaction used before its valid epoch
    #[error("long transaction is not valid yet")]
    Premature,

    /// Long transaction wrote to, or declared, no write-preserved storage
    #[error("write without write preserve")]
    WriteWithoutWp,

    /// Requested combination of options is not supported
    #[error("not implemented")]
    NotImplemented,

    /// Operation is not allowed for the running transaction type
    #[error("illegal operation for transaction type")]
    IllegalOperation,

    /// Storage id is unknown to the index
    #[error("storage not found")]
    StorageNotFound,

    /// Scan handle is not open in this session
    #[error("invalid scan handle")]
    InvalidHandle,

    /// Key has no visible value
    #[error("not found")]
    NotFound,

    /// Key already has a visible value
    #[error("already exists")]
    AlreadyExists,

    /// Another transaction holds an uncommitted insert of the key
    #[error("concurrent insert")]
    ConcurrentInsert,

    /// Record was unlinked while being read
    #[error("concurrent delete")]
    ConcurrentDelete,

    /// Record stayed locked by a committing writer past the spin retry limit
    #[error("concurrent update")]
    ConcurrentUpdate,

    /// Short transaction write rejected by a write-preserve reservation
    #[error("conflict on write preserve")]
    ConflictOnWritePreserve,

    /// Storage already holds the maximum number of reservations
    #[error("write preserve limit reached")]
    WritePreserveLimit,

    /// Read set changed between read and commit
    #[error("validation failed")]
    Validation,

    /// A record in the write set was deleted before it could be locked
    #[error("write to deleted record")]
    WriteToDeletedRecord,

    /// A scanned range changed structure between scan and commit
    #[error("phantom detected")]
    Phantom,

    /// Commit aborted by a reservation that became valid before the commit
    /// epoch
    #[error("aborted by write preserve")]
    AbortedByWritePreserve,
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Canonical status code
    ///
    /// # Examples
    ///
    /// ```
    /// use tessera_core::Error;
    ///
    /// assert_eq!(Error::NotFound.code(), "WARN_NOT_FOUND");
    /// assert_eq!(Error::Validation.code(), "ERR_VALIDATION");
    /// ```
    pub fn code(&self) -> &'static str {
        match self {
            Error::SessionLimit => "ERR_SESSION_LIMIT",
            Error::NotInASession => "WARN_NOT_IN_A_SESSION",
            Error::AlreadyBegin => "WARN_ALREADY_BEGIN",
            Error::Premature => "WARN_PREMATURE",
            Error::WriteWithoutWp => "WARN_WRITE_WITHOUT_WP",
            Error::NotImplemented => "ERR_NOT_IMPLEMENTED",
            Error::IllegalOperation => "WARN_ILLEGAL_OPERATION",
            Error::StorageNotFound => "WARN_STORAGE_NOT_FOUND",
            Error::InvalidHandle => "WARN_INVALID_HANDLE",
            Error::NotFound => "WARN_NOT_FOUND",
            Error::AlreadyExists => "WARN_ALREADY_EXISTS",
            Error::ConcurrentInsert => "WARN_CONCURRENT_INSERT",
            Error::ConcurrentDelete => "WARN_CONCURRENT_DELETE",
            Error::ConcurrentUpdate => "WARN_CONCURRENT_UPDATE",
            Error::ConflictOnWritePreserve => "WARN_CONFLICT_ON_WRITE_PRESERVE",
            Error::WritePreserveLimit => "ERR_WRITE_PRESERVE_LIMIT",
            Error::Validation => "ERR_VALIDATION",
            Error::WriteToDeletedRecord => "ERR_WRITE_TO_DELETED_RECORD",
            Error::Phantom => "ERR_PHANTOM",
            Error::AbortedByWritePreserve => "ERR_CONFLICT_ON_WRITE_PRESERVE",
        }
    }

    /// Transaction-local condition; the transaction is still open
    pub fn is_warning(&self) -> bool {
        self.code().starts_with("WARN_")
    }

    /// Commit-time failure; the transaction has been aborted
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            Error::Validation
                | Error::WriteToDeletedRecord
                | Error::Phantom
                | Error::AbortedByWritePreserve
        )
    }

    /// Check if this error is retryable.
    ///
    /// Retryable conditions stem from concurrent transactions and may clear
    /// up when the caller retries the transaction from the start.
    pub fn is_retryable(&self) -> bool {
        self.is_abort()
            || matches!(
                self,
                Error::ConcurrentInsert
                    | Error::ConcurrentDelete
                    | Error::ConcurrentUpdate
                    | Error::ConflictOnWritePreserve
                    | Error::Premature
            )
    }
}

/// Informational sub-code of a successful operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Notice {
    /// Plain success
    #[default]
    Ok,
    /// Value came from the transaction's own write set
    ReadFromOwnOperation,
    /// Write replaced the value of an earlier write in the same transaction
    WriteToLocalWrite,
    /// Delete cancelled an earlier insert in the same transaction
    CancelPreviousInsert,
    /// Delete replaced an earlier update in the same transaction
    CancelPreviousUpdate,
    /// Insert or upsert turned an earlier delete into an update
    CancelPreviousDelete,
}

impl Notice {
    /// Canonical status code
    pub fn code(&self) -> &'static str {
        match self {
            Notice::Ok => "OK",
            Notice::ReadFromOwnOperation => "WARN_READ_FROM_OWN_OPERATION",
            Notice::WriteToLocalWrite => "WARN_WRITE_TO_LOCAL_WRITE",
            Notice::CancelPreviousInsert => "WARN_CANCEL_PREVIOUS_INSERT",
            Notice::CancelPreviousUpdate => "WARN_CANCEL_PREVIOUS_UPDATE",
            Notice::CancelPreviousDelete => "WARN_CANCEL_PREVIOUS_DELETE",
        }
    }
}
