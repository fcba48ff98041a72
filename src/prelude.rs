//! Convenient imports for Tessera.
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! let db = Database::builder().manual_epochs().open()?;
//! let token = db.enter()?;
//! ```

// Entry points
pub use crate::{Database, DatabaseBuilder, DatabaseError};

// Engine interface
pub use crate::{CommitResult, ConcurrencyControl, LongTxState, ScanItem, Token};

// Core types
pub use crate::{Epoch, Error, LongTxId, Notice, Result, ScanHandle, StorageId, TidWord, TxOptions, TxType};

pub use std::ops::Bound;
