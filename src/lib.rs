//! # Tessera
//!
//! Epoch-based optimistic concurrency control for in-memory key-value
//! storage.
//!
//! Tessera runs serializable transactions over ordered byte-key storages
//! with three transaction kinds:
//!
//! 1. **Short** - optimistic, validated at commit, begun implicitly by the
//!    first read or write
//! 2. **Read-only** - reads a stable snapshot, never aborts on conflicts
//! 3. **Long** - declares the storages it writes up front and is resolved
//!    in admission order, ahead of conflicting short transactions
//!
//! ## Quick Start
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! let db = Database::builder().open()?;
//! let accounts = db.create_storage();
//!
//! let token = db.enter()?;
//! db.insert(token, accounts, b"alice", b"100")?;
//! match db.commit(token) {
//!     Ok(CommitResult::Committed { tid }) => println!("committed at {tid}"),
//!     Err(e) if e.is_retryable() => { /* run it again */ }
//!     other => println!("{other:?}"),
//! }
//! db.leave(token)?;
//! ```
//!
//! ## Crates
//!
//! - [`types`] - TIDs, epochs, identifiers, status codes
//! - [`storage`] - records, snapshot chains, the ordered index
//! - [`durability`] - log sink interface and the epoch-grouped log
//! - [`concurrency`] - the engine
//! - [`engine`] - database assembly and background workers

#![warn(missing_docs)]

pub mod prelude;

pub use tessera_concurrency as concurrency;
pub use tessera_core as types;
pub use tessera_durability as durability;
pub use tessera_engine as engine;
pub use tessera_storage as storage;

pub use tessera_concurrency::{
    CommitResult, ConcurrencyControl, Engine, EngineConfig, LongTxState, ScanItem, Token,
};
pub use tessera_core::{Epoch, Error, LongTxId, Notice, Result, ScanHandle, StorageId, TidWord, TxOptions, TxType};
pub use tessera_engine::{Database, DatabaseBuilder, DatabaseError};
