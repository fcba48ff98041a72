//! Core types for tessera
//!
//! This crate defines the vocabulary shared by every layer:
//! - TidWord: bit-packed commit timestamp and lock word
//! - Epoch arithmetic (snapshot and reclamation epochs)
//! - Storage, transaction and scan identifiers
//! - Error/Notice status taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod epoch;
pub mod error;
pub mod tid;
pub mod types;

pub use epoch::{reader_snapshot_epoch, reclamation_epoch, snapshot_epoch, Epoch, INITIAL_EPOCH};
pub use error::{Error, Notice, Result};
pub use tid::TidWord;
pub use types::{LongTxId, ScanHandle, StorageId, TxOptions, TxType};
