//! Record storage for tessera
//!
//! This crate implements the record store the concurrency layer builds on:
//! - Record: key, latest value, TID lock word and snapshot chain
//! - Version: older record states kept for snapshot readers
//! - Index: ordered key -> record mapping with per-storage structure versions
//! - SkipListIndex: default lock-free index backend
//! - Backoff: spin-then-yield waiting policy for record locks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod index;
pub mod record;

pub use backoff::Backoff;
pub use index::{Index, IndexError, IndexResult, InsertOutcome, SkipListIndex};
pub use record::{Record, Version};
