//! Durability layer for tessera
//!
//! This crate implements the durable-log collaborator of the engine:
//! - LogSink: write-phase callbacks plus a durable-epoch query
//! - NullLog: sink for engines without persistence
//! - EpochLog: epoch group commit into a checksummed segment
//! - Entry framing with CRC32 checksums over MessagePack payloads

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding;
pub mod entry;
pub mod epoch_log;
pub mod sink;

pub use encoding::{decode_entry, decode_segment, encode_entry, LogError};
pub use entry::LogEntry;
pub use epoch_log::EpochLog;
pub use sink::{LogSink, NullLog};
