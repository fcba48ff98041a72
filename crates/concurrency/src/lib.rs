//! Concurrency control for tessera
//!
//! This crate implements Silo-style optimistic concurrency control with:
//! - Engine: sessions, implicit short transactions, the commit protocol
//! - Epoch clock and epoch-based garbage collection
//! - Snapshot versions for read-only transactions
//! - Write-preserve reservations and ordered resolution of long transactions
//! - Range scans with phantom detection

#![warn(missing_docs)]
#![warn(clippy::all)]

mod commit;
pub mod config;
mod engine;
mod epoch;
mod gc;
mod interface;
mod local_set;
mod resolver;
mod scan;
mod session;
mod snapshot;
mod wp;

pub use config::{ConfigError, EngineConfig};
pub use engine::Engine;
pub use epoch::EpochClock;
pub use gc::{GcHorizon, GcStats, GcStatsSnapshot};
pub use interface::{CommitResult, ConcurrencyControl, LongTxState, ScanItem};
pub use session::Token;
