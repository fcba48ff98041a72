//! Database assembly for tessera
//!
//! This crate puts the layers together:
//! - Database / DatabaseBuilder: engine construction and ownership
//! - Background epoch, GC and long-transaction workers
//! - TOML configuration loading

#![warn(missing_docs)]
#![warn(clippy::all)]

mod background;
pub mod config;
mod database;
mod error;

pub use config::{load_config, load_config_file};
pub use database::{Database, DatabaseBuilder};
pub use error::{DatabaseError, Result};
