//! Errors raised while opening a database

use tessera_concurrency::ConfigError;
use thiserror::Error;

/// Failure to configure or start a [`Database`](crate::Database)
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Reading a config file or spawning a worker failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for [`EngineConfig`](tessera_concurrency::EngineConfig)
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for database setup
pub type Result<T> = std::result::Result<T, DatabaseError>;
