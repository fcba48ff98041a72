//! Loading [`EngineConfig`] from TOML
//!
//! Every field is optional; missing ones keep their defaults.
//!
//! ```toml
//! max_sessions = 128
//! epoch_interval_ms = 40
//! snapshot_interval = 2
//! write_preserve_limit = 8
//! spin_retries = 1024
//! gc_interval_ms = 40
//! ```

use crate::error::Result;
use std::path::Path;
use tessera_concurrency::EngineConfig;

/// Parse and validate a configuration
pub fn load_config(text: &str) -> Result<EngineConfig> {
    let config: EngineConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Read, parse and validate a configuration file
pub fn load_config_file(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let text = std::fs::read_to_string(path)?;
    load_config(&text)
}
