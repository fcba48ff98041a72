//! Engine configuration
//!
//! | Field | Default | Meaning |
//! |-------|---------|---------|
//! | `max_sessions` | 64 | Session slots handed out by `enter` |
//! | `epoch_interval_ms` | 40 | Sleep between epoch advances |
//! | `snapshot_interval` | 2 | Epochs per snapshot epoch |
//! | `write_preserve_limit` | 8 | Reservations one storage can hold at once |
//! | `spin_retries` | 1024 | Backoff rounds before a read gives up on a locked record |
//! | `gc_interval_ms` | 40 | Sleep between background GC sweeps |

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Rejected configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field holds a value the engine cannot run with
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// Tunables of one engine instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Session slots available to callers
    pub max_sessions: usize,
    /// Milliseconds between epoch advances
    pub epoch_interval_ms: u64,
    /// Epochs per snapshot epoch
    pub snapshot_interval: u32,
    /// Reservation slots per storage
    pub write_preserve_limit: usize,
    /// Backoff rounds a reader spends on a locked record
    pub spin_retries: u32,
    /// Milliseconds between background GC sweeps
    pub gc_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            epoch_interval_ms: 40,
            snapshot_interval: 2,
            write_preserve_limit: 8,
            spin_retries: 1024,
            gc_interval_ms: 40,
        }
    }
}

impl EngineConfig {
    /// Check every field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });
        if self.max_sessions == 0 {
            return invalid("max_sessions", "must be at least 1");
        }
        if self.max_sessions >= u32::MAX as usize {
            return invalid("max_sessions", "must fit a 32-bit slot index");
        }
        if self.snapshot_interval == 0 {
            return invalid("snapshot_interval", "must be at least 1");
        }
        if self.write_preserve_limit == 0 {
            return invalid("write_preserve_limit", "must be at least 1");
        }
        if self.epoch_interval_ms == 0 {
            return invalid("epoch_interval_ms", "must be at least 1");
        }
        if self.gc_interval_ms == 0 {
            return invalid("gc_interval_ms", "must be at least 1");
        }
        Ok(())
    }

    /// Epoch interval as a duration
    pub fn epoch_interval(&self) -> Duration {
        Duration::from_millis(self.epoch_interval_ms)
    }

    /// GC interval as a duration
    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms)
    }
}
