//! Database handle and builder
//!
//! [`Database`] wraps an [`Engine`] together with the background workers that
//! keep it moving. It dereferences to the engine, so every
//! [`ConcurrencyControl`](tessera_concurrency::ConcurrencyControl) operation
//! and the storage catalog are called on it directly.

use crate::background::BackgroundWorkers;
use crate::error::Result;
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tessera_concurrency::{Engine, EngineConfig};
use tessera_durability::{LogSink, NullLog};
use tessera_storage::{Index, SkipListIndex};
use tracing::info;

/// An open engine plus its workers
///
/// # Example
///
/// ```ignore
/// use tessera_engine::Database;
/// use tessera_concurrency::ConcurrencyControl;
///
/// let db = Database::builder().max_sessions(16).open()?;
/// let storage = db.create_storage();
/// let token = db.enter()?;
/// db.upsert(token, storage, b"key", b"value")?;
/// db.commit(token)?;
/// db.leave(token)?;
/// ```
pub struct Database {
    engine: Arc<Engine>,
    workers: Mutex<Option<BackgroundWorkers>>,
}

impl Database {
    /// Create a builder with default settings
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Open with `config` and background workers
    pub fn open(config: EngineConfig) -> Result<Self> {
        Self::builder().config(config).open()
    }

    /// Shared handle to the engine
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Whether background workers are running
    pub fn has_background_workers(&self) -> bool {
        self.workers.lock().is_some()
    }

    /// Stop the background workers
    ///
    /// Idempotent. The engine stays usable; epochs, GC and long transaction
    /// resolution then only progress through explicit calls.
    pub fn shutdown(&self) {
        if let Some(workers) = self.workers.lock().take() {
            workers.stop();
            info!(epoch = self.engine.current_epoch(), "Database shut down");
        }
    }
}

impl Deref for Database {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        &self.engine
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("engine", &self.engine)
            .field("background", &self.has_background_workers())
            .finish()
    }
}

/// Builder for [`Database`]
///
/// # Example
///
/// ```ignore
/// // Production: background epochs every 40ms
/// let db = Database::builder().open()?;
///
/// // Tests: epochs, GC and resolution driven by hand
/// let db = Database::builder().manual_epochs().open()?;
/// db.try_advance_epoch();
/// ```
pub struct DatabaseBuilder {
    config: EngineConfig,
    index: Option<Arc<dyn Index>>,
    log: Option<Arc<dyn LogSink>>,
    background: bool,
}

impl DatabaseBuilder {
    /// Builder with default settings
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            index: None,
            log: None,
            background: true,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Session slots available to callers
    pub fn max_sessions(mut self, n: usize) -> Self {
        self.config.max_sessions = n;
        self
    }

    /// Milliseconds between epoch advances
    pub fn epoch_interval_ms(mut self, ms: u64) -> Self {
        self.config.epoch_interval_ms = ms;
        self
    }

    /// Epochs per snapshot epoch
    pub fn snapshot_interval(mut self, epochs: u32) -> Self {
        self.config.snapshot_interval = epochs;
        self
    }

    /// Reservation slots per storage
    pub fn write_preserve_limit(mut self, n: usize) -> Self {
        self.config.write_preserve_limit = n;
        self
    }

    /// Backoff rounds a reader spends on a locked record
    pub fn spin_retries(mut self, n: u32) -> Self {
        self.config.spin_retries = n;
        self
    }

    /// Milliseconds between background GC sweeps
    pub fn gc_interval_ms(mut self, ms: u64) -> Self {
        self.config.gc_interval_ms = ms;
        self
    }

    /// Use `index` instead of a fresh [`SkipListIndex`]
    pub fn index(mut self, index: Arc<dyn Index>) -> Self {
        self.index = Some(index);
        self
    }

    /// Send applied writes to `log` instead of discarding them
    pub fn log_sink(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    /// Open without background workers
    pub fn manual_epochs(mut self) -> Self {
        self.background = false;
        self
    }

    /// Validate the configuration, build the engine and start the workers
    pub fn open(self) -> Result<Database> {
        let index = self
            .index
            .unwrap_or_else(|| Arc::new(SkipListIndex::new()));
        let log = self.log.unwrap_or_else(|| Arc::new(NullLog));
        let engine = Arc::new(Engine::with_components(self.config, index, log)?);

        let workers = if self.background {
            Some(BackgroundWorkers::spawn(&engine)?)
        } else {
            None
        };
        info!(
            max_sessions = engine.config().max_sessions,
            epoch = engine.current_epoch(),
            background = self.background,
            "Database opened"
        );
        Ok(Database {
            engine,
            workers: Mutex::new(workers),
        })
    }
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
