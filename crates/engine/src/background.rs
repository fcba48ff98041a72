//! Background workers
//!
//! Three named threads drive the engine's periodic work:
//!
//! | Thread | Period | Work |
//! |--------|--------|------|
//! | `tessera-epoch` | `epoch_interval_ms` | `try_advance_epoch` |
//! | `tessera-resolver` | `epoch_interval_ms` | `resolve_long_transactions` |
//! | `tessera-gc` | `gc_interval_ms` | `collect_garbage` |
//!
//! Each sleeps on a shared stop signal, so shutdown wakes them immediately
//! instead of waiting out the period.

use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tessera_concurrency::Engine;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    /// Sleep up to `timeout`; returns whether a stop was requested
    fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.wake.wait_for(&mut stopped, timeout);
        }
        *stopped
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }
}

/// Handles of the running workers
#[derive(Debug)]
pub(crate) struct BackgroundWorkers {
    signal: Arc<StopSignal>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundWorkers {
    pub fn spawn(engine: &Arc<Engine>) -> io::Result<Self> {
        let mut workers = Self {
            signal: Arc::new(StopSignal::default()),
            handles: Vec::with_capacity(3),
        };
        if let Err(e) = workers.spawn_all(engine) {
            workers.stop();
            return Err(e);
        }
        Ok(workers)
    }

    fn spawn_all(&mut self, engine: &Arc<Engine>) -> io::Result<()> {
        let epoch_interval = engine.config().epoch_interval();
        let gc_interval = engine.config().gc_interval();
        self.spawn_loop("tessera-epoch", epoch_interval, engine, |e| {
            e.try_advance_epoch();
        })?;
        self.spawn_loop("tessera-resolver", epoch_interval, engine, |e| {
            e.resolve_long_transactions();
        })?;
        self.spawn_loop("tessera-gc", gc_interval, engine, |e| {
            e.collect_garbage();
        })
    }

    fn spawn_loop(
        &mut self,
        name: &'static str,
        interval: Duration,
        engine: &Arc<Engine>,
        tick: fn(&Engine),
    ) -> io::Result<()> {
        let signal = Arc::clone(&self.signal);
        let engine = Arc::clone(engine);
        let handle = thread::Builder::new().name(name.into()).spawn(move || {
            debug!(thread = name, "Worker started");
            while !signal.wait(interval) {
                tick(&engine);
            }
            debug!(thread = name, "Worker stopped");
        })?;
        self.handles.push(handle);
        Ok(())
    }

    /// Signal every worker and wait for it to exit
    pub fn stop(self) {
        self.signal.stop();
        for handle in self.handles {
            let name = handle.thread().name().unwrap_or("worker").to_owned();
            if handle.join().is_err() {
                warn!(thread = %name, "Worker panicked");
            }
        }
    }
}
