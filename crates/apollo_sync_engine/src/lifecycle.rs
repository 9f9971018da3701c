//! Background listener lifecycle.

use crate::error::{SyncError, SyncResult};
use crate::signals::spawn_signal_listener;
use crate::state::SyncEngine;
use crate::stop::ExitLatch;
use crate::transport::ConfigTransport;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// State of the background listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No listener thread is running.
    Stopped,
    /// The listener thread is polling.
    Running,
    /// A stop was requested; the listener finishes its current cycle.
    Stopping,
}

/// Owns the thread that drives [`SyncEngine::run`].
///
/// `start` performs a blocking first sync when nothing was fetched yet, so
/// reads right after it never race the listener. `stop` is cooperative; use
/// `is_stopped` or `join` to learn when the listener has actually exited.
pub struct Lifecycle<T: ConfigTransport + 'static> {
    engine: Arc<SyncEngine<T>>,
    state: Arc<RwLock<LifecycleState>>,
    exited: Arc<ExitLatch>,
    worker: Mutex<Option<JoinHandle<()>>>,
    signals: Mutex<Option<JoinHandle<()>>>,
    /// Held for the whole of `start`.
    starting: Mutex<()>,
}

impl<T: ConfigTransport + 'static> Lifecycle<T> {
    /// Creates a stopped lifecycle around an engine.
    pub fn new(engine: Arc<SyncEngine<T>>) -> Self {
        Self {
            engine,
            state: Arc::new(RwLock::new(LifecycleState::Stopped)),
            exited: Arc::new(ExitLatch::default()),
            worker: Mutex::new(None),
            signals: Mutex::new(None),
            starting: Mutex::new(()),
        }
    }

    /// Returns the engine.
    pub fn engine(&self) -> &Arc<SyncEngine<T>> {
        &self.engine
    }

    /// Gets the current state.
    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Starts the background listener.
    ///
    /// When `handle_os_signals` is true, SIGINT/SIGTERM/SIGABRT request a
    /// stop. Fails if the listener is already running, or if the blocking
    /// first sync does not complete. Concurrent calls are serialized, so only
    /// one of them can start a listener.
    pub fn start(&self, handle_os_signals: bool) -> SyncResult<()> {
        let _starting = self.starting.lock();
        let current = self.state();
        if current != LifecycleState::Stopped {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{current:?}"),
                to: format!("{:?}", LifecycleState::Running),
            });
        }

        // The stop flag is still set here, so threads of a previous run exit.
        self.retire_threads();
        self.engine.reset_stop();
        self.exited.clear();

        if self.engine.cache().is_empty() {
            let namespaces: Vec<String> = self
                .engine
                .tracker()
                .snapshot()
                .into_iter()
                .map(|n| n.namespace_name)
                .collect();
            self.engine.initial_sync(&namespaces)?;
        }

        if handle_os_signals {
            let listener = spawn_signal_listener(self.engine.stop_handle())?;
            *self.signals.lock() = Some(listener);
        }

        *self.state.write() = LifecycleState::Running;
        let engine = Arc::clone(&self.engine);
        let state = Arc::clone(&self.state);
        let exited = Arc::clone(&self.exited);
        let spawned = std::thread::Builder::new()
            .name("apollo-sync-listener".into())
            .spawn(move || {
                engine.run();
                *state.write() = LifecycleState::Stopped;
                exited.set();
            });

        match spawned {
            Ok(worker) => {
                *self.worker.lock() = Some(worker);
                tracing::info!("listener started");
                Ok(())
            }
            Err(e) => {
                *self.state.write() = LifecycleState::Stopped;
                self.engine.request_stop();
                Err(SyncError::Io(e))
            }
        }
    }

    /// Requests the listener to stop. Returns immediately.
    pub fn stop(&self) {
        self.engine.request_stop();
        let mut state = self.state.write();
        if *state == LifecycleState::Running {
            *state = LifecycleState::Stopping;
        }
        tracing::info!("stopping listener");
    }

    /// Returns true once the listener thread has left its loop.
    pub fn is_stopped(&self) -> bool {
        self.exited.is_set()
    }

    /// Waits up to `timeout` for the listener to exit.
    ///
    /// Returns true if it exited (or never ran).
    pub fn join(&self, timeout: Duration) -> bool {
        if self.worker.lock().is_none() {
            return true;
        }
        if !self.exited.wait(timeout) {
            return false;
        }
        self.reap();
        true
    }

    /// Joins the threads of a previous run.
    fn retire_threads(&self) {
        for slot in [&self.worker, &self.signals] {
            let previous = slot.lock().take();
            if let Some(handle) = previous {
                if handle.join().is_err() {
                    tracing::warn!("background thread panicked");
                }
            }
        }
    }

    fn reap(&self) {
        for slot in [&self.worker, &self.signals] {
            let finished = slot
                .lock()
                .take_if(|handle| handle.is_finished());
            if let Some(handle) = finished {
                if handle.join().is_err() {
                    tracing::warn!("background thread panicked");
                }
            }
        }
    }
}

impl<T: ConfigTransport + 'static> Drop for Lifecycle<T> {
    fn drop(&mut self) {
        if self.state() != LifecycleState::Stopped {
            self.engine.request_stop();
        }
    }
}

impl<T: ConfigTransport + 'static> std::fmt::Debug for Lifecycle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", &self.state())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
