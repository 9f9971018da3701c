//! Sync engine state machine.

use crate::cache::ConfigCache;
use crate::callbacks::{propagate_into, Callback, CallbackRegistry};
use crate::config::SyncConfig;
use crate::dump::{DirectorySink, SnapshotSink, CACHED_SNAPSHOT_NAME};
use crate::error::{CallbackError, SyncError, SyncResult};
use crate::globals::SharedConfig;
use crate::notifications::NotificationTracker;
use crate::stop::{StopHandle, StopSignal};
use crate::transport::{ConfigTransport, PollOutcome};
use apollo_sync_protocol::{Configurations, Notification};
use parking_lot::{Condvar, Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Between polls.
    Idle,
    /// A long-poll request is in flight.
    Polling,
    /// The service reported no change.
    NoChange,
    /// Changed namespaces are being fetched and dispatched.
    Changed,
    /// The poll exceeded its deadline; backing off.
    TimedOut,
    /// The poll failed; backing off.
    Errored,
}

impl SyncState {
    /// Returns true while a poll cycle is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }

    /// Returns true in the backoff states.
    pub fn is_backing_off(&self) -> bool {
        matches!(self, SyncState::TimedOut | SyncState::Errored)
    }
}

/// How a poll cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// HTTP 304: nothing changed.
    NoChange,
    /// HTTP 200: every listed namespace was refreshed.
    Changed,
    /// The poll or a fetch exceeded its deadline.
    TimedOut,
    /// Any other failure.
    Errored,
}

impl CycleOutcome {
    /// Returns true if the service answered and every change was applied.
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::NoChange | CycleOutcome::Changed)
    }
}

/// Result of a poll cycle.
#[derive(Debug, Clone)]
pub struct PollCycleResult {
    /// How the cycle ended.
    pub outcome: CycleOutcome,
    /// Namespaces refreshed during the cycle, in the order the service listed them.
    pub refreshed: Vec<Notification>,
    /// Whether the backoff sleep was cut short by a stop request.
    pub backoff_interrupted: bool,
    /// Duration of the cycle, backoff included.
    pub duration: Duration,
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of long-polls issued.
    pub polls: u64,
    /// Polls answered with "not modified".
    pub no_change: u64,
    /// Namespaces refreshed.
    pub refreshes: u64,
    /// Polls that timed out.
    pub timeouts: u64,
    /// Polls that failed otherwise.
    pub errors: u64,
    /// Callbacks that failed or panicked.
    pub callback_failures: u64,
    /// Last successful poll.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// The sync engine keeps the local cache in step with the configuration service.
///
/// Each poll cycle sends every tracked namespace with its last notification
/// id. For each namespace the service reports as changed, the engine fetches
/// the full release, replaces the cache entry, records the new id and only
/// then runs the callbacks. Failed polls back off for the configured timeout.
pub struct SyncEngine<T: ConfigTransport> {
    config: SyncConfig,
    transport: Arc<T>,
    tracker: NotificationTracker,
    cache: ConfigCache,
    callbacks: CallbackRegistry,
    globals: SharedConfig,
    sink: Option<Box<dyn SnapshotSink>>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    stop: Arc<StopSignal>,
    /// Serializes poll cycles between the listener and first-access callers.
    cycle: Mutex<()>,
    /// First syncs that are running or have failed, by namespace.
    first_syncs: Mutex<HashMap<String, FirstSync>>,
    /// Signalled whenever a first sync finishes.
    first_sync_done: Condvar,
}

/// Progress of a namespace's blocking first sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FirstSync {
    InFlight,
    Failed,
}

impl<T: ConfigTransport> SyncEngine<T> {
    /// Creates a new sync engine with its own shared config store.
    pub fn new(config: SyncConfig, transport: T) -> SyncResult<Self> {
        Self::with_globals(config, transport, SharedConfig::new())
    }

    /// Creates a new sync engine writing into the given shared config store.
    pub fn with_globals(config: SyncConfig, transport: T, globals: SharedConfig) -> SyncResult<Self> {
        config.validate()?;

        let tracker = NotificationTracker::new();
        for namespace in &config.namespaces {
            tracker.version(namespace);
        }

        let callbacks = CallbackRegistry::new();
        if config.propagate_globals {
            callbacks.register_all([propagate_into(globals.clone())]);
        }

        let sink: Option<Box<dyn SnapshotSink>> = if config.dump_enabled {
            Some(Box::new(DirectorySink::new(config.dump_dir.clone())))
        } else {
            None
        };

        Ok(Self {
            config,
            transport: Arc::new(transport),
            tracker,
            cache: ConfigCache::new(),
            callbacks,
            globals,
            sink,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            stop: Arc::new(StopSignal::default()),
            cycle: Mutex::new(()),
            first_syncs: Mutex::new(HashMap::new()),
            first_sync_done: Condvar::new(),
        })
    }

    /// Replaces the snapshot sink.
    pub fn with_snapshot_sink(mut self, sink: Box<dyn SnapshotSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the notification tracker.
    pub fn tracker(&self) -> &NotificationTracker {
        &self.tracker
    }

    /// Returns the cache.
    pub fn cache(&self) -> &ConfigCache {
        &self.cache
    }

    /// Returns the shared config store fed by the default callback.
    pub fn globals(&self) -> &SharedConfig {
        &self.globals
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Registers a change callback. It runs after the ones already registered.
    ///
    /// Callbacks run inside the poll cycle, so they must not trigger the first
    /// sync of another namespace through this engine.
    pub fn add_callback<F>(&self, callback: F)
    where
        F: Fn(&Configurations) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.callbacks.register(callback);
    }

    /// Registers several change callbacks, keeping their order.
    pub fn add_callbacks<I>(&self, callbacks: I)
    where
        I: IntoIterator<Item = Callback>,
    {
        self.callbacks.register_all(callbacks);
    }

    /// Returns a handle that can stop the polling loop from any thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.stop))
    }

    /// Requests the polling loop to stop.
    pub fn request_stop(&self) {
        self.stop.request();
    }

    /// Returns true once a stop was requested.
    pub fn is_stopping(&self) -> bool {
        self.stop.is_requested()
    }

    pub(crate) fn reset_stop(&self) {
        self.stop.reset();
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Runs poll cycles until a stop is requested.
    pub fn run(&self) {
        tracing::info!(app_id = %self.config.app_id, "entering listener loop");
        while !self.stop.is_requested() {
            self.poll_once();
        }
        tracing::info!(app_id = %self.config.app_id, "listener stopped");
    }

    /// Performs one poll cycle, backing off after a failure.
    pub fn poll_once(&self) -> PollCycleResult {
        let start = Instant::now();
        let result = {
            let _cycle = self.cycle.lock();
            self.run_cycle()
        };

        let mut cycle = PollCycleResult {
            outcome: CycleOutcome::NoChange,
            refreshed: Vec::new(),
            backoff_interrupted: false,
            duration: Duration::ZERO,
        };

        match result {
            Ok(None) => {
                self.stats.write().last_sync_time = Some(Instant::now());
            }
            Ok(Some(refreshed)) => {
                cycle.outcome = CycleOutcome::Changed;
                cycle.refreshed = refreshed;
                self.stats.write().last_sync_time = Some(Instant::now());
            }
            Err(e) => {
                cycle.outcome = self.handle_error(&e);
                cycle.backoff_interrupted = !self.backoff();
            }
        }

        self.set_state(SyncState::Idle);
        cycle.duration = start.elapsed();
        cycle
    }

    /// Polls once and applies any changes. Returns the refreshed namespaces,
    /// or `None` if nothing changed.
    fn run_cycle(&self) -> SyncResult<Option<Vec<Notification>>> {
        self.set_state(SyncState::Polling);
        let notifications = self.tracker.snapshot();
        self.stats.write().polls += 1;

        let refreshed = match self.transport.poll_notifications(&notifications)? {
            PollOutcome::NotModified => {
                tracing::debug!("no change, loop");
                self.set_state(SyncState::NoChange);
                self.stats.write().no_change += 1;
                None
            }
            PollOutcome::Changed(changed) => {
                self.set_state(SyncState::Changed);
                for notification in &changed {
                    self.refresh(notification)?;
                }
                Some(changed)
            }
        };

        Ok(refreshed)
    }

    /// Fetches a changed namespace, stores it, records its id and dispatches it.
    fn refresh(&self, notification: &Notification) -> SyncResult<()> {
        let namespace = notification.namespace_name.as_str();
        tracing::info!(
            namespace,
            notification_id = notification.notification_id,
            "namespace has changes"
        );

        let release = self.transport.fetch_release(namespace)?;
        let release_key = release.release_key;
        let configurations = self.cache.replace(namespace, release.configurations);
        self.tracker.update(namespace, notification.notification_id);
        tracing::info!(
            namespace,
            release_key = %release_key,
            keys = configurations.len(),
            "updated local cache"
        );

        self.write_snapshot(&release_key);

        let report = self.callbacks.dispatch(namespace, &configurations);
        let mut stats = self.stats.write();
        stats.refreshes += 1;
        stats.callback_failures += report.failed as u64;
        Ok(())
    }

    fn write_snapshot(&self, name: &str) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.write_snapshot(name, &self.cache.dump()) {
                tracing::warn!(name, error = %e, "failed to write config snapshot");
            }
        }
    }

    /// Records a failed cycle and returns how it ended.
    fn handle_error(&self, error: &SyncError) -> CycleOutcome {
        let mut stats = self.stats.write();
        stats.last_error = Some(error.to_string());
        if error.is_timeout() {
            stats.timeouts += 1;
            drop(stats);
            self.set_state(SyncState::TimedOut);
            tracing::warn!("long poll timed out");
            CycleOutcome::TimedOut
        } else {
            stats.errors += 1;
            drop(stats);
            self.set_state(SyncState::Errored);
            tracing::warn!(error = %error, "long poll failed");
            CycleOutcome::Errored
        }
    }

    /// Sleeps for the configured timeout unless stopping.
    ///
    /// Returns false if the sleep was skipped or cut short by a stop request.
    fn backoff(&self) -> bool {
        if self.stop.is_requested() {
            tracing::debug!("stop requested, skipping backoff");
            return false;
        }
        tracing::warn!(delay = ?self.config.timeout, "backing off");
        self.stop.sleep(self.config.timeout)
    }

    /// Blocks until every listed namespace has completed its first sync.
    ///
    /// Runs full poll cycles until one succeeds. Gives up when a stop is
    /// requested or the configured startup deadline passes. After a success,
    /// listed namespaces the service did not report get an empty mapping.
    pub fn initial_sync(&self, namespaces: &[String]) -> SyncResult<()> {
        {
            let mut syncs = self.first_syncs.lock();
            for namespace in namespaces {
                syncs.insert(namespace.clone(), FirstSync::InFlight);
            }
        }
        self.run_first_sync(namespaces)
    }

    /// Runs the first sync of namespaces already marked in flight, then
    /// records the outcome and wakes readers waiting on it.
    fn run_first_sync(&self, namespaces: &[String]) -> SyncResult<()> {
        for namespace in namespaces {
            self.tracker.version(namespace);
        }

        let result = self.poll_until_synced(namespaces);

        let mut syncs = self.first_syncs.lock();
        for namespace in namespaces {
            if result.is_ok() {
                syncs.remove(namespace);
            } else {
                syncs.insert(namespace.clone(), FirstSync::Failed);
            }
        }
        self.first_sync_done.notify_all();
        result
    }

    fn poll_until_synced(&self, namespaces: &[String]) -> SyncResult<()> {
        let started = Instant::now();
        loop {
            let cycle = self.poll_once();
            if cycle.outcome.is_success() {
                // The service has seen every listed namespace, so the ones
                // still missing hold no content yet.
                for namespace in namespaces {
                    if self.cache.ensure(namespace) {
                        tracing::debug!(namespace = %namespace, "namespace has no release yet");
                    }
                }
                return Ok(());
            }
            if self.stop.is_requested() {
                return Err(SyncError::Cancelled);
            }
            if let Some(deadline) = self.config.startup_deadline {
                let elapsed = started.elapsed();
                if elapsed >= deadline {
                    return Err(SyncError::StartupDeadlineExceeded {
                        namespace: namespaces.join(","),
                        elapsed,
                    });
                }
            }
        }
    }

    /// Returns the content of a namespace, running its first sync if needed.
    ///
    /// The first reference to a namespace blocks for a full poll cycle, and
    /// concurrent readers of the same namespace wait for that sync. If it
    /// fails, later calls return `NotInitialized` without blocking until a
    /// poll cycle brings the namespace in.
    pub fn ensure_namespace(&self, namespace: &str) -> SyncResult<Arc<Configurations>> {
        let mut syncs = self.first_syncs.lock();
        loop {
            if let Some(configurations) = self.cache.snapshot(namespace) {
                return Ok(configurations);
            }
            match syncs.get(namespace).copied() {
                Some(FirstSync::InFlight) => self.first_sync_done.wait(&mut syncs),
                Some(FirstSync::Failed) => {
                    return Err(SyncError::NotInitialized {
                        namespace: namespace.to_string(),
                    })
                }
                None => break,
            }
        }
        syncs.insert(namespace.to_string(), FirstSync::InFlight);
        drop(syncs);

        tracing::info!(namespace, "first access, syncing namespace");
        self.run_first_sync(&[namespace.to_string()])?;
        self.cache
            .snapshot(namespace)
            .ok_or_else(|| SyncError::NotInitialized {
                namespace: namespace.to_string(),
            })
    }

    /// Returns the whole mapping of a namespace. Degrades to `None` like `get`.
    pub fn snapshot(&self, namespace: &str) -> Option<Arc<Configurations>> {
        match self.ensure_namespace(namespace) {
            Ok(configurations) => Some(configurations),
            Err(e) => {
                tracing::warn!(namespace, error = %e, "namespace snapshot unavailable");
                None
            }
        }
    }

    /// Looks up a key, surfacing first-sync failures.
    pub fn try_get(&self, namespace: &str, key: &str) -> SyncResult<Option<Value>> {
        Ok(self.ensure_namespace(namespace)?.get(key).cloned())
    }

    /// Looks up a key. Any failure degrades to `None`.
    pub fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        match self.try_get(namespace, key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(namespace, key, error = %e, "config read fell back to default");
                None
            }
        }
    }

    /// Looks up a key, falling back to `default`.
    pub fn get_or(&self, namespace: &str, key: &str, default: impl Into<Value>) -> Value {
        self.get(namespace, key).unwrap_or_else(|| default.into())
    }

    /// Looks up a key, asking the service's cached endpoint on a miss.
    ///
    /// A successful fetch replaces the namespace wholesale; a failed one
    /// keeps the current content.
    pub fn get_or_fetch(&self, namespace: &str, key: &str, default: impl Into<Value>) -> Value {
        let current = match self.ensure_namespace(namespace) {
            Ok(configurations) => configurations,
            Err(e) => {
                tracing::warn!(namespace, error = %e, "namespace not initialized");
                Arc::new(Configurations::new())
            }
        };
        if let Some(value) = current.get(key) {
            return value.clone();
        }

        let configurations = match self.transport.fetch_cached(namespace) {
            Ok(fetched) => {
                self.tracker.version(namespace);
                let configurations = self.cache.replace(namespace, fetched);
                tracing::info!(namespace, "updated local cache from cached endpoint");
                self.write_snapshot(CACHED_SNAPSHOT_NAME);
                configurations
            }
            Err(e) => {
                tracing::warn!(namespace, error = %e, "cached fetch failed");
                current
            }
        };

        configurations
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.into())
    }
}

impl<T: ConfigTransport> std::fmt::Debug for SyncEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("app_id", &self.config.app_id)
            .field("cluster", &self.config.cluster)
            .field("state", &self.state())
            .field("namespaces", &self.tracker.len())
            .finish()
    }
}
