//! High-level client combining the engine and its listener.

use crate::callbacks::Callback;
use crate::config::SyncConfig;
use crate::error::{CallbackError, SyncResult};
use crate::globals::SharedConfig;
use crate::http::{HttpClient, HttpTransport};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::state::SyncEngine;
use crate::stop::StopHandle;
use crate::transport::ConfigTransport;
use apollo_sync_protocol::{Configurations, DEFAULT_NAMESPACE};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Apollo configuration client.
///
/// ```rust,ignore
/// use apollo_sync_engine::{ApolloClient, SyncConfig};
///
/// let config = SyncConfig::new("my-app", "http://config-service:8080");
/// let client = ApolloClient::connect(config, my_http_client)?;
/// client.add_callback(|namespace| {
///     tracing::info!(keys = namespace.len(), "configuration changed");
///     Ok(())
/// });
/// client.start(true)?;
///
/// let timeout = client.get_value("timeout", "10");
/// ```
pub struct ApolloClient<T: ConfigTransport + 'static> {
    engine: Arc<SyncEngine<T>>,
    lifecycle: Lifecycle<T>,
}

impl<C: HttpClient + 'static> ApolloClient<HttpTransport<C>> {
    /// Creates a client talking HTTP through `client`.
    pub fn connect(config: SyncConfig, client: C) -> SyncResult<Self> {
        let transport = HttpTransport::new(&config, client);
        Self::new(config, transport)
    }
}

impl<T: ConfigTransport + 'static> ApolloClient<T> {
    /// Creates a client over any transport.
    pub fn new(config: SyncConfig, transport: T) -> SyncResult<Self> {
        Ok(Self::from_engine(SyncEngine::new(config, transport)?))
    }

    /// Wraps an existing engine.
    pub fn from_engine(engine: SyncEngine<T>) -> Self {
        let engine = Arc::new(engine);
        let lifecycle = Lifecycle::new(Arc::clone(&engine));
        Self { engine, lifecycle }
    }

    /// Returns the engine.
    pub fn engine(&self) -> &Arc<SyncEngine<T>> {
        &self.engine
    }

    /// Returns the shared config store.
    pub fn globals(&self) -> &SharedConfig {
        self.engine.globals()
    }

    /// Reads a key of the default namespace.
    pub fn get_value(&self, key: &str, default: impl Into<Value>) -> Value {
        self.engine.get_or(DEFAULT_NAMESPACE, key, default)
    }

    /// Reads a key of a namespace, falling back to `default`.
    pub fn get(&self, namespace: &str, key: &str, default: impl Into<Value>) -> Value {
        self.engine.get_or(namespace, key, default)
    }

    /// Reads a key of a namespace, surfacing first-sync failures.
    pub fn try_get(&self, namespace: &str, key: &str) -> SyncResult<Option<Value>> {
        self.engine.try_get(namespace, key)
    }

    /// Reads a key, asking the service's cached endpoint on a miss.
    pub fn get_or_fetch(&self, namespace: &str, key: &str, default: impl Into<Value>) -> Value {
        self.engine.get_or_fetch(namespace, key, default)
    }

    /// Registers a change callback.
    pub fn add_callback<F>(&self, callback: F)
    where
        F: Fn(&Configurations) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.engine.add_callback(callback);
    }

    /// Registers several change callbacks.
    pub fn add_callbacks<I>(&self, callbacks: I)
    where
        I: IntoIterator<Item = Callback>,
    {
        self.engine.add_callbacks(callbacks);
    }

    /// Starts the background listener. See [`Lifecycle::start`].
    pub fn start(&self, handle_os_signals: bool) -> SyncResult<()> {
        self.lifecycle.start(handle_os_signals)
    }

    /// Requests the listener to stop.
    pub fn stop(&self) {
        self.lifecycle.stop();
    }

    /// Returns a handle that stops the listener from any thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.engine.stop_handle()
    }

    /// Returns true once the listener has exited.
    pub fn is_stopped(&self) -> bool {
        self.lifecycle.is_stopped()
    }

    /// Gets the listener state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Waits up to `timeout` for the listener to exit.
    pub fn join(&self, timeout: Duration) -> bool {
        self.lifecycle.join(timeout)
    }
}

impl<T: ConfigTransport + 'static> std::fmt::Debug for ApolloClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApolloClient")
            .field("engine", &self.engine)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}
