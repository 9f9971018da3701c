//! Reference config service.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::RequestHandler;
use crate::store::{NamespaceKey, NamespaceRelease, ReleaseStore};
use apollo_sync_protocol::{Configurations, HttpRequest, HttpResponse, Notification};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// In-memory Apollo config service.
///
/// Transport-agnostic: the host hands it requests and sends back the
/// responses. Publishing goes straight to the release store.
pub struct ConfigServer {
    handler: RequestHandler,
    store: Arc<ReleaseStore>,
    unavailable: AtomicBool,
    requests: AtomicU64,
}

impl ConfigServer {
    /// Creates a new server.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(ReleaseStore::new()))
    }

    /// Creates a server with a shared release store.
    pub fn with_store(config: ServerConfig, store: Arc<ReleaseStore>) -> Self {
        Self {
            handler: RequestHandler::new(config, Arc::clone(&store)),
            store,
            unavailable: AtomicBool::new(false),
            requests: AtomicU64::new(0),
        }
    }

    /// Returns the release store.
    pub fn store(&self) -> &Arc<ReleaseStore> {
        &self.store
    }

    /// Publishes a full mapping for a namespace.
    pub fn publish(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        configurations: Configurations,
    ) -> NamespaceRelease {
        let release = self
            .store
            .publish(NamespaceKey::new(app_id, cluster, namespace), configurations);
        tracing::debug!(
            app_id,
            cluster,
            namespace,
            notification_id = release.notification_id,
            "published release"
        );
        release
    }

    /// Publishes a namespace with one key set.
    pub fn set(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        name: &str,
        value: Value,
    ) -> NamespaceRelease {
        self.store
            .set(NamespaceKey::new(app_id, cluster, namespace), name, value)
    }

    /// Publishes a namespace with one key removed.
    ///
    /// Returns `None` if the namespace has never been published.
    pub fn delete_key(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        name: &str,
    ) -> Option<NamespaceRelease> {
        self.store
            .remove(&NamespaceKey::new(app_id, cluster, namespace), name)
    }

    /// Makes every endpoint answer 503 until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns true if the server is answering 503.
    pub fn is_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::SeqCst)
    }

    /// Returns the number of requests handled so far.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Handles a long-poll. See [`RequestHandler::handle_notifications`].
    pub fn handle_notifications(
        &self,
        app_id: &str,
        cluster: &str,
        notifications: &[Notification],
    ) -> ServerResult<HttpResponse> {
        self.handler
            .handle_notifications(app_id, cluster, notifications)
    }

    /// Handles a release fetch.
    pub fn handle_configs(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
    ) -> ServerResult<HttpResponse> {
        self.handler
            .handle_configs(&NamespaceKey::new(app_id, cluster, namespace))
    }

    /// Handles a cached content fetch.
    pub fn handle_configfiles(
        &self,
        format: &str,
        app_id: &str,
        cluster: &str,
        namespace: &str,
    ) -> ServerResult<HttpResponse> {
        self.handler
            .handle_configfiles(format, &NamespaceKey::new(app_id, cluster, namespace))
    }

    /// Handles one request. Errors become their HTTP status with the
    /// message as body.
    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let result = if self.is_unavailable() {
            Err(ServerError::Unavailable)
        } else {
            self.handler.dispatch(request)
        };

        match result {
            Ok(response) => response,
            Err(err) => {
                if err.is_server_error() {
                    tracing::warn!(path = %request.path, error = %err, "request failed");
                } else {
                    tracing::debug!(path = %request.path, error = %err, "request rejected");
                }
                HttpResponse::new(err.status(), err.to_string())
            }
        }
    }
}

impl Default for ConfigServer {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}
