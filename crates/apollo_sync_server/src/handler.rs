//! Request handlers for the config endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::{NamespaceKey, ReleaseStore};
use apollo_sync_protocol::endpoints::Route;
use apollo_sync_protocol::{
    encode_configurations, encode_notifications, encode_release, ConfigRelease, HttpRequest,
    HttpResponse, Notification, STATUS_NOT_MODIFIED, STATUS_OK,
};
use std::sync::Arc;

/// Handler for config service requests.
pub struct RequestHandler {
    config: ServerConfig,
    store: Arc<ReleaseStore>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(config: ServerConfig, store: Arc<ReleaseStore>) -> Self {
        Self { config, store }
    }

    /// Returns the handler's configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Routes a request to its endpoint.
    pub fn dispatch(&self, request: &HttpRequest) -> ServerResult<HttpResponse> {
        match Route::parse(request)? {
            Route::Notifications {
                app_id,
                cluster,
                notifications,
            } => self.handle_notifications(&app_id, &cluster, &notifications),
            Route::Configs {
                app_id,
                cluster,
                namespace,
                ..
            } => self.handle_configs(&NamespaceKey::new(app_id, cluster, namespace)),
            Route::ConfigFiles {
                format,
                app_id,
                cluster,
                namespace,
                ..
            } => self.handle_configfiles(&format, &NamespaceKey::new(app_id, cluster, namespace)),
        }
    }

    /// Handles a long-poll.
    ///
    /// Holds the request until a reported namespace changes or the hold
    /// timeout elapses, in which case the answer is 304.
    pub fn handle_notifications(
        &self,
        app_id: &str,
        cluster: &str,
        notifications: &[Notification],
    ) -> ServerResult<HttpResponse> {
        if notifications.is_empty() {
            return Err(ServerError::InvalidRequest(
                "no namespaces in long-poll".into(),
            ));
        }
        if notifications.len() > self.config.max_notifications {
            return Err(ServerError::InvalidRequest(format!(
                "too many namespaces: {} > {}",
                notifications.len(),
                self.config.max_notifications
            )));
        }

        let changes =
            self.store
                .wait_for_changes(app_id, cluster, notifications, self.config.hold_timeout);
        if changes.is_empty() {
            tracing::trace!(app_id, cluster, "long-poll held without change");
            return Ok(HttpResponse::empty(STATUS_NOT_MODIFIED));
        }

        tracing::debug!(app_id, cluster, changed = changes.len(), "long-poll answered");
        Ok(HttpResponse::new(STATUS_OK, encode_notifications(&changes)?))
    }

    /// Handles a release fetch.
    pub fn handle_configs(&self, key: &NamespaceKey) -> ServerResult<HttpResponse> {
        let release = self.store.release(key).ok_or_else(|| not_found(key))?;
        let body = ConfigRelease {
            app_id: Some(key.app_id.clone()),
            cluster: Some(key.cluster.clone()),
            namespace_name: Some(key.namespace.clone()),
            configurations: release.configurations,
            release_key: release.release_key,
        };
        Ok(HttpResponse::new(STATUS_OK, encode_release(&body)?))
    }

    /// Handles a cached content fetch. Only the `json` format is served.
    pub fn handle_configfiles(
        &self,
        format: &str,
        key: &NamespaceKey,
    ) -> ServerResult<HttpResponse> {
        if format != "json" {
            return Err(ServerError::UnsupportedFormat(format.to_string()));
        }
        let release = self.store.release(key).ok_or_else(|| not_found(key))?;
        Ok(HttpResponse::new(
            STATUS_OK,
            encode_configurations(&release.configurations)?,
        ))
    }
}

fn not_found(key: &NamespaceKey) -> ServerError {
    ServerError::NamespaceNotFound {
        app_id: key.app_id.clone(),
        cluster: key.cluster.clone(),
        namespace: key.namespace.clone(),
    }
}
