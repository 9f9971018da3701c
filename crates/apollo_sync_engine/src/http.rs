//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so the host can plug in
//! whatever library it already uses (reqwest, hyper, ureq, ...). The
//! transport only builds requests and interprets status codes.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{ConfigTransport, PollOutcome};
use apollo_sync_protocol::{
    decode_configurations, decode_notifications, decode_release, endpoints, ConfigRelease,
    Configurations, HttpRequest, HttpResponse, Notification, STATUS_NOT_MODIFIED, STATUS_OK,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Failure of a single HTTP exchange, before any status is known.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// No response arrived within the deadline.
    #[error("request timed out")]
    Timeout,
    /// Connection could not be established or broke.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The request could not be built (bad URL, bad TLS setup, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<HttpError> for SyncError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Timeout => SyncError::Timeout,
            HttpError::Connection(message) => SyncError::transport_retryable(message),
            HttpError::InvalidRequest(message) => SyncError::transport_fatal(message),
        }
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. `url` is the
/// service base URL; the client appends `request.path` and percent-encodes
/// `request.query`. The call must give up after `timeout`.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    fn get(
        &self,
        base_url: &str,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, HttpError>;
}

/// HTTP-based config transport.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the configuration service.
    base_url: String,
    app_id: String,
    cluster: String,
    ip: String,
    timeout: Duration,
    client: C,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport for the application described by `config`.
    pub fn new(config: &SyncConfig, client: C) -> Self {
        Self {
            base_url: config.server_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            cluster: config.cluster.clone(),
            ip: config.client_ip(),
            timeout: config.timeout,
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the IP reported to the service.
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn send(&self, request: &HttpRequest) -> SyncResult<HttpResponse> {
        match self.client.get(&self.base_url, request, self.timeout) {
            Ok(response) => {
                tracing::debug!(
                    path = %request.path,
                    status = response.status,
                    "config service answered"
                );
                *self.last_error.write() = None;
                Ok(response)
            }
            Err(e) => {
                *self.last_error.write() = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    fn expect_ok(&self, response: HttpResponse) -> SyncResult<HttpResponse> {
        if response.status == STATUS_OK {
            return Ok(response);
        }
        let err = SyncError::ServiceError {
            status: response.status,
            message: response.body_text(),
        };
        *self.last_error.write() = Some(err.to_string());
        Err(err)
    }
}

impl<C: HttpClient> ConfigTransport for HttpTransport<C> {
    fn poll_notifications(&self, notifications: &[Notification]) -> SyncResult<PollOutcome> {
        let request = endpoints::notifications(&self.app_id, &self.cluster, notifications)?;
        let response = self.send(&request)?;
        if response.status == STATUS_NOT_MODIFIED {
            return Ok(PollOutcome::NotModified);
        }
        let response = self.expect_ok(response)?;
        Ok(PollOutcome::Changed(decode_notifications(&response.body)?))
    }

    fn fetch_release(&self, namespace: &str) -> SyncResult<ConfigRelease> {
        let request = endpoints::configs(&self.app_id, &self.cluster, namespace, &self.ip);
        let response = self.expect_ok(self.send(&request)?)?;
        Ok(decode_release(&response.body)?)
    }

    fn fetch_cached(&self, namespace: &str) -> SyncResult<Configurations> {
        let request =
            endpoints::configfiles("json", &self.app_id, &self.cluster, namespace, &self.ip);
        let response = self.expect_ok(self.send(&request)?)?;
        Ok(decode_configurations(&response.body)?)
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a GET request and returns the response.
    fn handle_get(&self, request: &HttpRequest) -> HttpResponse;
}

impl<S: LoopbackServer> LoopbackServer for Arc<S> {
    fn handle_get(&self, request: &HttpRequest) -> HttpResponse {
        self.as_ref().handle_get(request)
    }
}

/// A loopback HTTP client that routes requests directly to an in-process server.
///
/// Useful for testing without actual network overhead. A handler that runs
/// past the deadline is reported as a timeout, as a real client would.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn get(
        &self,
        _base_url: &str,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, HttpError> {
        let started = Instant::now();
        let response = self.server.handle_get(request);
        if started.elapsed() > timeout {
            return Err(HttpError::Timeout);
        }
        Ok(response)
    }
}
