//! Transport layer abstraction for the configuration service.

use crate::error::{SyncError, SyncResult};
use apollo_sync_protocol::{ConfigRelease, Configurations, Notification, STATUS_NOT_FOUND};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Answer of the long-poll endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing changed within the service's wait window (HTTP 304).
    NotModified,
    /// These namespaces moved to new notification ids (HTTP 200).
    Changed(Vec<Notification>),
}

/// A config transport handles communication with the configuration service.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing, etc.).
pub trait ConfigTransport: Send + Sync {
    /// Long-polls for changes of the listed namespaces.
    fn poll_notifications(&self, notifications: &[Notification]) -> SyncResult<PollOutcome>;

    /// Fetches the full release of a namespace.
    fn fetch_release(&self, namespace: &str) -> SyncResult<ConfigRelease>;

    /// Fetches the service-cached content of a namespace.
    fn fetch_cached(&self, namespace: &str) -> SyncResult<Configurations>;
}

/// A call recorded by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// A long-poll with the notifications that were sent.
    Poll(Vec<Notification>),
    /// A release fetch.
    FetchRelease(String),
    /// A cached content fetch.
    FetchCached(String),
}

/// A scriptable transport for testing.
///
/// Poll answers are consumed from a queue; once it is empty every poll
/// waits `idle_delay` and answers `NotModified`, like an idle long-poll.
#[derive(Debug)]
pub struct MockTransport {
    polls: Mutex<VecDeque<SyncResult<PollOutcome>>>,
    releases: Mutex<HashMap<String, ConfigRelease>>,
    cached: Mutex<HashMap<String, Configurations>>,
    calls: Mutex<Vec<MockCall>>,
    idle_delay: Duration,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::with_idle_delay(Duration::from_millis(10))
    }

    /// Creates a mock whose idle polls take `idle_delay`.
    pub fn with_idle_delay(idle_delay: Duration) -> Self {
        Self {
            polls: Mutex::new(VecDeque::new()),
            releases: Mutex::new(HashMap::new()),
            cached: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            idle_delay,
        }
    }

    /// Queues the answer of a future poll.
    pub fn push_poll(&self, outcome: SyncResult<PollOutcome>) {
        self.polls.lock().push_back(outcome);
    }

    /// Queues a `Changed` answer.
    pub fn push_changed(&self, notifications: Vec<Notification>) {
        self.push_poll(Ok(PollOutcome::Changed(notifications)));
    }

    /// Sets the release returned for a namespace.
    pub fn set_release(&self, namespace: &str, release: ConfigRelease) {
        self.releases.lock().insert(namespace.to_string(), release);
    }

    /// Removes the release of a namespace so fetching it fails.
    pub fn remove_release(&self, namespace: &str) {
        self.releases.lock().remove(namespace);
    }

    /// Sets the content returned by the cached endpoint for a namespace.
    pub fn set_cached(&self, namespace: &str, configurations: Configurations) {
        self.cached
            .lock()
            .insert(namespace.to_string(), configurations);
    }

    /// Returns every recorded call.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Number of polls issued.
    pub fn poll_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, MockCall::Poll(_)))
            .count()
    }

    /// Number of queued poll answers not consumed yet.
    pub fn pending_polls(&self) -> usize {
        self.polls.lock().len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigTransport for MockTransport {
    fn poll_notifications(&self, notifications: &[Notification]) -> SyncResult<PollOutcome> {
        self.calls
            .lock()
            .push(MockCall::Poll(notifications.to_vec()));
        let scripted = self.polls.lock().pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => {
                std::thread::sleep(self.idle_delay);
                Ok(PollOutcome::NotModified)
            }
        }
    }

    fn fetch_release(&self, namespace: &str) -> SyncResult<ConfigRelease> {
        self.calls
            .lock()
            .push(MockCall::FetchRelease(namespace.to_string()));
        self.releases
            .lock()
            .get(namespace)
            .cloned()
            .ok_or_else(|| SyncError::ServiceError {
                status: STATUS_NOT_FOUND,
                message: format!("no release for {namespace}"),
            })
    }

    fn fetch_cached(&self, namespace: &str) -> SyncResult<Configurations> {
        self.calls
            .lock()
            .push(MockCall::FetchCached(namespace.to_string()));
        self.cached
            .lock()
            .get(namespace)
            .cloned()
            .ok_or_else(|| SyncError::ServiceError {
                status: STATUS_NOT_FOUND,
                message: format!("no cached content for {namespace}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scripted_polls_then_idle() {
        let transport = MockTransport::with_idle_delay(Duration::ZERO);
        transport.push_changed(vec![Notification::new("application", 5)]);
        transport.push_poll(Err(SyncError::Timeout));

        let sent = vec![Notification::new("application", -1)];
        assert_eq!(
            transport.poll_notifications(&sent).unwrap(),
            PollOutcome::Changed(vec![Notification::new("application", 5)])
        );
        assert!(matches!(
            transport.poll_notifications(&sent),
            Err(SyncError::Timeout)
        ));
        assert_eq!(
            transport.poll_notifications(&sent).unwrap(),
            PollOutcome::NotModified
        );
        assert_eq!(transport.poll_count(), 3);
        assert_eq!(transport.calls()[0], MockCall::Poll(sent));
    }

    #[test]
    fn missing_release_is_service_error() {
        let transport = MockTransport::new();
        let err = transport.fetch_release("application").unwrap_err();
        assert!(matches!(err, SyncError::ServiceError { status: 404, .. }));

        let mut configurations = Configurations::new();
        configurations.insert("timeout".into(), json!("30"));
        transport.set_release("application", ConfigRelease::new(configurations, "r1"));
        assert_eq!(
            transport.fetch_release("application").unwrap().release_key,
            "r1"
        );
    }
}
