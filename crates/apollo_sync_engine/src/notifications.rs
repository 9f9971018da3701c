//! Per-namespace notification id tracking.

use apollo_sync_protocol::{Notification, UNSEEN_NOTIFICATION_ID};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct TrackerInner {
    /// Namespaces in the order they were first seen.
    order: Vec<String>,
    versions: HashMap<String, i64>,
}

/// Maps each namespace to the last notification id the service reported.
///
/// Namespaces are registered lazily on first lookup and never removed.
/// Updates overwrite unconditionally: the service owns the ids and may
/// legitimately reset them.
#[derive(Debug, Default)]
pub struct NotificationTracker {
    inner: RwLock<TrackerInner>,
}

impl NotificationTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last known id, registering the namespace at `-1` if unseen.
    pub fn version(&self, namespace: &str) -> i64 {
        if let Some(version) = self.inner.read().versions.get(namespace) {
            return *version;
        }
        let mut inner = self.inner.write();
        if let Some(version) = inner.versions.get(namespace) {
            return *version;
        }
        inner.order.push(namespace.to_string());
        inner
            .versions
            .insert(namespace.to_string(), UNSEEN_NOTIFICATION_ID);
        tracing::info!(namespace, "tracking new namespace");
        UNSEEN_NOTIFICATION_ID
    }

    /// Overwrites the id of a namespace.
    pub fn update(&self, namespace: &str, version: i64) {
        let mut inner = self.inner.write();
        if inner
            .versions
            .insert(namespace.to_string(), version)
            .is_none()
        {
            inner.order.push(namespace.to_string());
        }
    }

    /// Returns true if the namespace has been seen.
    pub fn contains(&self, namespace: &str) -> bool {
        self.inner.read().versions.contains_key(namespace)
    }

    /// Returns every tracked namespace with its id, in first-seen order.
    pub fn snapshot(&self) -> Vec<Notification> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .map(|ns| Notification::new(ns.clone(), inner.versions[ns]))
            .collect()
    }

    /// Number of tracked namespaces.
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    /// Returns true if no namespace is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
