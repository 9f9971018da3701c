//! Release store.
//!
//! Holds the current release of every namespace and hands out globally
//! increasing notification ids. Long-polls block on the store until a
//! release they care about moves.

use apollo_sync_protocol::{Configurations, Notification};
use parking_lot::{Condvar, Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Identifies one namespace of one application cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceKey {
    /// Application id.
    pub app_id: String,
    /// Cluster name.
    pub cluster: String,
    /// Namespace name.
    pub namespace: String,
}

impl NamespaceKey {
    /// Creates a new namespace key.
    pub fn new(
        app_id: impl Into<String>,
        cluster: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            cluster: cluster.into(),
            namespace: namespace.into(),
        }
    }
}

/// The current release of a namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceRelease {
    /// Published key/value mapping.
    pub configurations: Configurations,
    /// Opaque release identifier.
    pub release_key: String,
    /// Notification id assigned when this release was published.
    pub notification_id: i64,
}

/// Thread-safe store of namespace releases.
pub struct ReleaseStore {
    /// Releases by namespace.
    releases: RwLock<HashMap<NamespaceKey, NamespaceRelease>>,
    /// Last notification id handed out. Also the lock long-polls wait on.
    last_id: Mutex<i64>,
    /// Signalled on every publish.
    published: Condvar,
}

impl ReleaseStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::with_last_id(0)
    }

    /// Creates a store whose next notification id follows `last_id`.
    pub fn with_last_id(last_id: i64) -> Self {
        Self {
            releases: RwLock::new(HashMap::new()),
            last_id: Mutex::new(last_id),
            published: Condvar::new(),
        }
    }

    /// Returns the last notification id handed out.
    pub fn last_id(&self) -> i64 {
        *self.last_id.lock()
    }

    /// Returns the current release of a namespace.
    pub fn release(&self, key: &NamespaceKey) -> Option<NamespaceRelease> {
        self.releases.read().get(key).cloned()
    }

    /// Publishes a full mapping as a new release and wakes waiting polls.
    pub fn publish(&self, key: NamespaceKey, configurations: Configurations) -> NamespaceRelease {
        let mut last_id = self.last_id.lock();
        let mut releases = self.releases.write();
        self.commit(&mut last_id, &mut releases, key, configurations)
    }

    /// Publishes the current mapping with one key set.
    pub fn set(&self, key: NamespaceKey, name: impl Into<String>, value: Value) -> NamespaceRelease {
        let mut last_id = self.last_id.lock();
        let mut releases = self.releases.write();
        let mut configurations = releases
            .get(&key)
            .map(|release| release.configurations.clone())
            .unwrap_or_default();
        configurations.insert(name.into(), value);
        self.commit(&mut last_id, &mut releases, key, configurations)
    }

    /// Publishes the current mapping without `name`.
    ///
    /// Returns `None` if the namespace has never been published.
    pub fn remove(&self, key: &NamespaceKey, name: &str) -> Option<NamespaceRelease> {
        let mut last_id = self.last_id.lock();
        let mut releases = self.releases.write();
        let mut configurations = releases.get(key)?.configurations.clone();
        configurations.remove(name);
        Some(self.commit(&mut last_id, &mut releases, key.clone(), configurations))
    }

    /// Stores a release under the next notification id. Callers hold both
    /// locks, `last_id` first, so edits of the same namespace never interleave.
    fn commit(
        &self,
        last_id: &mut i64,
        releases: &mut HashMap<NamespaceKey, NamespaceRelease>,
        key: NamespaceKey,
        configurations: Configurations,
    ) -> NamespaceRelease {
        *last_id += 1;
        let release = NamespaceRelease {
            configurations,
            release_key: format!("{}-{:08}", key.namespace, *last_id),
            notification_id: *last_id,
        };
        releases.insert(key, release.clone());
        self.published.notify_all();
        release
    }

    /// Returns the namespaces whose notification id differs from the one
    /// the client reported, carrying the server's id.
    ///
    /// Namespaces that were never published are not reported.
    pub fn changes_since(
        &self,
        app_id: &str,
        cluster: &str,
        notifications: &[Notification],
    ) -> Vec<Notification> {
        let releases = self.releases.read();
        notifications
            .iter()
            .filter_map(|notification| {
                let key = NamespaceKey::new(app_id, cluster, &notification.namespace_name);
                let release = releases.get(&key)?;
                (release.notification_id != notification.notification_id).then(|| {
                    Notification::new(&notification.namespace_name, release.notification_id)
                })
            })
            .collect()
    }

    /// Blocks until one of the namespaces changes or `hold` elapses.
    ///
    /// Returns the changes, or an empty vector on timeout.
    pub fn wait_for_changes(
        &self,
        app_id: &str,
        cluster: &str,
        notifications: &[Notification],
        hold: Duration,
    ) -> Vec<Notification> {
        let deadline = Instant::now() + hold;
        let mut last_id = self.last_id.lock();
        loop {
            let changes = self.changes_since(app_id, cluster, notifications);
            if !changes.is_empty() {
                return changes;
            }
            if self.published.wait_until(&mut last_id, deadline).timed_out() {
                return self.changes_since(app_id, cluster, notifications);
            }
        }
    }

    /// Returns the number of published namespaces.
    pub fn len(&self) -> usize {
        self.releases.read().len()
    }

    /// Returns true if nothing has been published.
    pub fn is_empty(&self) -> bool {
        self.releases.read().is_empty()
    }
}

impl Default for ReleaseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    fn key(namespace: &str) -> NamespaceKey {
        NamespaceKey::new("demo", "default", namespace)
    }

    fn mapping(pairs: &[(&str, Value)]) -> Configurations {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn empty_store() {
        let store = ReleaseStore::new();
        assert!(store.is_empty());
        assert_eq!(store.last_id(), 0);
        assert!(store.release(&key("application")).is_none());
    }

    #[test]
    fn publish_assigns_increasing_ids() {
        let store = ReleaseStore::new();
        let first = store.publish(key("application"), mapping(&[("a", json!("1"))]));
        let second = store.publish(key("db"), mapping(&[("b", json!("2"))]));

        assert_eq!(first.notification_id, 1);
        assert_eq!(second.notification_id, 2);
        assert_ne!(first.release_key, second.release_key);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn set_and_remove_republish() {
        let store = ReleaseStore::with_last_id(4);
        store.set(key("application"), "timeout", json!("30"));
        let release = store.set(key("application"), "retries", json!("3"));
        assert_eq!(release.notification_id, 6);
        assert_eq!(release.configurations.len(), 2);

        let release = store.remove(&key("application"), "timeout").unwrap();
        assert_eq!(release.notification_id, 7);
        assert!(!release.configurations.contains_key("timeout"));

        assert!(store.remove(&key("missing"), "timeout").is_none());
    }

    #[test]
    fn concurrent_sets_keep_every_key() {
        let store = Arc::new(ReleaseStore::new());
        let writers: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for j in 0..25 {
                        store.set(key("application"), format!("k{i}-{j}"), json!(j));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let release = store.release(&key("application")).unwrap();
        assert_eq!(release.configurations.len(), 200);
        assert_eq!(release.notification_id, 200);
    }

    #[test]
    fn changes_since_reports_differing_ids() {
        let store = ReleaseStore::new();
        store.publish(key("application"), Configurations::new());
        store.publish(key("db"), Configurations::new());

        let changes = store.changes_since(
            "demo",
            "default",
            &[
                Notification::new("application", 1),
                Notification::new("db", -1),
                Notification::new("unpublished", -1),
            ],
        );
        assert_eq!(changes, vec![Notification::new("db", 2)]);

        // Other clusters see nothing.
        let changes =
            store.changes_since("demo", "gray", &[Notification::new("application", -1)]);
        assert!(changes.is_empty());
    }

    #[test]
    fn wait_times_out_without_changes() {
        let store = ReleaseStore::new();
        store.publish(key("application"), Configurations::new());

        let start = Instant::now();
        let changes = store.wait_for_changes(
            "demo",
            "default",
            &[Notification::new("application", 1)],
            Duration::from_millis(50),
        );
        assert!(changes.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn wait_wakes_on_publish() {
        let store = Arc::new(ReleaseStore::new());
        store.publish(key("application"), Configurations::new());

        let waiter = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store.wait_for_changes(
                    "demo",
                    "default",
                    &[Notification::new("application", 1)],
                    Duration::from_secs(10),
                )
            })
        };

        thread::sleep(Duration::from_millis(20));
        store.set(key("application"), "timeout", json!("30"));

        let changes = waiter.join().unwrap();
        assert_eq!(changes, vec![Notification::new("application", 2)]);
    }
}
