//! In-memory namespace cache.

use apollo_sync_protocol::Configurations;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Holds the latest known content of every fetched namespace.
///
/// Each namespace maps to an immutable `Arc<Configurations>`. A refresh swaps
/// the whole `Arc`, so a reader holding a snapshot sees either the old
/// mapping or the new one and never a mix. Keys deleted remotely disappear
/// on the next refresh because nothing is merged.
#[derive(Debug, Default)]
pub struct ConfigCache {
    namespaces: RwLock<HashMap<String, Arc<Configurations>>>,
}

impl ConfigCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current mapping of a namespace, if it was ever fetched.
    pub fn snapshot(&self, namespace: &str) -> Option<Arc<Configurations>> {
        self.namespaces.read().get(namespace).cloned()
    }

    /// Replaces the whole mapping of a namespace.
    pub fn replace(&self, namespace: &str, configurations: Configurations) -> Arc<Configurations> {
        let configurations = Arc::new(configurations);
        self.namespaces
            .write()
            .insert(namespace.to_string(), Arc::clone(&configurations));
        configurations
    }

    /// Inserts an empty mapping if the namespace has none yet.
    ///
    /// Returns true if a mapping was inserted.
    pub fn ensure(&self, namespace: &str) -> bool {
        let mut namespaces = self.namespaces.write();
        if namespaces.contains_key(namespace) {
            return false;
        }
        namespaces.insert(namespace.to_string(), Arc::new(Configurations::new()));
        true
    }

    /// Returns true if the namespace was ever fetched.
    pub fn contains(&self, namespace: &str) -> bool {
        self.namespaces.read().contains_key(namespace)
    }

    /// Looks up a key in a namespace.
    pub fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        self.snapshot(namespace)
            .and_then(|configurations| configurations.get(key).cloned())
    }

    /// Looks up a key, falling back to `default` on any miss.
    pub fn get_or(&self, namespace: &str, key: &str, default: impl Into<Value>) -> Value {
        self.get(namespace, key).unwrap_or_else(|| default.into())
    }

    /// Names of all fetched namespaces, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Copies the whole cache, for snapshot dumps.
    pub fn dump(&self) -> BTreeMap<String, Configurations> {
        self.namespaces
            .read()
            .iter()
            .map(|(ns, configurations)| (ns.clone(), configurations.as_ref().clone()))
            .collect()
    }

    /// Number of fetched namespaces.
    pub fn len(&self) -> usize {
        self.namespaces.read().len()
    }

    /// Returns true if nothing was fetched yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
