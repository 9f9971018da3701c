//! Shared, process-wide configuration store.

use apollo_sync_protocol::Configurations;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A store of top-level configuration fields shared across the process.
///
/// The engine writes into it from the default callback after each refresh;
/// anything holding a clone can read the freshest values without knowing
/// which namespace they came from. Later namespaces overwrite earlier ones
/// on key collisions.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    fields: Arc<RwLock<HashMap<String, Value>>>,
}

impl SharedConfig {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of a field.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.read().get(name).cloned()
    }

    /// Returns the value of a field, or `default`.
    pub fn get_or(&self, name: &str, default: impl Into<Value>) -> Value {
        self.get(name).unwrap_or_else(|| default.into())
    }

    /// Sets a field.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.fields.write().insert(name.into(), value);
    }

    /// Copies every key of a namespace into the store.
    pub fn extend_from(&self, configurations: &Configurations) {
        let mut fields = self.fields.write();
        for (key, value) in configurations {
            fields.insert(key.clone(), value.clone());
        }
    }

    /// Names of all fields, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.fields.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
