//! Change callbacks.

use crate::error::CallbackError;
use crate::globals::SharedConfig;
use apollo_sync_protocol::Configurations;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A function invoked with the fresh content of a refreshed namespace.
pub type Callback = Arc<dyn Fn(&Configurations) -> Result<(), CallbackError> + Send + Sync>;

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Number of callbacks invoked.
    pub invoked: usize,
    /// Number of callbacks that returned an error or panicked.
    pub failed: usize,
}

/// Ordered list of change callbacks.
///
/// Callbacks run synchronously on the polling thread in registration order.
/// Duplicates are allowed and fire once per registration. A callback that
/// fails or panics is logged and skipped; the rest still run.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: RwLock<Vec<Callback>>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a callback.
    pub fn register<F>(&self, callback: F)
    where
        F: Fn(&Configurations) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
    }

    /// Appends several callbacks, keeping their order.
    pub fn register_all<I>(&self, callbacks: I)
    where
        I: IntoIterator<Item = Callback>,
    {
        self.callbacks.write().extend(callbacks);
    }

    /// Invokes every callback with the given content.
    pub fn dispatch(&self, namespace: &str, configurations: &Configurations) -> DispatchReport {
        // Clone the list so callbacks may register further callbacks.
        let callbacks = self.callbacks.read().clone();
        let mut report = DispatchReport::default();

        for (index, callback) in callbacks.iter().enumerate() {
            report.invoked += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| callback(configurations))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(namespace, index, error = %e, "change callback failed");
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::warn!(namespace, index, "change callback panicked");
                }
            }
        }

        report
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Returns true if no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &self.len())
            .finish()
    }
}

/// Builds the callback that copies refreshed namespaces into `store`.
pub fn propagate_into(store: SharedConfig) -> Callback {
    Arc::new(move |configurations: &Configurations| {
        tracing::debug!(fields = configurations.len(), "propagating into shared config");
        store.extend_from(configurations);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn sample() -> Configurations {
        let mut configurations = Configurations::new();
        configurations.insert("timeout".into(), json!("30"));
        configurations
    }

    #[test]
    fn dispatch_in_registration_order() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            registry.register(move |configurations: &Configurations| {
                seen.lock().push((name, configurations.clone()));
                Ok(())
            });
        }

        let report = registry.dispatch("application", &sample());
        assert_eq!(report, DispatchReport { invoked: 3, failed: 0 });

        let seen = seen.lock();
        let order: Vec<_> = seen.iter().map(|(name, _)| *name).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(seen.iter().all(|(_, c)| *c == sample()));
    }

    #[test]
    fn failures_do_not_stop_dispatch() {
        let registry = CallbackRegistry::new();
        let reached = Arc::new(Mutex::new(0));

        registry.register(|_: &Configurations| Err("boom".into()));
        registry.register(|_: &Configurations| panic!("callback bug"));
        let counter = Arc::clone(&reached);
        registry.register(move |_: &Configurations| {
            *counter.lock() += 1;
            Ok(())
        });

        let report = registry.dispatch("application", &sample());
        assert_eq!(report.invoked, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(*reached.lock(), 1);
    }

    #[test]
    fn duplicates_fire_per_registration() {
        let registry = CallbackRegistry::new();
        let calls = Arc::new(Mutex::new(0));
        let callback: Callback = {
            let calls = Arc::clone(&calls);
            Arc::new(move |_: &Configurations| {
                *calls.lock() += 1;
                Ok(())
            })
        };

        registry.register_all(vec![Arc::clone(&callback), callback]);
        registry.dispatch("application", &sample());

        assert_eq!(registry.len(), 2);
        assert_eq!(*calls.lock(), 2);
    }

    #[test]
    fn propagate_into_fills_store() {
        let store = SharedConfig::new();
        let registry = CallbackRegistry::new();
        registry.register_all([propagate_into(store.clone())]);

        registry.dispatch("application", &sample());
        assert_eq!(store.get("timeout"), Some(json!("30")));
    }
}
