use std::collections::BTreeMap;
use std::sync::Arc;

use crate::collector::{Collector, CollectorFactory, CollectorSettings, ServiceKind};
use crate::model::Labels;
use crate::producers;

/// Central registry mapping collector keys (`"<class>/<name>"`) to factories.
///
/// Built once at start-up and passed by reference to whatever assembles
/// collector sets.
pub struct CollectorRegistry {
    factories: BTreeMap<String, CollectorFactory>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with every built-in collector
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        producers::register_builtin(&mut registry);
        registry
    }

    /// Register a factory under `"<class>/<name>"`, replacing any previous one.
    pub fn register<F>(&mut self, class: &str, name: &str, factory: F)
    where
        F: Fn(&Labels, &CollectorSettings) -> anyhow::Result<Arc<dyn Collector>>
            + Send
            + Sync
            + 'static,
    {
        self.factories
            .insert(collector_key(class, name), Arc::new(factory));
    }

    /// Factories enabled for a service class.
    ///
    /// Excluding the class name itself disables the whole class; excluding a
    /// full key disables only that collector. Unknown entries are ignored.
    pub fn build_enabled(&self, class: &str, excluded: &[String]) -> BTreeMap<String, CollectorFactory> {
        if excluded.iter().any(|e| e == class) {
            tracing::debug!(class, "collector class disabled");
            return BTreeMap::new();
        }

        let prefix = format!("{}/", class);
        self.factories
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| {
                let disabled = excluded.iter().any(|e| e == *key);
                if disabled {
                    tracing::debug!(collector = %key, "collector disabled");
                }
                !disabled
            })
            .map(|(key, factory)| (key.clone(), Arc::clone(factory)))
            .collect()
    }

    /// Convenience wrapper over [`build_enabled`](Self::build_enabled) for a service kind
    pub fn enabled_for(&self, kind: ServiceKind, excluded: &[String]) -> BTreeMap<String, CollectorFactory> {
        self.build_enabled(kind.as_str(), excluded)
    }

    /// Check if a collector key is registered
    pub fn has_collector(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// All registered keys, sorted
    pub fn keys(&self) -> Vec<&String> {
        self.factories.keys().collect()
    }
}

impl Default for CollectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn collector_key(class: &str, name: &str) -> String {
    format!("{}/{}", class, name)
}
