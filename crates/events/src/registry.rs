//! Static listener registry.
//!
//! Listeners are compiled in and resolved by string identifier from
//! configuration. There is no dynamic loading; an id either maps to a
//! registered constructor or it doesn't.

use std::collections::HashMap;
use std::sync::Arc;

use crate::listener::{BridgePublisher, EventListener, LoggingListener};

type Constructor = Box<dyn Fn() -> Arc<dyn EventListener> + Send + Sync>;

/// Lookup table of listener constructors.
pub struct ListenerRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ListenerRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with the built-in listeners: `logging` and `bridge`.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("logging", || Arc::new(LoggingListener));
        registry.register("bridge", || Arc::new(BridgePublisher::default()));
        registry
    }

    /// Register a constructor under an id, replacing any existing one.
    pub fn register<F>(&mut self, id: &str, constructor: F)
    where
        F: Fn() -> Arc<dyn EventListener> + Send + Sync + 'static,
    {
        self.constructors
            .insert(id.to_string(), Box::new(constructor));
    }

    /// Construct the listener registered under `id`, if any.
    pub fn resolve(&self, id: &str) -> Option<Arc<dyn EventListener>> {
        self.constructors.get(id).map(|ctor| ctor())
    }

    pub fn known_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.constructors.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::Reliability;

    #[test]
    fn builtin_registry_resolves_both_listeners() {
        let registry = ListenerRegistry::builtin();

        let logging = registry.resolve("logging").unwrap();
        assert_eq!(logging.reliability(), Reliability::Standard);

        let bridge = registry.resolve("bridge").unwrap();
        assert_eq!(bridge.reliability(), Reliability::Bridged);

        assert_eq!(registry.known_ids(), vec!["bridge", "logging"]);
    }

    #[test]
    fn unknown_id_resolves_to_none() {
        let registry = ListenerRegistry::builtin();
        assert!(registry.resolve("no-such-listener").is_none());
    }
}
