//! Job handlers and their static registry.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

/// Failure inside a job handler. Recorded on the status record and handed
/// back to the broker so its redelivery policy decides about retries.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Executable work for one job kind.
pub trait JobHandler: Send + Sync {
    /// Stable kind identifier; submissions name it and the registry is
    /// keyed by it.
    fn kind(&self) -> &str;

    fn execute(&self, payload: &serde_json::Value) -> Result<serde_json::Value, HandlerError>;
}

impl<H: JobHandler + ?Sized> JobHandler for Arc<H> {
    fn kind(&self) -> &str {
        (**self).kind()
    }

    fn execute(&self, payload: &serde_json::Value) -> Result<serde_json::Value, HandlerError> {
        (**self).execute(payload)
    }
}

/// Compiled-in lookup table of job handlers. No dynamic loading: a kind
/// either maps to a registered handler or submission is rejected.
#[derive(Default)]
pub struct JobHandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its kind, replacing any existing one.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.kind().to_string(), handler);
    }

    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn knows(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn known_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl JobHandler for Echo {
        fn kind(&self) -> &str {
            "echo"
        }

        fn execute(&self, payload: &serde_json::Value) -> Result<serde_json::Value, HandlerError> {
            Ok(payload.clone())
        }
    }

    #[test]
    fn registry_resolves_by_kind() {
        let mut registry = JobHandlerRegistry::new();
        registry.register(Arc::new(Echo));

        assert!(registry.knows("echo"));
        assert!(!registry.knows("refresh"));

        let handler = registry.resolve("echo").unwrap();
        let out = handler.execute(&serde_json::json!({"x": 1})).unwrap();
        assert_eq!(out, serde_json::json!({"x": 1}));
    }
}
