//! Listener trait and the built-in listeners.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::event::Event;

/// How a listener's deliveries are treated by the broker.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reliability {
    /// Standard address: exponential-backoff redelivery.
    Standard,
    /// Bridged address: zero-delay single-attempt redelivery so failures
    /// requeue at the head and per-integration ordering holds.
    Bridged,
}

/// Failure processing one event. Returned to the broker, which applies the
/// address's redelivery policy.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to process event: {0}")]
    Processing(String),

    #[error("malformed event payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// An event consumer bound to its own queue at startup.
pub trait EventListener: Send + Sync {
    /// Stable identifier; also names the listener's queue.
    fn id(&self) -> &str;

    fn on_event(&self, event: &Event) -> Result<(), ListenerError>;

    fn reliability(&self) -> Reliability {
        Reliability::Standard
    }
}

impl<L: EventListener + ?Sized> EventListener for Arc<L> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn on_event(&self, event: &Event) -> Result<(), ListenerError> {
        (**self).on_event(event)
    }

    fn reliability(&self) -> Reliability {
        (**self).reliability()
    }
}

/// Audit-style listener that records every event to the structured log.
#[derive(Debug, Default)]
pub struct LoggingListener;

impl EventListener for LoggingListener {
    fn id(&self) -> &str {
        "logging"
    }

    fn on_event(&self, event: &Event) -> Result<(), ListenerError> {
        info!(
            event_id = %event.id,
            target = ?event.target,
            kind = ?event.kind,
            owner_id = event.owner_id.as_ref().map(|o| o.to_string()),
            entity_id = event.entity_id.as_deref(),
            principal = event.principal.as_deref(),
            "event"
        );
        Ok(())
    }
}

/// Forwards events toward the external message bus integration.
///
/// The actual outbound transport is the host's concern; this listener is
/// the in-process end of the bridge and rides the bridged address so a
/// transport outage stalls (rather than reorders or drops) the feed.
pub struct BridgePublisher {
    forward: Box<dyn Fn(&Event) -> Result<(), ListenerError> + Send + Sync>,
}

impl BridgePublisher {
    pub fn new<F>(forward: F) -> Self
    where
        F: Fn(&Event) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Self {
            forward: Box::new(forward),
        }
    }
}

impl Default for BridgePublisher {
    /// Log-only bridge, used when no outbound transport is wired up.
    fn default() -> Self {
        Self::new(|event| {
            info!(event_id = %event.id, "bridged event forwarded");
            Ok(())
        })
    }
}

impl EventListener for BridgePublisher {
    fn id(&self) -> &str {
        "bridge"
    }

    fn on_event(&self, event: &Event) -> Result<(), ListenerError> {
        (self.forward)(event)
    }

    fn reliability(&self) -> Reliability {
        Reliability::Bridged
    }
}
