//! Event publication over the embedded broker.
//!
//! Publishers construct an [`Event`] and hand it to the [`EventChannel`];
//! listeners are compiled-in implementations of [`EventListener`] resolved
//! by identifier through the [`ListenerRegistry`] and bound to broker
//! queues at startup.

pub mod channel;
pub mod event;
pub mod listener;
pub mod registry;

pub use channel::{ChannelError, EventChannel};
pub use event::{Event, EventId, EventKind, EventTarget};
pub use listener::{
    BridgePublisher, EventListener, ListenerError, LoggingListener, Reliability,
};
pub use registry::ListenerRegistry;
