//! The event publication channel.

use std::sync::Mutex;

use thiserror::Error;
use tracing::{error, info, warn};

use tessera_broker::{
    BrokerError, ConsumeError, ConsumerHandle, Session, BRIDGED_EVENT_ADDRESS,
    DEFAULT_EVENT_ADDRESS,
};

use crate::event::Event;
use crate::listener::{EventListener, Reliability};
use crate::registry::ListenerRegistry;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Publishes events and owns the listener consumer bindings.
///
/// Publishers only ever talk to [`DEFAULT_EVENT_ADDRESS`]; the broker's
/// divert produces the bridged copy without the publisher knowing bridging
/// exists.
pub struct EventChannel {
    session: Session,
    handles: Mutex<Vec<ConsumerHandle>>,
}

impl EventChannel {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Queue a listener consumes from, derived from its id.
    pub fn queue_name(listener_id: &str) -> String {
        format!("event.{listener_id}")
    }

    /// Bind a listener to its queue. A binding failure is logged and the
    /// listener skipped; event flow for everything already bound continues.
    pub fn register_listener(&self, listener: std::sync::Arc<dyn EventListener>) {
        let id = listener.id().to_string();
        let address = match listener.reliability() {
            Reliability::Standard => DEFAULT_EVENT_ADDRESS,
            Reliability::Bridged => BRIDGED_EVENT_ADDRESS,
        };

        let consumer = {
            let listener = listener.clone();
            move |bytes: &[u8]| -> Result<(), ConsumeError> {
                let event: Event = serde_json::from_slice(bytes)
                    .map_err(|e| ConsumeError::failed(format!("undecodable event: {e}")))?;
                listener
                    .on_event(&event)
                    .map_err(|e| ConsumeError::failed(e.to_string()))
            }
        };

        match self
            .session
            .create_consumer(&Self::queue_name(&id), address, consumer)
        {
            Ok(handle) => {
                info!(listener = %id, address, "event listener bound");
                self.handles.lock().unwrap().push(handle);
            }
            Err(e) => {
                error!(listener = %id, address, error = %e, "failed to bind event listener; skipping");
            }
        }
    }

    /// Resolve configured listener ids through the registry and bind each.
    /// Unknown ids are logged and skipped.
    pub fn register_configured(&self, ids: &[String], registry: &ListenerRegistry) {
        for id in ids {
            match registry.resolve(id) {
                Some(listener) => self.register_listener(listener),
                None => warn!(listener = %id, "unknown event listener id; skipping"),
            }
        }
    }

    /// Publish an event. Serialized exactly once; fan-out happens in the
    /// broker.
    pub fn publish(&self, event: &Event) -> Result<(), ChannelError> {
        let bytes = serde_json::to_vec(event)?;
        self.session.send(DEFAULT_EVENT_ADDRESS, &bytes)?;
        Ok(())
    }

    /// Release all consumer bindings. Safe to call if startup never
    /// completed or nothing was registered.
    pub fn shut_down(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        let released = handles.len();
        drop(handles);
        info!(released, "event channel shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, EventTarget};
    use crate::listener::ListenerError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    use tessera_broker::{BrokerConfig, BrokerSupervisor};

    struct Recorder {
        id: String,
        reliability: Reliability,
        tx: mpsc::Sender<Event>,
    }

    impl EventListener for Recorder {
        fn id(&self) -> &str {
            &self.id
        }

        fn on_event(&self, event: &Event) -> Result<(), ListenerError> {
            let _ = self.tx.send(event.clone());
            Ok(())
        }

        fn reliability(&self) -> Reliability {
            self.reliability
        }
    }

    fn started_supervisor(bridging: bool) -> (BrokerSupervisor, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = BrokerConfig::default()
            .with_storage_root(dir.path())
            .with_bridging(bridging);
        let supervisor = BrokerSupervisor::new(cfg);
        supervisor.start().unwrap();
        (supervisor, dir)
    }

    #[test]
    fn published_event_reaches_standard_listener() {
        let (supervisor, _dir) = started_supervisor(false);
        let channel = EventChannel::new(supervisor.session().unwrap());

        let (tx, rx) = mpsc::channel();
        channel.register_listener(Arc::new(Recorder {
            id: "recorder".to_string(),
            reliability: Reliability::Standard,
            tx,
        }));

        let event = Event::new(EventTarget::Consumer, EventKind::Created).with_entity("unit-9");
        channel.publish(&event).unwrap();

        let received = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(received, event);

        channel.shut_down();
        supervisor.stop();
    }

    #[test]
    fn bridged_listener_gets_diverted_copy() {
        let (supervisor, _dir) = started_supervisor(true);
        let channel = EventChannel::new(supervisor.session().unwrap());

        let (tx_std, rx_std) = mpsc::channel();
        let (tx_br, rx_br) = mpsc::channel();
        channel.register_listener(Arc::new(Recorder {
            id: "standard".to_string(),
            reliability: Reliability::Standard,
            tx: tx_std,
        }));
        channel.register_listener(Arc::new(Recorder {
            id: "bridged".to_string(),
            reliability: Reliability::Bridged,
            tx: tx_br,
        }));

        let event = Event::new(EventTarget::Owner, EventKind::Modified);
        channel.publish(&event).unwrap();

        assert_eq!(rx_std.recv_timeout(Duration::from_secs(2)).unwrap(), event);
        assert_eq!(rx_br.recv_timeout(Duration::from_secs(2)).unwrap(), event);

        channel.shut_down();
        supervisor.stop();
    }

    #[test]
    fn no_bridged_delivery_when_bridging_disabled() {
        let (supervisor, _dir) = started_supervisor(false);
        let channel = EventChannel::new(supervisor.session().unwrap());

        let (tx, rx) = mpsc::channel();
        channel.register_listener(Arc::new(Recorder {
            id: "bridged".to_string(),
            reliability: Reliability::Bridged,
            tx,
        }));

        channel
            .publish(&Event::new(EventTarget::Pool, EventKind::Deleted))
            .unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        channel.shut_down();
        supervisor.stop();
    }

    #[test]
    fn unknown_configured_id_is_skipped() {
        let (supervisor, _dir) = started_supervisor(false);
        let channel = EventChannel::new(supervisor.session().unwrap());
        let registry = ListenerRegistry::builtin();

        channel.register_configured(
            &["logging".to_string(), "no-such-listener".to_string()],
            &registry,
        );

        let mgmt = supervisor.management_session().unwrap();
        assert_eq!(mgmt.queue_names(), vec!["event.logging"]);

        channel.shut_down();
        supervisor.stop();
    }

    #[test]
    fn listener_failure_is_retried_by_the_broker() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = BrokerConfig {
            redelivery_delay: Duration::from_millis(5),
            max_redelivery_delay: Duration::from_millis(10),
            max_delivery_attempts: 3,
            ..BrokerConfig::default()
        }
        .with_storage_root(dir.path());
        let supervisor = BrokerSupervisor::new(cfg);
        supervisor.start().unwrap();
        let channel = EventChannel::new(supervisor.session().unwrap());

        struct FlakyOnce {
            attempts: AtomicUsize,
            tx: mpsc::Sender<Event>,
        }

        impl EventListener for FlakyOnce {
            fn id(&self) -> &str {
                "flaky"
            }

            fn on_event(&self, event: &Event) -> Result<(), ListenerError> {
                if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(ListenerError::Processing("first attempt fails".into()));
                }
                let _ = self.tx.send(event.clone());
                Ok(())
            }
        }

        let (tx, rx) = mpsc::channel();
        channel.register_listener(Arc::new(FlakyOnce {
            attempts: AtomicUsize::new(0),
            tx,
        }));

        let event = Event::new(EventTarget::Entitlement, EventKind::Created);
        channel.publish(&event).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), event);
        channel.shut_down();
        supervisor.stop();
    }
}
