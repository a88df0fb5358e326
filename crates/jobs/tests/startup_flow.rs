//! Black-box test of the full startup sequence: broker start, stale queue
//! cleanup, event listener binding, job listener binding, then live
//! traffic through both paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use tessera_broker::{BrokerConfig, BrokerSupervisor, DEFAULT_EVENT_ADDRESS, JOB_ADDRESS};
use tessera_events::{
    Event, EventChannel, EventKind, EventListener, EventTarget, ListenerError, ListenerRegistry,
    Reliability,
};
use tessera_jobs::{
    AsyncJobStatus, HandlerError, InMemoryJobStatusStore, JobConfig, JobDispatcher, JobHandler,
    JobHandlerRegistry, JobId, JobState, JobStatusStore,
};

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

struct Doubler;

impl JobHandler for Doubler {
    fn kind(&self) -> &str {
        "doubler"
    }

    fn execute(&self, payload: &serde_json::Value) -> Result<serde_json::Value, HandlerError> {
        let n = payload["n"].as_i64().ok_or_else(|| HandlerError::new("missing n"))?;
        Ok(serde_json::json!({ "n": n * 2 }))
    }
}

fn wait_for_state(store: &InMemoryJobStatusStore, id: JobId, state: JobState) -> AsyncJobStatus {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let status = store.get(id).unwrap();
        if status.state == state {
            return status;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {state}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn boot_sequence_cleanup_then_bind_then_traffic() {
    tessera_observability::init();

    let dir = tempfile::tempdir().unwrap();
    let cfg = BrokerConfig::default()
        .with_storage_root(dir.path())
        .with_bridging(true);
    let supervisor = BrokerSupervisor::new(cfg);

    // 1. Broker start.
    supervisor.start().unwrap();
    let session = supervisor.session().unwrap();

    // Simulate queues surviving from a previous configuration: one empty,
    // one with backlog.
    session.create_queue("event.retired", DEFAULT_EVENT_ADDRESS).unwrap();
    session.create_queue("job.retired", JOB_ADDRESS).unwrap();
    session.send(JOB_ADDRESS, b"{\"orphaned\":true}").unwrap();
    std::thread::sleep(Duration::from_millis(20));

    // 2. Cleanup runs before anything binds: the empty stale queue goes,
    //    the one with backlog stays.
    let active = [
        EventChannel::queue_name("logging"),
        EventChannel::queue_name("bridge"),
        JobDispatcher::queue_name("doubler"),
    ];
    supervisor.cleanup_old_queues(&active).unwrap();

    let mgmt = supervisor.management_session().unwrap();
    let names = mgmt.queue_names();
    assert!(!names.contains(&"event.retired".to_string()));
    assert!(names.contains(&"job.retired".to_string()));
    assert_eq!(mgmt.message_count("job.retired").unwrap(), 1);

    // 3. Event listeners bind.
    let channel = EventChannel::new(supervisor.session().unwrap());
    let (tx, rx) = mpsc::channel();
    let mut listener_registry = ListenerRegistry::builtin();
    listener_registry.register("recorder", {
        let tx = tx.clone();
        move || {
            Arc::new(Recorder {
                id: "recorder".to_string(),
                reliability: Reliability::Bridged,
                tx: tx.clone(),
            })
        }
    });
    channel.register_configured(
        &[
            "logging".to_string(),
            "recorder".to_string(),
            "not-compiled-in".to_string(),
        ],
        &listener_registry,
    );

    // 4. Job listeners bind.
    let store = Arc::new(InMemoryJobStatusStore::new());
    let mut handler_registry = JobHandlerRegistry::new();
    handler_registry.register(Arc::new(Doubler));
    let dispatcher = JobDispatcher::new(
        supervisor.session().unwrap(),
        store.clone(),
        Arc::new(handler_registry),
    );
    dispatcher.register_listener("doubler");
    dispatcher.register_listener("not-compiled-in");

    // 5. Traffic. The bridged recorder gets the diverted copy of a default
    //    publish; the job runs to completion.
    let event = Event::new(EventTarget::Consumer, EventKind::Created).with_entity("unit-1");
    channel.publish(&event).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), event);

    let queued = dispatcher
        .queue_job(JobConfig::new("doubler").with_payload(serde_json::json!({"n": 21})))
        .unwrap();
    let finished = wait_for_state(&store, queued.id, JobState::Finished);
    assert_eq!(finished.result, Some(serde_json::json!({"n": 42})));

    // 6. Shutdown in dependency order.
    channel.shut_down();
    dispatcher.shut_down();
    supervisor.stop();
    assert!(!supervisor.is_started());
}

#[test]
fn poison_event_stalls_only_its_own_listener() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = BrokerConfig {
        redelivery_delay: Duration::from_millis(5),
        max_redelivery_delay: Duration::from_millis(10),
        max_delivery_attempts: 2,
        ..BrokerConfig::default()
    }
    .with_storage_root(dir.path());
    let supervisor = BrokerSupervisor::new(cfg);
    supervisor.start().unwrap();

    let channel = EventChannel::new(supervisor.session().unwrap());

    struct Poisoned {
        attempts: Arc<AtomicUsize>,
    }

    impl EventListener for Poisoned {
        fn id(&self) -> &str {
            "poisoned"
        }

        fn on_event(&self, _: &Event) -> Result<(), ListenerError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ListenerError::Processing("cannot handle anything".into()))
        }
    }

    let attempts = Arc::new(AtomicUsize::new(0));
    channel.register_listener(Arc::new(Poisoned {
        attempts: attempts.clone(),
    }));

    let (tx, rx) = mpsc::channel();
    channel.register_listener(Arc::new(Recorder {
        id: "healthy".to_string(),
        reliability: Reliability::Standard,
        tx,
    }));

    // First event poisons the failing listener's queue.
    channel
        .publish(&Event::new(EventTarget::Pool, EventKind::Created))
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while attempts.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    // Later events still flow to the healthy listener; the poisoned queue
    // keeps its backlog.
    for _ in 0..3 {
        channel
            .publish(&Event::new(EventTarget::Owner, EventKind::Modified))
            .unwrap();
    }
    let mut seen = 0;
    // 4 total: the poison event plus three more.
    while rx.recv_timeout(Duration::from_secs(2)).is_ok() {
        seen += 1;
        if seen == 4 {
            break;
        }
    }
    assert_eq!(seen, 4);

    let mgmt = supervisor.management_session().unwrap();
    assert_eq!(
        mgmt.message_count(&EventChannel::queue_name("poisoned")).unwrap(),
        4
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    channel.shut_down();
    supervisor.stop();
}
