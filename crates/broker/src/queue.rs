//! Broker core: queues, routing, delivery, redelivery.
//!
//! Addresses are routing keys; queues are the delivery units bound to
//! them. A send fans out to every queue bound to the target address plus
//! every queue bound to a divert destination (copy semantics).
//!
//! There is no dead-letter target anywhere: a message whose delivery
//! attempts are exhausted stays at the head of its queue and the queue
//! stalls until a consumer rebinds. A poison message can therefore block
//! its queue indefinitely; this is a deliberate never-lose-messages
//! policy, not an oversight.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::address::FullQueuePolicy;
use crate::pool::{DelayScheduler, WorkerPool};
use crate::topology::BrokerTopology;

/// Broker-level error.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker is not started")]
    NotStarted,

    #[error("broker storage error: {0}")]
    Storage(#[from] io::Error),

    #[error("no such queue: {0}")]
    UnknownQueue(String),

    #[error("queue '{0}' already has a consumer")]
    ConsumerExists(String),

    #[error("broker is shut down")]
    ShutDown,
}

/// Failure reported by a consumer for a single delivery.
///
/// The broker reacts according to the address's redelivery policy; the
/// consumer has no say beyond succeeding or failing.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct ConsumeError {
    reason: String,
}

impl ConsumeError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Delivery callback bound to a queue.
pub type ConsumerFn = dyn Fn(&[u8]) -> Result<(), ConsumeError> + Send + Sync;

enum MessageBody {
    Inline(Vec<u8>),
    /// Body spilled to a page file under the paging directory.
    Paged { path: PathBuf, len: usize },
}

impl MessageBody {
    fn len(&self) -> usize {
        match self {
            MessageBody::Inline(bytes) => bytes.len(),
            MessageBody::Paged { len, .. } => *len,
        }
    }

    fn load(&self) -> io::Result<Vec<u8>> {
        match self {
            MessageBody::Inline(bytes) => Ok(bytes.clone()),
            MessageBody::Paged { path, .. } => fs::read(path),
        }
    }

    fn discard(&self) {
        if let MessageBody::Paged { path, .. } = self {
            let _ = fs::remove_file(path);
        }
    }
}

struct Message {
    body: MessageBody,
    delivery_count: u32,
}

struct QueueState {
    messages: VecDeque<Message>,
    /// Bytes held by the queue, including the message currently being
    /// delivered (it stays in place until delivery succeeds).
    bytes: usize,
    /// Set when redelivery attempts for the head message are exhausted.
    stalled: bool,
    /// A delivery loop for this queue is running or scheduled.
    delivering: bool,
}

pub(crate) struct Queue {
    name: String,
    address: String,
    state: Mutex<QueueState>,
    /// Signalled when bytes drain, for `Block` full-queue policy.
    space: Condvar,
    consumer: Mutex<Option<Arc<ConsumerFn>>>,
}

impl Queue {
    fn new(name: String, address: String) -> Self {
        Self {
            name,
            address,
            state: Mutex::new(QueueState {
                messages: VecDeque::new(),
                bytes: 0,
                stalled: false,
                delivering: false,
            }),
            space: Condvar::new(),
            consumer: Mutex::new(None),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn address(&self) -> &str {
        &self.address
    }
}

/// The running broker core shared by all sessions.
pub struct BrokerCore {
    topology: BrokerTopology,
    queues: RwLock<HashMap<String, Arc<Queue>>>,
    pool: WorkerPool,
    scheduler: DelayScheduler,
    paging_dir: PathBuf,
    page_seq: AtomicU64,
    running: AtomicBool,
}

impl BrokerCore {
    pub(crate) fn new(
        topology: BrokerTopology,
        pool: WorkerPool,
        scheduler: DelayScheduler,
        paging_dir: PathBuf,
    ) -> Self {
        Self {
            topology,
            queues: RwLock::new(HashMap::new()),
            pool,
            scheduler,
            paging_dir,
            page_seq: AtomicU64::new(0),
            running: AtomicBool::new(true),
        }
    }

    pub(crate) fn topology(&self) -> &BrokerTopology {
        &self.topology
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop delivery and the pools. Best-effort; never fails.
    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.scheduler.shutdown();
        self.pool.shutdown();
        // Wake any producer blocked on a full queue so it can observe
        // shutdown instead of waiting forever.
        let queues = self.queues.read().unwrap();
        for queue in queues.values() {
            queue.space.notify_all();
        }
    }

    /// Addresses a message sent to `address` is routed to: the address
    /// itself plus every non-exclusive divert destination. An exclusive
    /// divert would replace the source; the only divert this broker ever
    /// builds is non-exclusive.
    fn route(&self, address: &str) -> Vec<String> {
        let mut targets = vec![address.to_string()];
        for divert in &self.topology.diverts {
            if divert.source == address {
                if divert.exclusive {
                    targets.clear();
                }
                targets.push(divert.destination.clone());
            }
        }
        targets
    }

    /// Create (or look up) a queue bound to `address`.
    pub(crate) fn create_queue(&self, name: &str, address: &str) -> Arc<Queue> {
        let mut queues = self.queues.write().unwrap();
        queues
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(queue = name, address, "queue created");
                Arc::new(Queue::new(name.to_string(), address.to_string()))
            })
            .clone()
    }

    pub(crate) fn queue_names(&self) -> Vec<String> {
        let queues = self.queues.read().unwrap();
        let mut names: Vec<String> = queues.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn message_count(&self, queue_name: &str) -> Result<usize, BrokerError> {
        let queues = self.queues.read().unwrap();
        let queue = queues
            .get(queue_name)
            .ok_or_else(|| BrokerError::UnknownQueue(queue_name.to_string()))?;
        let state = queue.state.lock().unwrap();
        Ok(state.messages.len())
    }

    pub(crate) fn delete_queue(&self, queue_name: &str) -> Result<(), BrokerError> {
        let mut queues = self.queues.write().unwrap();
        let queue = queues
            .remove(queue_name)
            .ok_or_else(|| BrokerError::UnknownQueue(queue_name.to_string()))?;
        let state = queue.state.lock().unwrap();
        for message in &state.messages {
            message.body.discard();
        }
        debug!(queue = queue_name, "queue deleted");
        Ok(())
    }

    /// Send a message to an address, fanning out to every bound queue.
    pub(crate) fn send(self: &Arc<Self>, address: &str, body: &[u8]) -> Result<(), BrokerError> {
        if !self.is_running() {
            return Err(BrokerError::ShutDown);
        }

        let targets = self.route(address);
        let bound: Vec<Arc<Queue>> = {
            let queues = self.queues.read().unwrap();
            queues
                .values()
                .filter(|q| targets.iter().any(|t| t == q.address()))
                .cloned()
                .collect()
        };

        for queue in bound {
            self.enqueue(&queue, body)?;
            self.dispatch(&queue);
        }
        Ok(())
    }

    fn enqueue(&self, queue: &Arc<Queue>, body: &[u8]) -> Result<(), BrokerError> {
        let policy = self.topology.settings_for(queue.address()).full_queue;
        let mut state = queue.state.lock().unwrap();

        let message_body = match policy {
            FullQueuePolicy::Block { max_size_bytes } => {
                while state.bytes + body.len() > max_size_bytes && self.is_running() {
                    state = queue.space.wait(state).unwrap();
                }
                if !self.is_running() {
                    return Err(BrokerError::ShutDown);
                }
                MessageBody::Inline(body.to_vec())
            }
            FullQueuePolicy::Page { max_size_bytes, .. } => {
                if state.bytes + body.len() > max_size_bytes {
                    let seq = self.page_seq.fetch_add(1, Ordering::SeqCst);
                    let path = self
                        .paging_dir
                        .join(format!("{}-{seq}.page", queue.name()));
                    fs::write(&path, body)?;
                    debug!(queue = queue.name(), page = %path.display(), "message paged");
                    MessageBody::Paged {
                        path,
                        len: body.len(),
                    }
                } else {
                    MessageBody::Inline(body.to_vec())
                }
            }
        };

        state.bytes += message_body.len();
        state.messages.push_back(Message {
            body: message_body,
            delivery_count: 0,
        });
        Ok(())
    }

    /// Bind a consumer to a queue. Binding clears a stall and resets the
    /// head message's delivery count — a fresh consumer gets fresh
    /// attempts, in order, starting from the message that stalled the
    /// queue.
    pub(crate) fn set_consumer(
        self: &Arc<Self>,
        queue: &Arc<Queue>,
        consumer: Arc<ConsumerFn>,
    ) -> Result<(), BrokerError> {
        {
            let mut slot = queue.consumer.lock().unwrap();
            if slot.is_some() {
                return Err(BrokerError::ConsumerExists(queue.name().to_string()));
            }
            *slot = Some(consumer);
        }
        {
            let mut state = queue.state.lock().unwrap();
            state.stalled = false;
            if let Some(head) = state.messages.front_mut() {
                head.delivery_count = 0;
            }
        }
        self.dispatch(queue);
        Ok(())
    }

    pub(crate) fn remove_consumer(&self, queue_name: &str) {
        let queues = self.queues.read().unwrap();
        if let Some(queue) = queues.get(queue_name) {
            queue.consumer.lock().unwrap().take();
        }
    }

    /// Kick off a delivery loop for the queue on the shared worker pool,
    /// unless one is already running or scheduled.
    fn dispatch(self: &Arc<Self>, queue: &Arc<Queue>) {
        {
            let mut state = queue.state.lock().unwrap();
            if state.delivering || state.stalled || state.messages.is_empty() {
                return;
            }
            if queue.consumer.lock().unwrap().is_none() {
                return;
            }
            state.delivering = true;
        }

        let core = self.clone();
        let queue = queue.clone();
        self.pool.execute(Box::new(move || core.deliver(&queue)));
    }

    /// Delivery loop for one queue. Runs on a pool worker; on a delayed
    /// redelivery it reschedules itself through the scheduler and keeps
    /// the `delivering` flag set so no second loop starts.
    fn deliver(self: Arc<Self>, queue: &Arc<Queue>) {
        loop {
            if !self.is_running() {
                queue.state.lock().unwrap().delivering = false;
                return;
            }

            let consumer = { queue.consumer.lock().unwrap().clone() };
            let Some(consumer) = consumer else {
                queue.state.lock().unwrap().delivering = false;
                return;
            };

            let next = {
                let mut state = queue.state.lock().unwrap();
                let head = state
                    .messages
                    .front()
                    .map(|head| (head.body.load(), head.delivery_count + 1));
                if head.is_none() {
                    state.delivering = false;
                }
                head
            };
            let Some((body, attempt)) = next else {
                return;
            };

            let bytes = match body {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(queue = queue.name(), error = %e, "failed to load message body; queue stalled");
                    let mut state = queue.state.lock().unwrap();
                    state.stalled = true;
                    state.delivering = false;
                    return;
                }
            };

            match (*consumer)(&bytes) {
                Ok(()) => {
                    let mut state = queue.state.lock().unwrap();
                    if let Some(message) = state.messages.pop_front() {
                        state.bytes -= message.body.len();
                        message.body.discard();
                    }
                    queue.space.notify_all();
                }
                Err(e) => {
                    let policy = &self.topology.settings_for(queue.address()).redelivery;
                    let delay = {
                        let mut state = queue.state.lock().unwrap();
                        let Some(head) = state.messages.front_mut() else {
                            state.delivering = false;
                            return;
                        };
                        head.delivery_count = attempt;

                        if policy.attempts_exhausted(attempt) {
                            warn!(
                                queue = queue.name(),
                                attempts = attempt,
                                error = %e,
                                "delivery attempts exhausted; message remains queued"
                            );
                            state.stalled = true;
                            state.delivering = false;
                            return;
                        }
                        policy.delay_for_attempt(attempt + 1)
                    };

                    debug!(
                        queue = queue.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "delivery failed; redelivering from head"
                    );

                    if delay.is_zero() {
                        continue;
                    }

                    // `delivering` stays true across the delay.
                    let core = self.clone();
                    let queue = queue.clone();
                    self.scheduler
                        .schedule(delay, Box::new(move || core.deliver(&queue)));
                    return;
                }
            }
        }
    }
}
