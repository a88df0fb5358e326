//! Client-facing broker sessions.
//!
//! A [`Session`] is a lightweight handle onto the running core; publishers
//! and consumers each hold their own. Sessions are only valid between
//! supervisor start and stop.

use std::sync::Arc;

use tracing::debug;

use crate::queue::{BrokerCore, BrokerError, ConsumeError};

/// Producer/consumer session against the embedded broker.
#[derive(Clone)]
pub struct Session {
    core: Arc<BrokerCore>,
}

impl Session {
    pub(crate) fn new(core: Arc<BrokerCore>) -> Self {
        Self { core }
    }

    /// Publish a message body to an address. Fan-out to bound queues and
    /// divert destinations happens inside the core; this call blocks only
    /// under a `Block` full-queue policy.
    pub fn send(&self, address: &str, body: &[u8]) -> Result<(), BrokerError> {
        self.core.send(address, body)
    }

    /// Create a named queue bound to `address` and attach `consumer` to it.
    ///
    /// Creating the queue and binding the consumer are separate steps in
    /// the core: a queue created earlier (for example by a previous run)
    /// keeps its backlog, and binding drains it in order.
    pub fn create_consumer<F>(
        &self,
        queue_name: &str,
        address: &str,
        consumer: F,
    ) -> Result<ConsumerHandle, BrokerError>
    where
        F: Fn(&[u8]) -> Result<(), ConsumeError> + Send + Sync + 'static,
    {
        if !self.core.is_running() {
            return Err(BrokerError::ShutDown);
        }
        let queue = self.core.create_queue(queue_name, address);
        self.core.set_consumer(&queue, Arc::new(consumer))?;
        debug!(queue = queue_name, address, "consumer bound");
        Ok(ConsumerHandle {
            core: self.core.clone(),
            queue_name: queue_name.to_string(),
        })
    }

    /// Create a queue bound to `address` without attaching a consumer.
    /// Messages routed to it accumulate until a consumer binds.
    pub fn create_queue(&self, queue_name: &str, address: &str) -> Result<(), BrokerError> {
        if !self.core.is_running() {
            return Err(BrokerError::ShutDown);
        }
        self.core.create_queue(queue_name, address);
        Ok(())
    }
}

/// Handle to a bound consumer. Dropping it unbinds the consumer; queued
/// messages stay in place for the next binding.
pub struct ConsumerHandle {
    core: Arc<BrokerCore>,
    queue_name: String,
}

impl ConsumerHandle {
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Explicitly unbind. Equivalent to dropping the handle.
    pub fn close(self) {}
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.core.remove_consumer(&self.queue_name);
        debug!(queue = %self.queue_name, "consumer unbound");
    }
}
