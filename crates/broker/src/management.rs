//! Management session: queue inspection and removal.
//!
//! Used during startup to sweep queues left behind by configuration
//! changes (a listener removed from config leaves its queue in the
//! bindings), and by diagnostics.

use std::sync::Arc;

use tracing::info;

use crate::queue::{BrokerCore, BrokerError};

/// Administrative view of the broker's queues.
#[derive(Clone)]
pub struct ManagementSession {
    core: Arc<BrokerCore>,
}

impl ManagementSession {
    pub(crate) fn new(core: Arc<BrokerCore>) -> Self {
        Self { core }
    }

    /// Names of all queues known to the broker, sorted.
    pub fn queue_names(&self) -> Vec<String> {
        self.core.queue_names()
    }

    /// Number of messages currently held by a queue.
    pub fn message_count(&self, queue_name: &str) -> Result<usize, BrokerError> {
        self.core.message_count(queue_name)
    }

    /// Delete a queue and discard anything it holds.
    pub fn delete_queue(&self, queue_name: &str) -> Result<(), BrokerError> {
        self.core.delete_queue(queue_name)?;
        info!(queue = queue_name, "queue removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::pool::{DelayScheduler, WorkerPool};
    use crate::topology::BrokerTopology;

    fn management() -> (ManagementSession, Arc<BrokerCore>) {
        let cfg = BrokerConfig::default();
        let dir = std::env::temp_dir().join(format!("tessera-mgmt-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let core = Arc::new(BrokerCore::new(
            BrokerTopology::build(&cfg),
            WorkerPool::new("test-worker", 2),
            DelayScheduler::new("test-sched", 1),
            dir,
        ));
        (ManagementSession::new(core.clone()), core)
    }

    #[test]
    fn lists_queues_sorted() {
        let (mgmt, core) = management();
        core.create_queue("zeta", crate::DEFAULT_EVENT_ADDRESS);
        core.create_queue("alpha", crate::DEFAULT_EVENT_ADDRESS);

        assert_eq!(mgmt.queue_names(), vec!["alpha", "zeta"]);
        core.stop();
    }

    #[test]
    fn delete_unknown_queue_errors() {
        let (mgmt, core) = management();
        assert!(matches!(
            mgmt.delete_queue("missing"),
            Err(BrokerError::UnknownQueue(_))
        ));
        core.stop();
    }
}
