//! Broker lifecycle supervisor.
//!
//! Owns the embedded broker: storage layout, thread pools, topology, and
//! the startup queue sweep. Everything else in the process reaches the
//! broker through sessions handed out here.

use std::collections::HashSet;
use std::fs;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::config::BrokerConfig;
use crate::management::ManagementSession;
use crate::pool::{scheduled_pool_size, worker_pool_size, DelayScheduler, WorkerPool};
use crate::queue::{BrokerCore, BrokerError};
use crate::session::Session;
use crate::topology::BrokerTopology;

/// Supervises the embedded broker's lifecycle.
pub struct BrokerSupervisor {
    config: BrokerConfig,
    core: Mutex<Option<Arc<BrokerCore>>>,
}

impl BrokerSupervisor {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            core: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.core.lock().unwrap().is_some()
    }

    /// Start the embedded broker. Idempotent: a second call on a running
    /// supervisor is a no-op.
    ///
    /// Storage directories are created up front; a failure here aborts
    /// startup since nothing can be delivered without them.
    pub fn start(&self) -> Result<(), BrokerError> {
        let mut slot = self.core.lock().unwrap();
        if slot.is_some() {
            info!("broker already started; ignoring start request");
            return Ok(());
        }

        for dir in [
            self.config.bindings_dir(),
            self.config.journal_dir(),
            self.config.large_messages_dir(),
            self.config.paging_dir(),
        ] {
            fs::create_dir_all(&dir)?;
        }

        let topology = BrokerTopology::build(&self.config);
        let pool = WorkerPool::new(
            "broker-worker",
            worker_pool_size(self.config.max_worker_threads),
        );
        let scheduler = DelayScheduler::new(
            "broker-scheduler",
            scheduled_pool_size(self.config.max_scheduled_threads),
        );

        info!(
            storage = %self.config.storage_root.display(),
            acceptors = topology.acceptors.len(),
            diverts = topology.diverts.len(),
            bridging = self.config.bridging_enabled,
            "embedded broker started"
        );

        *slot = Some(Arc::new(BrokerCore::new(
            topology,
            pool,
            scheduler,
            self.config.paging_dir(),
        )));
        Ok(())
    }

    /// Stop the broker. Never fails; problems are logged and swallowed so
    /// shutdown of the host process can proceed.
    pub fn stop(&self) {
        let mut slot = self.core.lock().unwrap();
        match slot.take() {
            Some(core) => {
                core.stop();
                info!("embedded broker stopped");
            }
            None => warn!("broker stop requested but it was not running"),
        }
    }

    /// Open a producer/consumer session.
    pub fn session(&self) -> Result<Session, BrokerError> {
        let slot = self.core.lock().unwrap();
        let core = slot.as_ref().ok_or(BrokerError::NotStarted)?;
        Ok(Session::new(core.clone()))
    }

    /// Open an administrative session.
    pub fn management_session(&self) -> Result<ManagementSession, BrokerError> {
        let slot = self.core.lock().unwrap();
        let core = slot.as_ref().ok_or(BrokerError::NotStarted)?;
        Ok(ManagementSession::new(core.clone()))
    }

    /// Remove queues no longer backed by a configured listener.
    ///
    /// Runs between broker start and listener binding. Only empty queues
    /// are removed; a queue holding messages is kept so its backlog can
    /// be drained if the listener ever comes back. Any failure is
    /// propagated and must abort startup, otherwise stale queues would
    /// silently accumulate messages forever.
    pub fn cleanup_old_queues(&self, active_queues: &[String]) -> Result<(), BrokerError> {
        let mgmt = self.management_session()?;
        let active: HashSet<&str> = active_queues.iter().map(String::as_str).collect();

        for name in mgmt.queue_names() {
            if active.contains(name.as_str()) {
                continue;
            }
            let pending = mgmt.message_count(&name)?;
            if pending == 0 {
                mgmt.delete_queue(&name)?;
                info!(queue = %name, "removed stale queue");
            } else {
                warn!(
                    queue = %name,
                    pending,
                    "stale queue kept: it still holds messages"
                );
            }
        }
        Ok(())
    }
}
