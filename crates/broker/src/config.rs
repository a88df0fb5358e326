//! Broker configuration surface.
//!
//! Loading (files, env) is the host process's concern; this is the typed
//! representation the supervisor builds its topology from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::{FullQueuePolicy, RedeliveryPolicy};

/// Sentinel meaning "use the broker's built-in default".
pub const UNBOUNDED: i32 = -1;

/// Full-queue policy selector; sizes come from the surrounding config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FullQueuePolicyKind {
    Page,
    Block,
}

/// Configuration for the embedded broker and its topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Root under which bindings/journal/large-message/paging directories
    /// are derived.
    pub storage_root: PathBuf,

    /// Max worker pool size; -1 = built-in default.
    pub max_worker_threads: i32,
    /// Max scheduled (delayed redelivery) pool size; -1 = built-in default.
    pub max_scheduled_threads: i32,

    /// Messages up to this size may hit the journal, so the journal buffer
    /// is sized to at least this many bytes.
    pub large_message_size: usize,

    /// Network acceptor/connector binding for inter-node calls.
    pub acceptor_host: String,
    pub acceptor_port: u16,

    /// Multicast group for cluster broadcast/discovery.
    pub cluster_group_address: String,
    pub cluster_group_port: u16,

    pub full_queue_policy: FullQueuePolicyKind,
    pub max_queue_size_bytes: usize,
    pub max_page_size_bytes: usize,

    pub redelivery_delay: Duration,
    pub max_redelivery_delay: Duration,
    pub redelivery_multiplier: u32,
    pub max_delivery_attempts: u32,

    /// Gates divert creation and the bridged address's zero-delay policy.
    pub bridging_enabled: bool,

    /// Identifiers of event listeners to bind at startup.
    pub event_listeners: Vec<String>,
    /// Identifiers of allowed job listeners to bind at startup.
    pub job_listeners: Vec<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("/var/lib/tessera/broker"),
            max_worker_threads: UNBOUNDED,
            max_scheduled_threads: UNBOUNDED,
            large_message_size: 100 * 1024,
            acceptor_host: "localhost".to_string(),
            acceptor_port: 61617,
            cluster_group_address: "231.7.7.7".to_string(),
            cluster_group_port: 9876,
            full_queue_policy: FullQueuePolicyKind::Page,
            max_queue_size_bytes: 10 * 1024 * 1024,
            max_page_size_bytes: 1024 * 1024,
            redelivery_delay: Duration::from_secs(30),
            max_redelivery_delay: Duration::from_secs(3600),
            redelivery_multiplier: 2,
            max_delivery_attempts: 6,
            bridging_enabled: false,
            event_listeners: Vec::new(),
            job_listeners: Vec::new(),
        }
    }
}

impl BrokerConfig {
    pub fn bindings_dir(&self) -> PathBuf {
        self.storage_root.join("bindings")
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.storage_root.join("journal")
    }

    pub fn large_messages_dir(&self) -> PathBuf {
        self.storage_root.join("largemsgs")
    }

    pub fn paging_dir(&self) -> PathBuf {
        self.storage_root.join("paging")
    }

    /// Journal buffer must fit the largest message we accept.
    pub fn journal_buffer_size(&self) -> usize {
        self.large_message_size
    }

    /// Full-queue policy applied to every address.
    pub fn full_queue(&self) -> FullQueuePolicy {
        match self.full_queue_policy {
            FullQueuePolicyKind::Page => FullQueuePolicy::Page {
                max_size_bytes: self.max_queue_size_bytes,
                max_page_bytes: self.max_page_size_bytes,
            },
            FullQueuePolicyKind::Block => FullQueuePolicy::Block {
                max_size_bytes: self.max_queue_size_bytes,
            },
        }
    }

    /// Standard exponential-backoff redelivery built from config values.
    pub fn standard_redelivery(&self) -> RedeliveryPolicy {
        RedeliveryPolicy::backoff(
            self.redelivery_delay,
            self.max_redelivery_delay,
            self.redelivery_multiplier,
            self.max_delivery_attempts,
        )
    }

    pub fn with_storage_root(mut self, root: impl AsRef<Path>) -> Self {
        self.storage_root = root.as_ref().to_path_buf();
        self
    }

    pub fn with_bridging(mut self, enabled: bool) -> Self {
        self.bridging_enabled = enabled;
        self
    }
}
