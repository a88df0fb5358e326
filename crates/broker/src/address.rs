//! Address-level policy: redelivery and full-queue behavior.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Address every domain event is published to.
pub const DEFAULT_EVENT_ADDRESS: &str = "event.default";

/// Secondary address feeding the bridged/legacy integration. Fed by a
/// divert from [`DEFAULT_EVENT_ADDRESS`]; publishers never send here.
pub const BRIDGED_EVENT_ADDRESS: &str = "event.bridged";

/// Address async job submissions are serialized onto.
pub const JOB_ADDRESS: &str = "job.async";

/// Redelivery policy for a single address.
///
/// No address is configured with a dead-letter target: once attempts are
/// exhausted the message stays in its queue rather than being discarded or
/// relocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeliveryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    pub max_attempts: u32,
}

impl RedeliveryPolicy {
    /// Exponential backoff policy.
    pub fn backoff(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            max_attempts,
        }
    }

    /// Fail-fast policy for bridged addresses: zero delay, a single
    /// delivery attempt, so a failed delivery goes straight back to the
    /// head of the queue and per-integration ordering is preserved.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1,
            max_attempts: 1,
        }
    }

    /// Delay before delivery attempt `attempt` (1-indexed; attempt 1 is the
    /// first delivery and carries no delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let factor = u64::from(self.multiplier).saturating_pow(attempt - 2);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms).min(self.max_delay)
    }

    pub fn attempts_exhausted(&self, delivery_count: u32) -> bool {
        delivery_count >= self.max_attempts
    }
}

/// What to do when an address holds more bytes than its configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullQueuePolicy {
    /// Spill message bodies over the threshold to page files on disk.
    Page {
        max_size_bytes: usize,
        max_page_bytes: usize,
    },
    /// Block the producer until the queue drains below the threshold.
    Block { max_size_bytes: usize },
}

impl FullQueuePolicy {
    pub fn max_size_bytes(&self) -> usize {
        match self {
            FullQueuePolicy::Page { max_size_bytes, .. } => *max_size_bytes,
            FullQueuePolicy::Block { max_size_bytes } => *max_size_bytes,
        }
    }
}

/// Per-address configuration. Every address has exactly one redelivery
/// policy and one full-queue policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSettings {
    pub redelivery: RedeliveryPolicy,
    pub full_queue: FullQueuePolicy,
    /// Marks the address as the target of cross-bus bridging.
    pub bridged: bool,
}
