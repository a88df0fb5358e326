//! Embedded message broker: topology, routing, redelivery, lifecycle.
//!
//! The broker is assembled programmatically at startup by
//! [`BrokerSupervisor`] and owned by it for the life of the process.
//! Publishers and consumers interact through [`Session`]s; operators (and
//! the startup queue-cleanup pass) use the [`ManagementSession`].

pub mod address;
pub mod config;
pub mod management;
pub mod pool;
pub mod queue;
pub mod session;
pub mod supervisor;
pub mod topology;

pub use address::{
    AddressSettings, FullQueuePolicy, RedeliveryPolicy, BRIDGED_EVENT_ADDRESS,
    DEFAULT_EVENT_ADDRESS, JOB_ADDRESS,
};
pub use config::{BrokerConfig, FullQueuePolicyKind};
pub use management::ManagementSession;
pub use queue::{BrokerError, ConsumeError};
pub use session::{ConsumerHandle, Session};
pub use supervisor::BrokerSupervisor;
pub use topology::{BrokerTopology, Divert};
