//! Asynchronous job dispatch over the embedded broker.
//!
//! Submissions are validated, persisted as [`AsyncJobStatus`] records, and
//! serialized onto the job address; execution happens wherever a job
//! listener is bound, which may be another node. Retry is driven entirely
//! by the broker's redelivery policy.

pub mod dispatch;
pub mod handler;
pub mod status;
pub mod store;

pub use dispatch::{DispatchError, JobConfig, JobDispatcher, JobMessage};
pub use handler::{HandlerError, JobHandler, JobHandlerRegistry};
pub use status::{AsyncJobStatus, JobId, JobState};
pub use store::{InMemoryJobStatusStore, JobStatusStore, JobStoreError};
