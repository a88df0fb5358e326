//! The job dispatcher: submission, listener binding, cancellation, and
//! principal-scoped status queries.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use tessera_auth::{Access, Principal, ResourceRef, SubResource};
use tessera_broker::{BrokerError, ConsumeError, ConsumerHandle, Session, JOB_ADDRESS};
use tessera_core::OwnerId;

use crate::handler::{JobHandler, JobHandlerRegistry};
use crate::status::{AsyncJobStatus, JobId, JobState};
use crate::store::{JobStatusStore, JobStoreError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid job submission: {0}")]
    Validation(String),

    #[error("no handler registered for job kind '{0}'")]
    UnknownHandler(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error("failed to serialize job message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A job submission.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub kind: String,
    pub owner_id: Option<OwnerId>,
    pub payload: serde_json::Value,
}

impl JobConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            owner_id: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_owner(mut self, owner_id: OwnerId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Envelope carried on the job address. The status record holds everything
/// else; the message only carries what execution needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
    pub kind: String,
    pub payload: serde_json::Value,
}

/// Dispatches jobs onto the broker and owns the job listener bindings.
pub struct JobDispatcher {
    session: Session,
    store: Arc<dyn JobStatusStore>,
    registry: Arc<JobHandlerRegistry>,
    handles: Mutex<Vec<ConsumerHandle>>,
}

impl JobDispatcher {
    pub fn new(
        session: Session,
        store: Arc<dyn JobStatusStore>,
        registry: Arc<JobHandlerRegistry>,
    ) -> Self {
        Self {
            session,
            store,
            registry,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Queue a listener's messages arrive on, derived from the job kind.
    pub fn queue_name(kind: &str) -> String {
        format!("job.{kind}")
    }

    /// Validate, persist a `Queued` status, and enqueue the job message.
    /// Returns as soon as the message is accepted by the broker; execution
    /// happens asynchronously wherever a listener is bound.
    pub fn queue_job(&self, config: JobConfig) -> Result<AsyncJobStatus, DispatchError> {
        if config.kind.trim().is_empty() {
            return Err(DispatchError::Validation("job kind is empty".to_string()));
        }
        if !self.registry.knows(&config.kind) {
            return Err(DispatchError::UnknownHandler(config.kind));
        }

        let status = AsyncJobStatus::queued(JobId::new(), &config.kind, config.owner_id);
        self.store.insert(status.clone())?;

        let message = JobMessage {
            job_id: status.id,
            kind: config.kind,
            payload: config.payload,
        };
        let bytes = serde_json::to_vec(&message)?;
        self.session.send(JOB_ADDRESS, &bytes)?;

        info!(job_id = %status.id, kind = %status.kind, "job queued");
        Ok(status)
    }

    /// Bind a listener for one job kind. Unknown kinds and binding
    /// failures are logged and skipped; dispatcher startup continues.
    pub fn register_listener(&self, kind: &str) {
        let Some(handler) = self.registry.resolve(kind) else {
            warn!(kind, "unknown job handler kind; skipping listener");
            return;
        };

        let consumer = job_consumer(self.store.clone(), handler);
        match self
            .session
            .create_consumer(&Self::queue_name(kind), JOB_ADDRESS, consumer)
        {
            Ok(handle) => {
                info!(kind, "job listener bound");
                self.handles.lock().unwrap().push(handle);
            }
            Err(e) => {
                error!(kind, error = %e, "failed to bind job listener; skipping");
            }
        }
    }

    /// Cancel a job that has not started. Anything past `Queued` is
    /// rejected by the store's state machine.
    pub fn cancel(&self, job_id: JobId) -> Result<AsyncJobStatus, DispatchError> {
        let status = self.store.mark_cancelled(job_id)?;
        info!(job_id = %job_id, "job cancelled");
        Ok(status)
    }

    /// Status of one job, as visible to `principal`. Records outside the
    /// principal's owner scope read as absent rather than forbidden.
    pub fn find_status(
        &self,
        principal: &Principal,
        job_id: JobId,
    ) -> Result<Option<AsyncJobStatus>, DispatchError> {
        match self.store.get(job_id) {
            Ok(status) if visible_to(principal, &status) => Ok(Some(status)),
            Ok(_) => Ok(None),
            Err(JobStoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All status records visible to `principal`.
    pub fn list_statuses(
        &self,
        principal: &Principal,
    ) -> Result<Vec<AsyncJobStatus>, DispatchError> {
        let mut statuses = self.store.list()?;
        statuses.retain(|s| visible_to(principal, s));
        Ok(statuses)
    }

    /// Release all listener bindings.
    pub fn shut_down(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        let released = handles.len();
        drop(handles);
        info!(released, "job dispatcher shut down");
    }
}

fn visible_to(principal: &Principal, status: &AsyncJobStatus) -> bool {
    principal.can_access(
        &ResourceRef::JobStatus {
            owner_id: status.owner_id,
        },
        SubResource::Jobs,
        Access::ReadOnly,
    )
}

/// Consumer bound per listener. Every listener queue receives a copy of
/// every job message; a listener executes only its own kind and silently
/// acknowledges the rest.
fn job_consumer(
    store: Arc<dyn JobStatusStore>,
    handler: Arc<dyn JobHandler>,
) -> impl Fn(&[u8]) -> Result<(), ConsumeError> + Send + Sync + 'static {
    move |bytes: &[u8]| {
        let message: JobMessage = serde_json::from_slice(bytes)
            .map_err(|e| ConsumeError::failed(format!("undecodable job message: {e}")))?;
        if message.kind != handler.kind() {
            return Ok(());
        }

        let current = store
            .get(message.job_id)
            .map_err(|e| ConsumeError::failed(e.to_string()))?;
        if current.state == JobState::Cancelled {
            debug!(job_id = %message.job_id, "skipping cancelled job");
            return Ok(());
        }

        match store.mark_running(message.job_id) {
            Ok(_) => {}
            Err(JobStoreError::InvalidTransition { .. }) => {
                // Redelivery after the record already went terminal. The
                // record is not reset; execution proceeds anyway.
                warn!(
                    job_id = %message.job_id,
                    state = %current.state,
                    "re-executing redelivered job; terminal status record kept"
                );
            }
            Err(e) => return Err(ConsumeError::failed(e.to_string())),
        }

        match handler.execute(&message.payload) {
            Ok(result) => {
                if let Err(e) = store.mark_finished(message.job_id, result) {
                    debug!(job_id = %message.job_id, error = %e, "result not recorded");
                }
                Ok(())
            }
            Err(e) => {
                if let Err(se) = store.mark_failed(message.job_id, e.to_string()) {
                    debug!(job_id = %message.job_id, error = %se, "failure not recorded");
                }
                // Hand the failure back so the address redelivery policy
                // drives any retry; the dispatcher keeps no counter.
                Err(ConsumeError::failed(e.to_string()))
            }
        }
    }
}
