//! Job status persistence boundary.
//!
//! Real persistence lives behind [`JobStatusStore`]; the in-memory
//! implementation backs tests and single-process deployments.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::status::{AsyncJobStatus, JobId, JobState};

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("no status record for job {0}")]
    NotFound(JobId),

    #[error("job {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        to: JobState,
    },

    #[error("job {0} already has a status record")]
    Duplicate(JobId),
}

/// Call boundary to wherever job status records live.
pub trait JobStatusStore: Send + Sync {
    fn insert(&self, status: AsyncJobStatus) -> Result<(), JobStoreError>;

    fn get(&self, id: JobId) -> Result<AsyncJobStatus, JobStoreError>;

    fn list(&self) -> Result<Vec<AsyncJobStatus>, JobStoreError>;

    /// `Queued -> Running`.
    fn mark_running(&self, id: JobId) -> Result<AsyncJobStatus, JobStoreError>;

    /// `Running -> Finished`, recording the handler's result.
    fn mark_finished(
        &self,
        id: JobId,
        result: serde_json::Value,
    ) -> Result<AsyncJobStatus, JobStoreError>;

    /// `Running -> Failed`, recording the failure message.
    fn mark_failed(&self, id: JobId, error: String) -> Result<AsyncJobStatus, JobStoreError>;

    /// `Queued -> Cancelled`.
    fn mark_cancelled(&self, id: JobId) -> Result<AsyncJobStatus, JobStoreError>;
}

impl<S: JobStatusStore + ?Sized> JobStatusStore for Arc<S> {
    fn insert(&self, status: AsyncJobStatus) -> Result<(), JobStoreError> {
        (**self).insert(status)
    }

    fn get(&self, id: JobId) -> Result<AsyncJobStatus, JobStoreError> {
        (**self).get(id)
    }

    fn list(&self) -> Result<Vec<AsyncJobStatus>, JobStoreError> {
        (**self).list()
    }

    fn mark_running(&self, id: JobId) -> Result<AsyncJobStatus, JobStoreError> {
        (**self).mark_running(id)
    }

    fn mark_finished(
        &self,
        id: JobId,
        result: serde_json::Value,
    ) -> Result<AsyncJobStatus, JobStoreError> {
        (**self).mark_finished(id, result)
    }

    fn mark_failed(&self, id: JobId, error: String) -> Result<AsyncJobStatus, JobStoreError> {
        (**self).mark_failed(id, error)
    }

    fn mark_cancelled(&self, id: JobId) -> Result<AsyncJobStatus, JobStoreError> {
        (**self).mark_cancelled(id)
    }
}

/// Map-backed store.
#[derive(Default)]
pub struct InMemoryJobStatusStore {
    records: RwLock<HashMap<JobId, AsyncJobStatus>>,
}

impl InMemoryJobStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition(
        &self,
        id: JobId,
        next: JobState,
        apply: impl FnOnce(&mut AsyncJobStatus),
    ) -> Result<AsyncJobStatus, JobStoreError> {
        let mut records = self.records.write().unwrap();
        let status = records.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        let from = status.state;
        status
            .transition_to(next)
            .map_err(|_| JobStoreError::InvalidTransition { id, from, to: next })?;
        apply(status);
        Ok(status.clone())
    }
}

impl JobStatusStore for InMemoryJobStatusStore {
    fn insert(&self, status: AsyncJobStatus) -> Result<(), JobStoreError> {
        let mut records = self.records.write().unwrap();
        if records.contains_key(&status.id) {
            return Err(JobStoreError::Duplicate(status.id));
        }
        records.insert(status.id, status);
        Ok(())
    }

    fn get(&self, id: JobId) -> Result<AsyncJobStatus, JobStoreError> {
        let records = self.records.read().unwrap();
        records.get(&id).cloned().ok_or(JobStoreError::NotFound(id))
    }

    fn list(&self) -> Result<Vec<AsyncJobStatus>, JobStoreError> {
        let records = self.records.read().unwrap();
        let mut statuses: Vec<AsyncJobStatus> = records.values().cloned().collect();
        statuses.sort_by_key(|s| s.id);
        Ok(statuses)
    }

    fn mark_running(&self, id: JobId) -> Result<AsyncJobStatus, JobStoreError> {
        self.transition(id, JobState::Running, |_| {})
    }

    fn mark_finished(
        &self,
        id: JobId,
        result: serde_json::Value,
    ) -> Result<AsyncJobStatus, JobStoreError> {
        self.transition(id, JobState::Finished, |s| s.result = Some(result))
    }

    fn mark_failed(&self, id: JobId, error: String) -> Result<AsyncJobStatus, JobStoreError> {
        self.transition(id, JobState::Failed, |s| s.error = Some(error))
    }

    fn mark_cancelled(&self, id: JobId) -> Result<AsyncJobStatus, JobStoreError> {
        self.transition(id, JobState::Cancelled, |_| {})
    }
}
