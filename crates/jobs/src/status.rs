//! Job status records and their state machine.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tessera_core::{DomainError, OwnerId};

/// Identifier of one job submission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// UUIDv7, so ids sort by submission time.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("JobId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// Lifecycle state of a job.
///
/// `Queued → Running → {Finished, Failed}` and `Queued → Cancelled`. The
/// three terminal states are final; no state is ever re-entered.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Queued,
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed | JobState::Cancelled)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Running)
                | (JobState::Queued, JobState::Cancelled)
                | (JobState::Running, JobState::Finished)
                | (JobState::Running, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Queued => "QUEUED",
            JobState::Running => "RUNNING",
            JobState::Finished => "FINISHED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Persisted status of a job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncJobStatus {
    pub id: JobId,
    /// Handler kind the job was submitted for.
    pub kind: String,
    /// Owner the submission was scoped to; `None` for system-level jobs.
    pub owner_id: Option<OwnerId>,
    pub state: JobState,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AsyncJobStatus {
    pub fn queued(id: JobId, kind: impl Into<String>, owner_id: Option<OwnerId>) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: kind.into(),
            owner_id,
            state: JobState::Queued,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a state transition, rejecting anything the state machine does
    /// not allow.
    pub fn transition_to(&mut self, next: JobState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::invariant(format!(
                "job {} cannot move from {} to {next}",
                self.id, self.state
            )));
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
