// Job Domain Model

use crate::domain::batch::BatchId;
use crate::domain::error::{DomainError, Result};
use crate::domain::source::SourceItem;
use serde::{Deserialize, Serialize};

/// Job ID (the job name submitted to the encoding service)
pub type JobId = String;

/// Job lifecycle state (closed set).
///
/// `Submitted -> {Queued, Scheduled} -> Processing -> {Finished, Error, Canceled}`,
/// plus `Submitted -> SubmissionFailed` when the create-job call itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Submitted,
    Queued,
    Scheduled,
    Processing,
    Finished,
    Error,
    Canceled,
    SubmissionFailed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Submitted => write!(f, "Submitted"),
            JobState::Queued => write!(f, "Queued"),
            JobState::Scheduled => write!(f, "Scheduled"),
            JobState::Processing => write!(f, "Processing"),
            JobState::Finished => write!(f, "Finished"),
            JobState::Error => write!(f, "Error"),
            JobState::Canceled => write!(f, "Canceled"),
            JobState::SubmissionFailed => write!(f, "SubmissionFailed"),
        }
    }
}

impl JobState {
    /// Map a state name reported by the encoding service.
    ///
    /// Unknown names (e.g. `Canceling`) map to `Processing`, never to a
    /// terminal state.
    pub fn from_remote(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "queued" => JobState::Queued,
            "scheduled" => JobState::Scheduled,
            "processing" => JobState::Processing,
            "finished" => JobState::Finished,
            "error" => JobState::Error,
            "canceled" | "cancelled" => JobState::Canceled,
            _ => JobState::Processing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Finished | JobState::Error | JobState::Canceled | JobState::SubmissionFailed
        )
    }

    fn rank(&self) -> u8 {
        match self {
            JobState::Submitted => 0,
            JobState::Queued => 1,
            JobState::Scheduled => 2,
            JobState::Processing => 3,
            JobState::Finished
            | JobState::Error
            | JobState::Canceled
            | JobState::SubmissionFailed => 4,
        }
    }

    /// Whether `self -> next` is a legal forward move.
    ///
    /// Intermediate states may be skipped since polling can miss them.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobState::Submitted => *self == JobState::Submitted,
            JobState::SubmissionFailed => *self == JobState::Submitted,
            _ => next.rank() >= self.rank(),
        }
    }
}

/// Handle to the output location allocated for one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    /// Asset name registered with the encoding service
    pub asset_name: String,
    /// Object store container holding the asset's artifacts
    pub container: String,
}

impl OutputRef {
    pub fn new(asset_name: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            asset_name: asset_name.into(),
            container: container.into(),
        }
    }
}

/// In-memory record of one submitted (or attempted) job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub batch_id: BatchId,
    pub source: SourceItem,
    /// `None` when output allocation itself failed
    pub output: Option<OutputRef>,
    pub state: JobState,

    pub submitted_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub progress_percent: u8,

    /// Error message for `SubmissionFailed` records
    pub failure: Option<String>,
    /// Set once the outcome tag write has been attempted
    pub outcome_tagged: bool,
}

impl JobRecord {
    /// Record for a job the encoding service accepted
    pub fn submitted(
        job_id: impl Into<String>,
        batch_id: BatchId,
        source: SourceItem,
        output: OutputRef,
        now_millis: i64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            batch_id,
            source,
            output: Some(output),
            state: JobState::Submitted,
            submitted_at: now_millis,
            started_at: None,
            ended_at: None,
            progress_percent: 0,
            failure: None,
            outcome_tagged: false,
        }
    }

    /// Record for a job whose output allocation or create-job call failed
    pub fn submission_failed(
        job_id: impl Into<String>,
        batch_id: BatchId,
        source: SourceItem,
        output: Option<OutputRef>,
        now_millis: i64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            batch_id,
            source,
            output,
            state: JobState::SubmissionFailed,
            submitted_at: now_millis,
            started_at: None,
            ended_at: Some(now_millis),
            progress_percent: 0,
            failure: Some(reason.into()),
            outcome_tagged: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `next`. Returns `Ok(true)` if the state changed, `Ok(false)`
    /// for a same-state observation.
    pub fn transition(&mut self, next: JobState) -> Result<bool> {
        if self.state == next {
            return Ok(false);
        }
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(true)
    }

    /// Apply one status observation from the encoding service.
    ///
    /// Timestamps and progress are only updated while the record is not yet
    /// terminal, so a terminal record never changes again.
    pub fn observe(
        &mut self,
        next: JobState,
        progress_percent: Option<u8>,
        started_at: Option<i64>,
        ended_at: Option<i64>,
    ) -> Result<bool> {
        let was_terminal = self.state.is_terminal();
        let changed = self.transition(next)?;
        if was_terminal {
            return Ok(false);
        }
        if let Some(progress) = progress_percent {
            self.progress_percent = progress.min(100).max(self.progress_percent);
        }
        if started_at.is_some() {
            self.started_at = started_at;
        }
        if self.state.is_terminal() && ended_at.is_some() {
            self.ended_at = ended_at;
        }
        Ok(changed)
    }
}
