// Batch Domain Model

use crate::domain::job::{JobRecord, JobState};
use crate::domain::source::SourceItem;
use serde::{Deserialize, Serialize};

/// Monotonic batch counter within a run (starts at 1)
pub type BatchId = u64;

/// A bounded group of source items submitted and awaited together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub items: Vec<SourceItem>,
    pub max_size: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_size
    }
}

/// Running counts for one batch wait.
///
/// Non-terminal jobs count as processing regardless of sub-state; `error`
/// includes both `Error` and `Canceled`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub total: usize,
    pub processing: usize,
    pub finished: usize,
    pub error: usize,
    pub submission_failed: usize,
}

impl BatchCounts {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a JobRecord>) -> Self {
        let mut counts = BatchCounts::default();
        for record in records {
            counts.total += 1;
            match record.state {
                JobState::Finished => counts.finished += 1,
                JobState::Error | JobState::Canceled => counts.error += 1,
                JobState::SubmissionFailed => counts.submission_failed += 1,
                JobState::Submitted
                | JobState::Queued
                | JobState::Scheduled
                | JobState::Processing => counts.processing += 1,
            }
        }
        counts
    }

    /// True exactly when every job in the batch is terminal
    pub fn is_converged(&self) -> bool {
        self.finished + self.error + self.submission_failed == self.total
    }
}
