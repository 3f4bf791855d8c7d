// Progress Reporter Port
// Observability channel for per-batch progress reports

use crate::domain::{BatchCounts, BatchId, JobRecord, JobState};
use chrono::DateTime;
use serde::Serialize;
use tracing::info;

/// One job row of a progress report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobProgressRow {
    pub job: String,
    pub state: JobState,
    pub progress_percent: u8,
    /// `HH:MM:SS` (UTC) or `starting`
    pub start: String,
    /// `HH:MM:SS` (UTC) or `---`
    pub end: String,
}

impl JobProgressRow {
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            job: record.job_id.clone(),
            state: record.state,
            progress_percent: record.progress_percent,
            start: format_clock(record.started_at).unwrap_or_else(|| "starting".to_string()),
            end: format_clock(record.ended_at).unwrap_or_else(|| "---".to_string()),
        }
    }
}

fn format_clock(millis: Option<i64>) -> Option<String> {
    millis
        .and_then(DateTime::from_timestamp_millis)
        .map(|t| t.format("%H:%M:%S").to_string())
}

/// Progress report emitted once per poll interval of a batch wait
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub counts: BatchCounts,
    pub rows: Vec<JobProgressRow>,
}

impl BatchReport {
    pub fn from_records(batch_id: BatchId, records: &[JobRecord]) -> Self {
        Self {
            batch_id,
            counts: BatchCounts::from_records(records),
            rows: records.iter().map(JobProgressRow::from_record).collect(),
        }
    }
}

/// Receives batch progress reports
pub trait ProgressReporter: Send + Sync {
    fn report(&self, report: &BatchReport);
}

/// Writes reports to the tracing subscriber
pub struct LogProgressReporter;

impl ProgressReporter for LogProgressReporter {
    fn report(&self, report: &BatchReport) {
        info!(
            batch_id = report.batch_id,
            batch_size = report.counts.total,
            processing = report.counts.processing,
            finished = report.counts.finished,
            error = report.counts.error,
            submission_failed = report.counts.submission_failed,
            "Encoding batch progress"
        );
        for row in &report.rows {
            info!(
                batch_id = report.batch_id,
                job = %row.job,
                state = %row.state,
                progress = row.progress_percent,
                start = %row.start,
                end = %row.end,
                "Job progress"
            );
        }
    }
}

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Keeps every report for later assertions
    #[derive(Clone, Default)]
    pub struct CollectingReporter {
        reports: Arc<Mutex<Vec<BatchReport>>>,
    }

    impl CollectingReporter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reports(&self) -> Vec<BatchReport> {
            self.reports.lock().unwrap().clone()
        }
    }

    impl ProgressReporter for CollectingReporter {
        fn report(&self, report: &BatchReport) {
            self.reports.lock().unwrap().push(report.clone());
        }
    }
}
