//! Run summary table

use mediabatch_core::application::{BatchSummary, RunSummary};
use mediabatch_core::domain::JobRecord;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct BatchRow {
    #[tabled(rename = "Batch")]
    batch: String,
    #[tabled(rename = "Jobs")]
    total: usize,
    #[tabled(rename = "Finished")]
    finished: usize,
    #[tabled(rename = "Error")]
    error: usize,
    #[tabled(rename = "Not submitted")]
    submission_failed: usize,
    #[tabled(rename = "Copied")]
    copied: String,
    #[tabled(rename = "Skipped")]
    skipped: String,
    #[tabled(rename = "Copy failed")]
    copy_failed: String,
}

fn count(value: Option<usize>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

impl BatchRow {
    fn from_summary(label: String, batch: &BatchSummary) -> Self {
        let relocation = batch.relocation.as_ref();
        Self {
            batch: label,
            total: batch.counts.total,
            finished: batch.counts.finished,
            error: batch.counts.error,
            submission_failed: batch.counts.submission_failed,
            copied: count(relocation.map(|r| r.copied)),
            skipped: count(relocation.map(|r| r.skipped)),
            copy_failed: count(relocation.map(|r| r.failed)),
        }
    }
}

/// One row per batch plus a totals row
pub fn render_run(summary: &RunSummary) -> String {
    let mut rows: Vec<BatchRow> = summary
        .batches
        .iter()
        .map(|batch| {
            let label = if batch.cancelled {
                format!("{} (cancelled)", batch.batch_id)
            } else {
                batch.batch_id.to_string()
            };
            BatchRow::from_summary(label, batch)
        })
        .collect();

    let totals = BatchSummary {
        batch_id: 0,
        counts: summary.totals(),
        relocation: summary.relocation_totals(),
        cancelled: summary.cancelled,
    };
    rows.push(BatchRow::from_summary("total".to_string(), &totals));

    Table::new(rows).to_string()
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "Job")]
    job: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Progress")]
    progress: String,
}

pub fn render_job(record: &JobRecord) -> String {
    Table::new(vec![JobRow {
        job: record.job_id.clone(),
        source: record.source.key().to_string(),
        state: record.state.to_string(),
        progress: format!("{}%", record.progress_percent),
    }])
    .to_string()
}
