// Completion Poller - waits for submitted jobs to reach a terminal state
//
// Every record has exactly one writer: the pass that polls it. Passes never
// overlap, and records of a batch are polled concurrently within a pass.

use crate::application::cancel::CancelToken;
use crate::application::context::OrchestratorContext;
use crate::application::tagger::OutcomeTagger;
use crate::domain::{BatchCounts, BatchId, JobRecord, JobState, RecipeHandle};
use crate::port::{BatchReport, EncodingService, JobHandle, ProgressReporter, TimeProvider};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Result of waiting on one batch
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_id: BatchId,
    pub records: Vec<JobRecord>,
    pub counts: BatchCounts,
    /// Polling passes made, including the one that observed convergence
    pub passes: usize,
    /// The wait stopped on cancellation before the batch converged
    pub cancelled: bool,
}

pub struct CompletionPoller {
    encoding: Arc<dyn EncodingService>,
    time_provider: Arc<dyn TimeProvider>,
    reporter: Arc<dyn ProgressReporter>,
    tagger: OutcomeTagger,
    recipe: RecipeHandle,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl CompletionPoller {
    pub fn new(ctx: &OrchestratorContext, recipe: RecipeHandle) -> Self {
        Self {
            encoding: Arc::clone(&ctx.encoding),
            time_provider: Arc::clone(&ctx.time_provider),
            reporter: Arc::clone(&ctx.reporter),
            tagger: OutcomeTagger::new(ctx, &recipe.name),
            recipe,
            poll_interval: ctx.config.poll_interval,
            job_timeout: ctx.config.job_timeout,
        }
    }

    /// Wait for a single job until it is terminal or its deadline passes.
    ///
    /// The deadline is `job_timeout` after the record's submission time. A
    /// job still running at the deadline is returned in its last observed
    /// state; it is neither failed nor canceled remotely.
    pub async fn wait_for_job(&self, mut record: JobRecord, cancel: &CancelToken) -> JobRecord {
        let mut cancel = cancel.clone();
        let elapsed_ms = (self.time_provider.now_millis() - record.submitted_at).max(0) as u64;
        let deadline = Instant::now() + self.job_timeout.saturating_sub(Duration::from_millis(elapsed_ms));

        loop {
            self.poll_record(&mut record).await;
            if record.is_terminal() {
                return record;
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    job_id = %record.job_id,
                    state = %record.state,
                    timeout_secs = self.job_timeout.as_secs(),
                    "Job did not finish before its deadline"
                );
                return record;
            }

            let nap = self.poll_interval.min(deadline - now);
            tokio::select! {
                _ = sleep(nap) => {}
                _ = cancel.cancelled() => {
                    info!(job_id = %record.job_id, state = %record.state, "Wait cancelled");
                    return record;
                }
            }
        }
    }

    /// Poll every non-terminal record of a batch once per interval until all
    /// of them are terminal, then return the final states.
    ///
    /// A progress report is emitted after each pass.
    pub async fn wait_for_batch(
        &self,
        batch_id: BatchId,
        mut records: Vec<JobRecord>,
        cancel: &CancelToken,
    ) -> BatchOutcome {
        let mut cancel = cancel.clone();
        let mut passes = 0;

        loop {
            if cancel.is_cancelled() {
                return self.finish(batch_id, records, passes, true);
            }

            join_all(records.iter_mut().map(|record| self.poll_record(record))).await;
            passes += 1;

            let report = BatchReport::from_records(batch_id, &records);
            self.reporter.report(&report);

            if report.counts.is_converged() {
                return self.finish(batch_id, records, passes, false);
            }

            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => {
                    return self.finish(batch_id, records, passes, true);
                }
            }
        }
    }

    fn finish(
        &self,
        batch_id: BatchId,
        records: Vec<JobRecord>,
        passes: usize,
        cancelled: bool,
    ) -> BatchOutcome {
        let counts = BatchCounts::from_records(&records);
        if cancelled {
            warn!(
                batch_id,
                processing = counts.processing,
                "Batch wait cancelled, remote jobs keep running"
            );
        } else {
            info!(
                batch_id,
                total = counts.total,
                finished = counts.finished,
                error = counts.error,
                submission_failed = counts.submission_failed,
                passes,
                "Batch converged"
            );
        }
        BatchOutcome {
            batch_id,
            records,
            counts,
            passes,
            cancelled,
        }
    }

    /// One status fetch (skipped for terminal records), then the outcome tag
    /// once the record is terminal.
    async fn poll_record(&self, record: &mut JobRecord) {
        self.refresh(record).await;
        if record.is_terminal() && !record.outcome_tagged {
            if let Err(e) = self.tagger.tag(record).await {
                warn!(
                    job_id = %record.job_id,
                    source = %record.source.key(),
                    error = %e,
                    "Outcome tag not written; the source will be picked up again next run"
                );
            }
            record.outcome_tagged = true;
        }
    }

    async fn refresh(&self, record: &mut JobRecord) {
        if record.is_terminal() {
            return;
        }

        let handle = JobHandle::new(&self.recipe.name, &record.job_id);
        let status = match self.encoding.get_job_status(&handle).await {
            Ok(status) => status,
            Err(e) => {
                warn!(job_id = %record.job_id, error = %e, "Job status unavailable, retrying next interval");
                return;
            }
        };

        let previous = record.state;
        let next = JobState::from_remote(&status.state);
        match record.observe(next, status.progress_percent, status.started_at, status.ended_at) {
            Ok(true) => info!(
                job_id = %record.job_id,
                from = %previous,
                to = %record.state,
                progress = record.progress_percent,
                "Job state changed"
            ),
            Ok(false) => debug!(
                job_id = %record.job_id,
                state = %record.state,
                progress = record.progress_percent,
                "Job state unchanged"
            ),
            Err(e) => warn!(
                job_id = %record.job_id,
                reported = %status.state,
                error = %e,
                "Ignoring out-of-order job state"
            ),
        }

        if record.is_terminal() && record.ended_at.is_none() {
            record.ended_at = Some(self.time_provider.now_millis());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cancel::cancel_channel;
    use crate::application::config::OrchestratorConfig;
    use crate::domain::{OutputRef, SourceItem};
    use crate::port::encoding_service::mocks::{ScriptedEncodingService, StatusStep};
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::object_store::mocks::InMemoryObjectStore;
    use crate::port::progress::mocks::CollectingReporter;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    const INTERVAL: Duration = Duration::from_secs(10);

    struct Harness {
        service: ScriptedEncodingService,
        store: InMemoryObjectStore,
        reporter: CollectingReporter,
        poller: CompletionPoller,
    }

    fn harness(service: ScriptedEncodingService, timeout: Duration) -> Harness {
        let store = InMemoryObjectStore::new();
        let reporter = CollectingReporter::new();
        let config = OrchestratorConfig {
            poll_interval: INTERVAL,
            job_timeout: timeout,
            ..Default::default()
        };
        let ctx = OrchestratorContext::new(
            Arc::new(service.clone()),
            Arc::new(store.clone()),
            Arc::new(SequentialIdProvider::new()),
            Arc::new(FixedTimeProvider::new(0)),
            config,
        )
        .unwrap()
        .with_reporter(Arc::new(reporter.clone()));
        let poller = CompletionPoller::new(&ctx, RecipeHandle::new("r"));
        Harness {
            service,
            store,
            reporter,
            poller,
        }
    }

    fn uri(i: usize) -> String {
        format!("memory://media/clip-{}.mp4", i)
    }

    /// Submit `n` jobs through the scripted service and build their records
    async fn submit(h: &Harness, n: usize) -> Vec<JobRecord> {
        let mut records = Vec::new();
        for i in 0..n {
            let name = format!("clip-{}.mp4", i);
            h.store.put("media", &name, b"x");
            let output = OutputRef::new(format!("out-{}", i), format!("asset-out-{}", i));
            let job = format!("job-{}", i);
            h.service
                .submit_job(&RecipeHandle::new("r"), &job, &uri(i), &output)
                .await
                .unwrap();
            records.push(JobRecord::submitted(
                job,
                1,
                SourceItem::new(uri(i), "media", name, ".mp4", false),
                output,
                0,
            ));
        }
        records
    }

    fn progression(terminal: &str, passes: usize) -> Vec<StatusStep> {
        let mut steps = vec![StatusStep::state("Queued", 0)];
        for p in 1..passes.saturating_sub(1) {
            steps.push(StatusStep::state("Processing", (p * 10) as u8));
        }
        steps.push(StatusStep::state(terminal, 100));
        steps
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_converges_with_mixed_outcomes() {
        let mut service = ScriptedEncodingService::new();
        for i in 0..10 {
            let terminal = match i {
                0..=6 => "Finished",
                7 | 8 => "Error",
                _ => "Canceled",
            };
            service = service.with_script(uri(i), progression(terminal, 2 + i % 4));
        }
        let h = harness(service, Duration::from_secs(600));
        let records = submit(&h, 10).await;

        let started = Instant::now();
        let (_tx, cancel) = cancel_channel();
        let outcome = h.poller.wait_for_batch(1, records, &cancel).await;

        assert!(!outcome.cancelled);
        assert_eq!(outcome.counts.processing, 0);
        assert_eq!(outcome.counts.finished, 7);
        assert_eq!(outcome.counts.error, 3);
        assert!(outcome.counts.is_converged());
        // Slowest script needs five polls: four intervals of waiting
        assert_eq!(outcome.passes, 5);
        assert_eq!(started.elapsed(), INTERVAL * 4);
        assert_eq!(h.reporter.reports().len(), 5);

        // One tag per job, all on the source objects
        assert_eq!(h.store.metadata_writes().len(), 10);
        assert!(outcome.records.iter().all(|r| r.outcome_tagged));
        assert!(outcome.records.iter().all(|r| r.ended_at.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_records_are_not_polled_again() {
        let service = ScriptedEncodingService::new()
            .with_script(uri(0), vec![StatusStep::state("Finished", 100)])
            .with_script(uri(1), progression("Finished", 4));
        let h = harness(service, Duration::from_secs(600));
        let records = submit(&h, 2).await;

        let (_tx, cancel) = cancel_channel();
        let outcome = h.poller.wait_for_batch(1, records, &cancel).await;

        assert_eq!(outcome.passes, 4);
        // job 0 polled once, job 1 polled four times
        assert_eq!(h.service.status_calls(), 5);
        assert_eq!(h.store.metadata_writes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_status_failure_is_tolerated() {
        let service = ScriptedEncodingService::new().with_script(
            uri(0),
            vec![
                StatusStep::state("Processing", 40),
                StatusStep::Unavailable,
                StatusStep::state("Finished", 100),
            ],
        );
        let h = harness(service, Duration::from_secs(600));
        let records = submit(&h, 1).await;

        let (_tx, cancel) = cancel_channel();
        let outcome = h.poller.wait_for_batch(1, records, &cancel).await;

        assert_eq!(outcome.passes, 3);
        assert_eq!(outcome.records[0].state, JobState::Finished);
        let second = &h.reporter.reports()[1];
        assert_eq!(second.rows[0].state, JobState::Processing);
        assert_eq!(second.rows[0].progress_percent, 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_state_is_never_left() {
        let service = ScriptedEncodingService::new().with_script(
            uri(0),
            vec![
                StatusStep::state("Error", 100),
                StatusStep::state("Processing", 50),
            ],
        );
        let h = harness(service, Duration::from_secs(600));
        let mut records = submit(&h, 1).await;

        h.poller.poll_record(&mut records[0]).await;
        h.poller.poll_record(&mut records[0]).await;

        assert_eq!(records[0].state, JobState::Error);
        assert_eq!(h.service.status_calls(), 1);
        assert_eq!(h.store.metadata_writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_failures_are_tagged_without_polling() {
        let h = harness(ScriptedEncodingService::new(), Duration::from_secs(600));
        h.store.put("media", "bad.mp4", b"x");
        let record = JobRecord::submission_failed(
            "job-x",
            1,
            SourceItem::new("memory://media/bad.mp4", "media", "bad.mp4", ".mp4", false),
            None,
            0,
            "rejected",
        );

        let (_tx, cancel) = cancel_channel();
        let outcome = h.poller.wait_for_batch(1, vec![record], &cancel).await;

        assert_eq!(outcome.passes, 1);
        assert_eq!(outcome.counts.submission_failed, 1);
        assert_eq!(h.service.status_calls(), 0);
        let metadata = h.store.metadata("media", "bad.mp4").unwrap();
        assert_eq!(metadata["encoded"], "false");
        assert_eq!(metadata["status"], "SubmissionFailed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_job_times_out_at_deadline() {
        let service = ScriptedEncodingService::new()
            .with_default_script(vec![StatusStep::state("Processing", 10)]);
        let h = harness(service, Duration::from_secs(25));
        let mut records = submit(&h, 1).await;

        let started = Instant::now();
        let (_tx, cancel) = cancel_channel();
        let record = h.poller.wait_for_job(records.remove(0), &cancel).await;

        assert_eq!(record.state, JobState::Processing);
        assert_eq!(started.elapsed(), Duration::from_secs(25));
        // polls at 0s, 10s, 20s and the deadline
        assert_eq!(h.service.status_calls(), 4);
        assert!(!record.outcome_tagged);
        assert!(h.store.metadata_writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_job_finishes_before_deadline() {
        let service =
            ScriptedEncodingService::new().with_script(uri(0), progression("Finished", 3));
        let h = harness(service, Duration::from_secs(600));
        let mut records = submit(&h, 1).await;

        let started = Instant::now();
        let (_tx, cancel) = cancel_channel();
        let record = h.poller.wait_for_job(records.remove(0), &cancel).await;

        assert_eq!(record.state, JobState::Finished);
        assert_eq!(record.progress_percent, 100);
        assert_eq!(started.elapsed(), INTERVAL * 2);
        assert!(record.outcome_tagged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_returns_last_known_states() {
        let service = ScriptedEncodingService::new()
            .with_default_script(vec![StatusStep::state("Processing", 30)]);
        let h = harness(service, Duration::from_secs(600));
        let records = submit(&h, 3).await;

        let (tx, cancel) = cancel_channel();
        tokio::spawn(async move {
            sleep(Duration::from_secs(15)).await;
            tx.cancel();
        });

        let started = Instant::now();
        let outcome = h.poller.wait_for_batch(1, records, &cancel).await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.passes, 2);
        assert_eq!(outcome.counts.processing, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(15));
        assert!(h.store.metadata_writes().is_empty());
    }
}
