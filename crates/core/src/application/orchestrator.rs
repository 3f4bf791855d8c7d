// Orchestrator - drives a run from discovery to relocation
//
// Scanner -> BatchBuilder -> JobSubmitter -> CompletionPoller (-> OutcomeTagger)
//         -> OutputRelocator
//
// Batches run strictly one after another: batch N+1 is submitted only after
// every job of batch N is terminal, which bounds in-flight jobs by the batch
// size.

use crate::application::batch_builder::BatchBuilder;
use crate::application::cancel::CancelToken;
use crate::application::context::OrchestratorContext;
use crate::application::poller::CompletionPoller;
use crate::application::relocator::{OutputRelocator, RelocationReport};
use crate::application::scanner::SourceScanner;
use crate::application::submitter::{JobSubmitter, JobTable};
use crate::domain::outcome::is_processed;
use crate::domain::source::match_extension;
use crate::domain::{Batch, BatchCounts, BatchId, JobRecord, RecipeHandle, SourceItem};
use crate::error::{AppError, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Outcome of one batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub counts: BatchCounts,
    pub relocation: Option<RelocationReport>,
    pub cancelled: bool,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub recipe: String,
    pub batches: Vec<BatchSummary>,
    pub cancelled: bool,
}

impl RunSummary {
    /// Counts summed over every batch
    pub fn totals(&self) -> BatchCounts {
        self.batches
            .iter()
            .fold(BatchCounts::default(), |mut acc, batch| {
                acc.total += batch.counts.total;
                acc.processing += batch.counts.processing;
                acc.finished += batch.counts.finished;
                acc.error += batch.counts.error;
                acc.submission_failed += batch.counts.submission_failed;
                acc
            })
    }

    /// Relocation counts summed over every batch, if relocation ran at all
    pub fn relocation_totals(&self) -> Option<RelocationReport> {
        self.batches
            .iter()
            .filter_map(|batch| batch.relocation.as_ref())
            .fold(None, |acc: Option<RelocationReport>, report| {
                let mut acc = acc.unwrap_or_default();
                acc.merge(report);
                Some(acc)
            })
    }
}

/// Run-level components, built once per run around the registered recipe
struct Stages {
    submitter: JobSubmitter,
    poller: CompletionPoller,
    relocator: Option<OutputRelocator>,
}

pub struct Orchestrator {
    ctx: OrchestratorContext,
}

impl Orchestrator {
    pub fn new(ctx: OrchestratorContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &OrchestratorContext {
        &self.ctx
    }

    /// Create or update the configured recipe.
    ///
    /// On failure the run continues against an already-registered recipe of
    /// the same name; if none exists, submissions fail item by item.
    pub async fn register_recipe(&self) -> RecipeHandle {
        let recipe = &self.ctx.config.recipe;
        match self.ctx.encoding.register_recipe(recipe).await {
            Ok(handle) => {
                info!(recipe = %handle.name, "Recipe registered");
                handle
            }
            Err(e) => {
                warn!(
                    recipe = %recipe.name,
                    error = %e,
                    "Recipe registration failed, using the existing recipe of that name"
                );
                RecipeHandle::new(&recipe.name)
            }
        }
    }

    fn stages(&self, recipe: &RecipeHandle) -> Stages {
        Stages {
            submitter: JobSubmitter::new(&self.ctx, recipe.clone()),
            poller: CompletionPoller::new(&self.ctx, recipe.clone()),
            relocator: self
                .ctx
                .config
                .relocation
                .clone()
                .map(|config| OutputRelocator::new(&self.ctx, config)),
        }
    }

    /// Process every unprocessed source object, one batch at a time.
    ///
    /// # Errors
    /// Only when the source store root cannot be enumerated. Every per-item
    /// failure is recorded in the summary instead.
    pub async fn run(&self, cancel: &CancelToken) -> Result<RunSummary> {
        let recipe = self.register_recipe().await;
        let stages = self.stages(&recipe);
        let scanner = SourceScanner::new(&self.ctx);

        let mut summary = RunSummary {
            recipe: recipe.name.clone(),
            ..Default::default()
        };
        let mut table = JobTable::new();
        let mut builder = BatchBuilder::new(self.ctx.config.batch_size);

        let mut candidates = scanner.scan().await.map_err(|e| {
            error!(error = %e, "Cannot enumerate the source store");
            e
        })?;

        while let Some(item) = candidates.next().await {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if let Some(batch) = builder.push(item) {
                let batch_summary = self.process_batch(&stages, &mut table, batch, cancel).await;
                summary.cancelled = batch_summary.cancelled;
                summary.batches.push(batch_summary);
                if summary.cancelled {
                    break;
                }
            }
        }

        if !summary.cancelled {
            if let Some(batch) = builder.finish() {
                let batch_summary = self.process_batch(&stages, &mut table, batch, cancel).await;
                summary.cancelled = batch_summary.cancelled;
                summary.batches.push(batch_summary);
            }
        }

        let totals = summary.totals();
        info!(
            batches = summary.batches.len(),
            jobs = table.len(),
            finished = totals.finished,
            error = totals.error,
            submission_failed = totals.submission_failed,
            cancelled = summary.cancelled,
            "Run complete"
        );
        Ok(summary)
    }

    async fn process_batch(
        &self,
        stages: &Stages,
        table: &mut JobTable,
        batch: Batch,
        cancel: &CancelToken,
    ) -> BatchSummary {
        let records = stages.submitter.submit_batch(table, &batch).await;
        let outcome = stages.poller.wait_for_batch(batch.id, records, cancel).await;
        for record in &outcome.records {
            table.update(record.clone());
        }

        let relocation = match &stages.relocator {
            Some(relocator) if !outcome.cancelled => Some(relocator.relocate(&outcome.records).await),
            _ => None,
        };

        BatchSummary {
            batch_id: batch.id,
            counts: outcome.counts,
            relocation,
            cancelled: outcome.cancelled,
        }
    }

    /// Build the source item for one named object.
    ///
    /// # Errors
    /// - AppError::Storage if the object does not exist
    /// - AppError::Validation if its extension is not allow-listed
    pub async fn locate(&self, container: &str, object: &str) -> Result<SourceItem> {
        let metadata = self.ctx.store.read_metadata(container, object).await?;
        let extension = match_extension(object, &self.ctx.config.extensions).ok_or_else(|| {
            AppError::Validation(format!(
                "{}/{} does not match any configured extension",
                container, object
            ))
        })?;

        Ok(SourceItem::new(
            self.ctx.store.object_url(container, object),
            container,
            object,
            extension.to_ascii_lowercase(),
            is_processed(&self.ctx.config.tag_keys(), &metadata),
        ))
    }

    /// Submit one item and wait for it with the per-job deadline.
    ///
    /// The outcome tag is written only if the job reached a terminal state
    /// before the deadline. Relocation runs for a finished job when enabled.
    pub async fn process_item(&self, item: &SourceItem, cancel: &CancelToken) -> Result<JobRecord> {
        if item.already_processed {
            warn!(source = %item.key(), "Source already carries a success tag, encoding again");
        }

        let recipe = self.register_recipe().await;
        let stages = self.stages(&recipe);
        let mut table = JobTable::new();

        let record = stages.submitter.submit_item(&mut table, 1, item).await;
        let record = stages.poller.wait_for_job(record, cancel).await;

        if let Some(relocator) = &stages.relocator {
            relocator.relocate(std::slice::from_ref(&record)).await;
        }

        info!(
            job_id = %record.job_id,
            source = %item.key(),
            state = %record.state,
            "Item processed"
        );
        Ok(record)
    }
}
