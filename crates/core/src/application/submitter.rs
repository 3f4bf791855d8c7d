// Job Submitter - one create-job call per source item per run

use crate::application::constants::{JOB_NAME_PREFIX, OUTPUT_ASSET_PREFIX};
use crate::application::context::OrchestratorContext;
use crate::domain::{Batch, BatchId, JobRecord, RecipeHandle, SourceItem, SourceKey};
use crate::port::{EncodingService, IdProvider, TimeProvider};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// JobRecord table of one run, keyed by source identity
#[derive(Debug, Default)]
pub struct JobTable {
    records: HashMap<SourceKey, JobRecord>,
    order: Vec<SourceKey>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &SourceKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn get(&self, key: &SourceKey) -> Option<&JobRecord> {
        self.records.get(key)
    }

    /// Store the latest copy of a record created by the submitter
    pub fn update(&mut self, record: JobRecord) {
        let key = record.source.key();
        if !self.records.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.records.insert(key, record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in submission order
    pub fn records(&self) -> impl Iterator<Item = &JobRecord> {
        self.order.iter().filter_map(|key| self.records.get(key))
    }
}

pub struct JobSubmitter {
    encoding: Arc<dyn EncodingService>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    recipe: RecipeHandle,
}

impl JobSubmitter {
    pub fn new(ctx: &OrchestratorContext, recipe: RecipeHandle) -> Self {
        Self {
            encoding: Arc::clone(&ctx.encoding),
            id_provider: Arc::clone(&ctx.id_provider),
            time_provider: Arc::clone(&ctx.time_provider),
            recipe,
        }
    }

    pub fn recipe(&self) -> &RecipeHandle {
        &self.recipe
    }

    /// Submit every item of a batch sequentially, in batch order.
    ///
    /// Always returns one record per item; failed submissions come back as
    /// terminal `SubmissionFailed` records. Batch items must be new to
    /// `table` (the scanner yields each source once per run), otherwise the
    /// earlier record would be reported under its old batch id.
    pub async fn submit_batch(&self, table: &mut JobTable, batch: &Batch) -> Vec<JobRecord> {
        debug_assert!(
            batch.items.iter().all(|item| table.get(&item.key()).is_none()),
            "batch {} contains sources already submitted in this run",
            batch.id
        );
        info!(batch_id = batch.id, size = batch.len(), "Submitting batch");
        let mut records = Vec::with_capacity(batch.len());
        for item in &batch.items {
            records.push(self.submit_item(table, batch.id, item).await);
        }
        records
    }

    /// Allocate an output and submit one job for `item`.
    ///
    /// If `item` already has a record in this run, that record is returned
    /// and no remote call is made.
    pub async fn submit_item(
        &self,
        table: &mut JobTable,
        batch_id: BatchId,
        item: &SourceItem,
    ) -> JobRecord {
        let key = item.key();
        if let Some(existing) = table.get(&key) {
            warn!(
                source = %key,
                job_id = %existing.job_id,
                "Source already submitted in this run, not submitting again"
            );
            return existing.clone();
        }

        let suffix = self.id_provider.generate_id();
        let job_name = format!("{}-{}", JOB_NAME_PREFIX, suffix);
        let asset_name = format!("{}-{}", OUTPUT_ASSET_PREFIX, suffix);

        let record = match self.encoding.create_output(&asset_name).await {
            Err(e) => {
                error!(source = %key, asset = %asset_name, error = %e, "Output allocation failed");
                JobRecord::submission_failed(
                    job_name,
                    batch_id,
                    item.clone(),
                    None,
                    self.time_provider.now_millis(),
                    e.to_string(),
                )
            }
            Ok(output) => {
                match self
                    .encoding
                    .submit_job(&self.recipe, &job_name, &item.uri, &output)
                    .await
                {
                    Ok(handle) => {
                        info!(
                            batch_id,
                            job_id = %handle.job_name,
                            source = %key,
                            output = %output.asset_name,
                            "Job submitted"
                        );
                        JobRecord::submitted(
                            handle.job_name,
                            batch_id,
                            item.clone(),
                            output,
                            self.time_provider.now_millis(),
                        )
                    }
                    Err(e) => {
                        error!(batch_id, job_id = %job_name, source = %key, error = %e, "Job submission failed");
                        JobRecord::submission_failed(
                            job_name,
                            batch_id,
                            item.clone(),
                            Some(output),
                            self.time_provider.now_millis(),
                            e.to_string(),
                        )
                    }
                }
            }
        };

        table.update(record.clone());
        record
    }
}
