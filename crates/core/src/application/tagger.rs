// Outcome Tagger - writes the idempotency marker onto source objects

use crate::application::context::OrchestratorContext;
use crate::domain::{JobRecord, OutcomeTag, OutcomeTagKeys};
use crate::error::{AppError, Result};
use crate::port::{ObjectStore, TimeProvider};
use std::sync::Arc;
use tracing::{debug, info};

pub struct OutcomeTagger {
    store: Arc<dyn ObjectStore>,
    time_provider: Arc<dyn TimeProvider>,
    keys: OutcomeTagKeys,
    recipe_name: String,
}

impl OutcomeTagger {
    pub fn new(ctx: &OrchestratorContext, recipe_name: impl Into<String>) -> Self {
        Self {
            store: Arc::clone(&ctx.store),
            time_provider: Arc::clone(&ctx.time_provider),
            keys: ctx.config.tag_keys(),
            recipe_name: recipe_name.into(),
        }
    }

    /// Write the outcome tag for a terminal job.
    ///
    /// Existing metadata on the source object is kept; the tag keys from any
    /// earlier outcome are dropped before the new tag is written. Errors are returned to the caller, which logs them and moves
    /// on: a failed write never changes the job's state.
    ///
    /// # Errors
    /// - AppError::InvalidState if the job is not terminal (nothing is written)
    /// - AppError::Storage if the metadata write fails
    pub async fn tag(&self, record: &JobRecord) -> Result<OutcomeTag> {
        let tag = OutcomeTag::for_terminal(record.state, &self.recipe_name, self.time_provider.today())
            .ok_or_else(|| {
                AppError::InvalidState(format!(
                    "job {} is {}, outcome tags are only written for terminal jobs",
                    record.job_id, record.state
                ))
            })?;

        let source = &record.source;
        let mut metadata = match self
            .store
            .read_metadata(&source.container_name, &source.object_name)
            .await
        {
            Ok(existing) => existing,
            Err(e) => {
                debug!(source = %source.key(), error = %e, "Could not read existing metadata");
                Default::default()
            }
        };
        for key in self.keys.all() {
            metadata.remove(&key);
        }
        metadata.extend(tag.to_metadata(&self.keys));

        self.store
            .write_metadata(&source.container_name, &source.object_name, &metadata)
            .await?;

        info!(
            job_id = %record.job_id,
            source = %source.key(),
            encoded = tag.encoded,
            status = %tag.status,
            "Outcome tag written"
        );
        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::OrchestratorConfig;
    use crate::domain::{JobState, OutputRef, SourceItem};
    use crate::port::encoding_service::mocks::ScriptedEncodingService;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::object_store::mocks::InMemoryObjectStore;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::port::Metadata;

    fn tagger(store: &InMemoryObjectStore, prefix: &str) -> OutcomeTagger {
        let config = OrchestratorConfig {
            tag_key_prefix: prefix.to_string(),
            ..Default::default()
        };
        let ctx = OrchestratorContext::new(
            Arc::new(ScriptedEncodingService::new()),
            Arc::new(store.clone()),
            Arc::new(SequentialIdProvider::new()),
            // 2024-03-07T12:00:00Z
            Arc::new(FixedTimeProvider::new(1_709_812_800_000)),
            config,
        )
        .unwrap();
        OutcomeTagger::new(&ctx, "H264Recipe")
    }

    fn record(state: JobState) -> JobRecord {
        let mut record = JobRecord::submitted(
            "job-1",
            1,
            SourceItem::new("memory://media/a.mp4", "media", "a.mp4", ".mp4", false),
            OutputRef::new("out-1", "asset-out-1"),
            0,
        );
        record.state = state;
        record
    }

    #[tokio::test]
    async fn test_finished_tag_merges_existing_metadata() {
        let store = InMemoryObjectStore::new();
        let mut existing = Metadata::new();
        existing.insert("owner".to_string(), "studio".to_string());
        store.put_with_metadata("media", "a.mp4", b"a", existing);

        let tag = tagger(&store, "").tag(&record(JobState::Finished)).await.unwrap();
        assert!(tag.encoded);

        let metadata = store.metadata("media", "a.mp4").unwrap();
        assert_eq!(metadata["owner"], "studio");
        assert_eq!(metadata["encoded"], "true");
        assert_eq!(metadata["status"], "Finished");
        assert_eq!(metadata["encoded_date"], "03/07/2024");
        assert_eq!(metadata["transform"], "H264Recipe");
    }

    #[tokio::test]
    async fn test_error_tag_with_prefix() {
        let store = InMemoryObjectStore::new();
        store.put("media", "a.mp4", b"a");

        tagger(&store, "ams_").tag(&record(JobState::Canceled)).await.unwrap();

        let metadata = store.metadata("media", "a.mp4").unwrap();
        assert_eq!(metadata["ams_encoded"], "false");
        assert_eq!(metadata["ams_status"], "Canceled");
        assert!(!metadata.contains_key("ams_transform"));
    }

    #[tokio::test]
    async fn test_failure_clears_earlier_success_keys() {
        let store = InMemoryObjectStore::new();
        store.put("media", "a.mp4", b"a");
        let tagger = tagger(&store, "");
        tagger.tag(&record(JobState::Finished)).await.unwrap();

        tagger.tag(&record(JobState::Error)).await.unwrap();

        let metadata = store.metadata("media", "a.mp4").unwrap();
        assert_eq!(metadata["encoded"], "false");
        assert_eq!(metadata["status"], "Error");
        assert!(!metadata.contains_key("encoded_date"));
        assert!(!metadata.contains_key("transform"));
        let keys = OutcomeTagKeys::default();
        assert_eq!(OutcomeTag::from_metadata(&keys, &metadata).unwrap().recipe_name, None);
    }

    #[tokio::test]
    async fn test_refuses_non_terminal_job() {
        let store = InMemoryObjectStore::new();
        store.put("media", "a.mp4", b"a");

        let err = tagger(&store, "")
            .tag(&record(JobState::Processing))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(store.metadata_writes().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_returned() {
        let store = InMemoryObjectStore::new();
        store.put("media", "a.mp4", b"a");
        store.fail_metadata_writes_for("media", "a.mp4");

        let err = tagger(&store, "")
            .tag(&record(JobState::Finished))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
    }
}
