// Output Relocator - copies finished outputs to their final destination

use crate::application::config::RelocationConfig;
use crate::application::context::OrchestratorContext;
use crate::domain::{JobRecord, JobState, SourceItem};
use crate::port::{ObjectRef, ObjectStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Artifact counts of one relocation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationReport {
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub deleted: usize,
}

impl RelocationReport {
    pub fn merge(&mut self, other: &RelocationReport) {
        self.copied += other.copied;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.deleted += other.deleted;
    }
}

pub struct OutputRelocator {
    store: Arc<dyn ObjectStore>,
    config: RelocationConfig,
}

impl OutputRelocator {
    pub fn new(ctx: &OrchestratorContext, config: RelocationConfig) -> Self {
        Self {
            store: Arc::clone(&ctx.store),
            config,
        }
    }

    /// Copy the output artifacts of every `Finished` record.
    ///
    /// Records in any other state are ignored and no record is modified.
    /// Per-artifact failures are counted and logged, never propagated.
    pub async fn relocate(&self, records: &[JobRecord]) -> RelocationReport {
        let mut report = RelocationReport::default();

        for record in records.iter().filter(|r| r.state == JobState::Finished) {
            let Some(output) = &record.output else {
                continue;
            };

            let artifacts = match self.store.list_objects(&output.container).await {
                Ok(artifacts) => artifacts,
                Err(e) => {
                    warn!(
                        job_id = %record.job_id,
                        container = %output.container,
                        error = %e,
                        "Cannot list output artifacts"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            for artifact in artifacts {
                if self.is_excluded(&artifact.name) {
                    debug!(artifact = %artifact.name, "Excluded from relocation");
                    report.skipped += 1;
                    continue;
                }

                let src = ObjectRef::new(&output.container, &artifact.name);
                let dest = ObjectRef::new(
                    &self.config.destination_container,
                    self.destination_name(&record.source, &artifact.name),
                );

                if let Err(e) = self.store.copy_object(&src, &dest).await {
                    warn!(job_id = %record.job_id, src = %src, dest = %dest, error = %e, "Copy failed");
                    report.failed += 1;
                    continue;
                }
                debug!(src = %src, dest = %dest, "Artifact copied");
                report.copied += 1;

                if self.config.delete_after_copy {
                    match self.store.delete_object(&src).await {
                        Ok(()) => report.deleted += 1,
                        Err(e) => warn!(src = %src, error = %e, "Copied artifact not deleted"),
                    }
                }
            }
        }

        info!(
            copied = report.copied,
            skipped = report.skipped,
            failed = report.failed,
            destination = %self.config.destination_container,
            "Relocation complete"
        );
        report
    }

    fn is_excluded(&self, artifact: &str) -> bool {
        let lower = artifact.to_ascii_lowercase();
        self.config
            .no_copy_suffixes
            .iter()
            .any(|suffix| lower.ends_with(&suffix.to_ascii_lowercase()))
    }

    /// Destination object name for one artifact of `source`'s output:
    /// `[prefix/][container/][parent/]artifact`
    pub fn destination_name(&self, source: &SourceItem, artifact: &str) -> String {
        let mut segments: Vec<&str> = Vec::with_capacity(4);
        segments.push(self.config.destination_prefix.trim_matches('/'));
        if self.config.preserve_hierarchy {
            if self.config.include_container_path {
                segments.push(&source.container_name);
            }
            segments.push(source.parent_path());
        }
        segments.push(artifact);

        segments
            .into_iter()
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::OrchestratorConfig;
    use crate::domain::OutputRef;
    use crate::port::encoding_service::mocks::ScriptedEncodingService;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::object_store::mocks::InMemoryObjectStore;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    fn relocator(store: &InMemoryObjectStore, config: RelocationConfig) -> OutputRelocator {
        let ctx = OrchestratorContext::new(
            Arc::new(ScriptedEncodingService::new()),
            Arc::new(store.clone()),
            Arc::new(SequentialIdProvider::new()),
            Arc::new(FixedTimeProvider::new(0)),
            OrchestratorConfig::default(),
        )
        .unwrap();
        OutputRelocator::new(&ctx, config)
    }

    fn finished(object: &str, asset: &str) -> JobRecord {
        let mut record = JobRecord::submitted(
            "job-1",
            1,
            SourceItem::new(format!("memory://media/{}", object), "media", object, ".mp4", false),
            OutputRef::new("out", asset),
            0,
        );
        record.state = JobState::Finished;
        record
    }

    fn seed_asset(store: &InMemoryObjectStore, asset: &str) {
        store.put(asset, "clip_1280x720.mp4", b"v");
        store.put(asset, "clip.ism", b"m");
        store.put(asset, "clip_metadata.json", b"{}");
    }

    #[test]
    fn test_destination_name_variants() {
        let store = InMemoryObjectStore::new();
        let item = SourceItem::new("memory://media/2024/a.mp4", "media", "2024/a.mp4", ".mp4", false);

        let mut config = RelocationConfig::new("final");
        assert_eq!(
            relocator(&store, config.clone()).destination_name(&item, "a_720.mp4"),
            "media/2024/a_720.mp4"
        );

        config.include_container_path = false;
        config.destination_prefix = "/encoded/".to_string();
        assert_eq!(
            relocator(&store, config.clone()).destination_name(&item, "a_720.mp4"),
            "encoded/2024/a_720.mp4"
        );

        config.preserve_hierarchy = false;
        config.destination_prefix.clear();
        assert_eq!(
            relocator(&store, config).destination_name(&item, "a_720.mp4"),
            "a_720.mp4"
        );
    }

    #[tokio::test]
    async fn test_copies_finished_outputs_and_skips_manifests() {
        let store = InMemoryObjectStore::new();
        seed_asset(&store, "asset-1");

        let report = relocator(&store, RelocationConfig::new("final"))
            .relocate(&[finished("2024/clip.mp4", "asset-1")])
            .await;

        assert_eq!(report.copied, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(store.object_names("final"), vec!["media/2024/clip_1280x720.mp4"]);
        // copy, not move
        assert_eq!(store.object_names("asset-1").len(), 3);
    }

    #[tokio::test]
    async fn test_move_deletes_copied_artifacts() {
        let store = InMemoryObjectStore::new();
        seed_asset(&store, "asset-1");

        let config = RelocationConfig {
            delete_after_copy: true,
            ..RelocationConfig::new("final")
        };
        let report = relocator(&store, config)
            .relocate(&[finished("clip.mp4", "asset-1")])
            .await;

        assert_eq!(report.deleted, 1);
        assert_eq!(
            store.object_names("asset-1"),
            vec!["clip.ism", "clip_metadata.json"]
        );
    }

    #[tokio::test]
    async fn test_only_finished_records_are_relocated() {
        let store = InMemoryObjectStore::new();
        seed_asset(&store, "asset-1");
        let mut failed = finished("clip.mp4", "asset-1");
        failed.state = JobState::Error;

        let report = relocator(&store, RelocationConfig::new("final"))
            .relocate(&[failed.clone()])
            .await;

        assert_eq!(report, RelocationReport::default());
        assert!(store.copies().is_empty());
        assert_eq!(failed.state, JobState::Error);
    }

    #[tokio::test]
    async fn test_missing_output_counts_as_failure() {
        let store = InMemoryObjectStore::new();

        let report = relocator(&store, RelocationConfig::new("final"))
            .relocate(&[finished("clip.mp4", "asset-missing")])
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.copied, 0);
    }
}
