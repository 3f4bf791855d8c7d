//! Source Catalog Scanner - discovers unprocessed media objects
//!
//! Walks every eligible container of the source store and yields one
//! `SourceItem` per object that:
//! - does not carry a truthy `encoded` marker from an earlier run
//! - does not live in the output or relocation container (or an asset/hidden container)
//! - ends with one of the allow-listed extensions
//!
//! The scan is read-only. A `(container, object)` pair is yielded at most
//! once per scanner, however many times a container is rescanned.

use crate::application::config::OrchestratorConfig;
use crate::application::context::OrchestratorContext;
use crate::domain::outcome::{has_outcome, is_processed};
use crate::domain::source::match_extension;
use crate::domain::{OutcomeTagKeys, SourceItem, SourceKey};
use crate::error::Result;
use crate::port::{ObjectEntry, ObjectStore};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub struct SourceScanner {
    store: Arc<dyn ObjectStore>,
    config: Arc<OrchestratorConfig>,
    keys: OutcomeTagKeys,
    seen: Mutex<HashSet<SourceKey>>,
}

impl SourceScanner {
    pub fn new(ctx: &OrchestratorContext) -> Self {
        Self {
            store: Arc::clone(&ctx.store),
            config: Arc::clone(&ctx.config),
            keys: ctx.config.tag_keys(),
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Containers to scan, in listing order.
    ///
    /// # Errors
    /// Fails when the store root cannot be enumerated at all; the run aborts.
    pub async fn containers(&self) -> Result<Vec<String>> {
        let all = self.store.list_containers().await?;
        info!(count = all.len(), "Found containers in the source location");

        Ok(all
            .into_iter()
            .filter(|container| self.is_scannable(container))
            .collect())
    }

    fn is_scannable(&self, container: &str) -> bool {
        if container == self.config.output_container {
            info!(
                container = %container,
                "Skipping the output container to avoid re-encoding outputs"
            );
            return false;
        }
        if let Some(relocation) = &self.config.relocation {
            if container == relocation.destination_container {
                info!(
                    container = %container,
                    "Skipping the relocation container to avoid re-encoding outputs"
                );
                return false;
            }
        }
        if container.starts_with('.') {
            debug!(container = %container, "Skipping hidden container");
            return false;
        }
        if self.config.skip_asset_containers
            && !self.config.asset_container_prefix.is_empty()
            && container.starts_with(&self.config.asset_container_prefix)
        {
            info!(
                container = %container,
                prefix = %self.config.asset_container_prefix,
                "Skipping asset container"
            );
            return false;
        }
        true
    }

    /// Candidates from one container, in listing order
    pub async fn scan_container(&self, container: &str) -> Result<Vec<SourceItem>> {
        info!(container = %container, "Scanning container");
        let entries = self.store.list_objects(container).await?;

        let mut items = Vec::new();
        for entry in entries {
            if let Some(item) = self.classify(container, &entry) {
                items.push(item);
            }
        }

        info!(
            container = %container,
            candidates = items.len(),
            "Container scan complete"
        );
        Ok(items)
    }

    fn classify(&self, container: &str, entry: &ObjectEntry) -> Option<SourceItem> {
        if is_processed(&self.keys, &entry.metadata) {
            debug!(container = %container, object = %entry.name, "Already encoded, skipping");
            return None;
        }
        if !self.config.rescan_failed && has_outcome(&self.keys, &entry.metadata) {
            debug!(container = %container, object = %entry.name, "Failed earlier, skipping");
            return None;
        }

        let extension = match_extension(&entry.name, &self.config.extensions)?;

        let key = SourceKey::new(container, &entry.name);
        if !self.seen.lock().unwrap_or_else(|e| e.into_inner()).insert(key) {
            debug!(container = %container, object = %entry.name, "Already yielded in this run");
            return None;
        }

        info!(
            container = %container,
            object = %entry.name,
            extension = %extension,
            "Found source object"
        );
        Some(SourceItem::new(
            self.store.object_url(container, &entry.name),
            container,
            &entry.name,
            extension.to_ascii_lowercase(),
            false,
        ))
    }

    /// Lazy candidate stream over every eligible container.
    ///
    /// Root enumeration happens eagerly (and may fail the run); each container
    /// is listed only when the stream reaches it. A container whose listing
    /// fails is logged and skipped.
    pub async fn scan(&self) -> Result<BoxStream<'_, SourceItem>> {
        let containers = self.containers().await?;

        Ok(stream::iter(containers)
            .then(move |container| async move {
                match self.scan_container(&container).await {
                    Ok(items) => items,
                    Err(e) => {
                        warn!(container = %container, error = %e, "Container listing failed, skipping");
                        Vec::new()
                    }
                }
            })
            .flat_map(stream::iter)
            .boxed())
    }
}
