// Orchestrator configuration
//
// Validated once before any remote call; invalid values fail fast.

use crate::application::constants::*;
use crate::domain::{OutcomeTagKeys, TranscodeRecipe};
use crate::error::{AppError, Result};
use std::time::Duration;

/// Settings consumed by the batch orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Extension allow-list (suffix match, case-insensitive)
    pub extensions: Vec<String>,
    /// Container receiving generated artifacts; skipped by the scanner
    pub output_container: String,
    pub batch_size: usize,
    pub poll_interval: Duration,
    /// Deadline of the per-job wait
    pub job_timeout: Duration,
    /// Skip containers named like encoding-service assets
    pub skip_asset_containers: bool,
    pub asset_container_prefix: String,
    /// Re-submit sources tagged `encoded=false` by an earlier run
    pub rescan_failed: bool,
    /// Prefix applied to outcome tag keys (`""` or e.g. `ams_`)
    pub tag_key_prefix: String,
    pub recipe: TranscodeRecipe,
    /// Output relocation stage, disabled when `None`
    pub relocation: Option<RelocationConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            output_container: DEFAULT_OUTPUT_CONTAINER.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            skip_asset_containers: true,
            asset_container_prefix: DEFAULT_ASSET_CONTAINER_PREFIX.to_string(),
            rescan_failed: true,
            tag_key_prefix: String::new(),
            recipe: TranscodeRecipe::content_aware_h264(DEFAULT_RECIPE_NAME),
            relocation: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AppError::Config("batch size must be greater than 0".to_string()));
        }
        if self.extensions.is_empty() {
            return Err(AppError::Config("extension allow-list is empty".to_string()));
        }
        if let Some(ext) = self.extensions.iter().find(|e| e.trim().is_empty()) {
            return Err(AppError::Config(format!("invalid extension entry: {:?}", ext)));
        }
        if self.poll_interval.is_zero() {
            return Err(AppError::Config("poll interval must be greater than 0".to_string()));
        }
        if self.job_timeout.is_zero() {
            return Err(AppError::Config("job timeout must be greater than 0".to_string()));
        }
        if self.output_container.trim().is_empty() {
            return Err(AppError::Config("output container name is empty".to_string()));
        }
        if self.recipe.name.trim().is_empty() {
            return Err(AppError::Config("recipe name is empty".to_string()));
        }
        if let Some(relocation) = &self.relocation {
            relocation.validate()?;
        }
        Ok(())
    }

    pub fn tag_keys(&self) -> OutcomeTagKeys {
        OutcomeTagKeys::new(&self.tag_key_prefix)
    }
}

/// Output relocation settings
#[derive(Debug, Clone)]
pub struct RelocationConfig {
    pub destination_container: String,
    /// Path prefix inside the destination container (may be empty)
    pub destination_prefix: String,
    /// Keep the source object's directory below its container
    pub preserve_hierarchy: bool,
    /// With `preserve_hierarchy`, also keep the source container name
    pub include_container_path: bool,
    /// Artifacts whose name ends with one of these are not copied
    pub no_copy_suffixes: Vec<String>,
    /// Delete each artifact from the output asset after it was copied
    pub delete_after_copy: bool,
}

impl RelocationConfig {
    pub fn new(destination_container: impl Into<String>) -> Self {
        Self {
            destination_container: destination_container.into(),
            destination_prefix: String::new(),
            preserve_hierarchy: true,
            include_container_path: true,
            no_copy_suffixes: DEFAULT_NO_COPY_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            delete_after_copy: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.destination_container.trim().is_empty() {
            return Err(AppError::Config(
                "relocation enabled without a destination container".to_string(),
            ));
        }
        Ok(())
    }
}
