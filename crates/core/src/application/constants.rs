// Orchestrator constants (No magic values)
use std::time::Duration;

/// Jobs submitted and awaited together per batch
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Interval between status polls (per-job and per-batch waits)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Bounded wait for single-job flows (10 minutes)
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Source extensions considered media
pub const DEFAULT_EXTENSIONS: &[&str] = &[".wmv", ".mov", ".mp4", ".mts"];

/// Container receiving generated artifacts; never scanned
pub const DEFAULT_OUTPUT_CONTAINER: &str = "output";

/// Prefix of containers backing encoding-service assets
pub const DEFAULT_ASSET_CONTAINER_PREFIX: &str = "asset-";

/// Packaging artifacts not worth relocating
pub const DEFAULT_NO_COPY_SUFFIXES: &[&str] = &[".ism", ".ismc", ".mpi", "_metadata.json"];

/// Recipe registered when none is configured
pub const DEFAULT_RECIPE_NAME: &str = "BatchRemoteH264ContentAware";

/// Prefix of generated job names
pub const JOB_NAME_PREFIX: &str = "batch-encode";

/// Prefix of generated output asset names
pub const OUTPUT_ASSET_PREFIX: &str = "output";
