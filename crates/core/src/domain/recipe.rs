// Transcode Recipe Domain Model

use serde::{Deserialize, Serialize};

/// Named, reusable encoding configuration registered with the encoding service.
///
/// The `config` body is opaque to the orchestrator and forwarded as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeRecipe {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl TranscodeRecipe {
    pub fn new(name: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            config,
        }
    }

    /// Content-aware H.264 recipe (single 360p-1080p layer, 2s key frames)
    pub fn content_aware_h264(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some("H264 content aware encoding with configuration settings".to_string()),
            config: serde_json::json!({
                "preset": "ContentAwareEncoding",
                "complexity": "Quality",
                "interleaveOutput": "InterleavedOutput",
                "keyFrameIntervalInSeconds": 2,
                "maxBitrateBps": 6_000_000,
                "minBitrateBps": 200_000,
                "maxHeight": 1080,
                "minHeight": 360,
                "maxLayers": 1,
                "onError": "StopProcessingJob",
                "relativePriority": "Normal"
            }),
        }
    }
}

/// Handle returned by recipe registration; many jobs reference one handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeHandle {
    pub name: String,
}

impl RecipeHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
