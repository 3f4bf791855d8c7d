//! Runner settings
//!
//! Sources, later ones override earlier ones:
//! 1. built-in defaults
//! 2. optional TOML file (`--config`)
//! 3. environment, `MEDIABATCH__SECTION__KEY` (e.g. `MEDIABATCH__ORCHESTRATOR__BATCH_SIZE=5`)
//!
//! List values given through the environment are comma-separated.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use mediabatch_core::application::constants::*;
use mediabatch_core::application::{OrchestratorConfig, RelocationConfig};
use mediabatch_core::domain::TranscodeRecipe;
use mediabatch_infra_http::HttpEncodingConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "MEDIABATCH";
const ENV_SEPARATOR: &str = "__";
const LIST_KEYS: &[&str] = &["orchestrator.extensions", "relocation.no_copy_suffixes"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root directory of the source store; containers are its subdirectories
    pub source_root: PathBuf,
    pub encoding: EncodingSettings,
    pub orchestrator: OrchestratorSettings,
    pub relocation: Option<RelocationSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EncodingSettings {
    pub base_url: String,
    pub token: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub extensions: Vec<String>,
    pub output_container: String,
    pub batch_size: usize,
    pub poll_interval_secs: u64,
    pub job_timeout_secs: u64,
    pub skip_asset_containers: bool,
    pub asset_container_prefix: String,
    pub rescan_failed: bool,
    pub tag_key_prefix: String,
    pub recipe_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelocationSettings {
    pub destination_container: String,
    #[serde(default)]
    pub destination_prefix: String,
    #[serde(default = "enabled")]
    pub preserve_hierarchy: bool,
    #[serde(default = "enabled")]
    pub include_container_path: bool,
    #[serde(default = "default_no_copy_suffixes")]
    pub no_copy_suffixes: Vec<String>,
    #[serde(default)]
    pub delete_after_copy: bool,
}

fn enabled() -> bool {
    true
}

fn default_no_copy_suffixes() -> Vec<String> {
    DEFAULT_NO_COPY_SUFFIXES.iter().map(|s| s.to_string()).collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("."),
            encoding: EncodingSettings::default(),
            orchestrator: OrchestratorSettings::default(),
            relocation: None,
        }
    }
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/".to_string(),
            token: None,
            request_timeout_secs: 30,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            output_container: DEFAULT_OUTPUT_CONTAINER.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            job_timeout_secs: DEFAULT_JOB_TIMEOUT.as_secs(),
            skip_asset_containers: true,
            asset_container_prefix: DEFAULT_ASSET_CONTAINER_PREFIX.to_string(),
            rescan_failed: true,
            tag_key_prefix: String::new(),
            recipe_name: DEFAULT_RECIPE_NAME.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the optional file and the process environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_from(file, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_from(file: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let mut env = env
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }

        builder
            .add_source(env)
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn encoding_config(&self) -> HttpEncodingConfig {
        HttpEncodingConfig {
            base_url: self.encoding.base_url.clone(),
            bearer_token: self.encoding.token.clone().filter(|t| !t.is_empty()),
            request_timeout: Duration::from_secs(self.encoding.request_timeout_secs),
        }
    }

    /// Orchestrator configuration; validated when the context is built
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let o = &self.orchestrator;
        OrchestratorConfig {
            extensions: o.extensions.clone(),
            output_container: o.output_container.clone(),
            batch_size: o.batch_size,
            poll_interval: Duration::from_secs(o.poll_interval_secs),
            job_timeout: Duration::from_secs(o.job_timeout_secs),
            skip_asset_containers: o.skip_asset_containers,
            asset_container_prefix: o.asset_container_prefix.clone(),
            rescan_failed: o.rescan_failed,
            tag_key_prefix: o.tag_key_prefix.clone(),
            recipe: TranscodeRecipe::content_aware_h264(&o.recipe_name),
            relocation: self.relocation.as_ref().map(|r| RelocationConfig {
                destination_container: r.destination_container.clone(),
                destination_prefix: r.destination_prefix.clone(),
                preserve_hierarchy: r.preserve_hierarchy,
                include_container_path: r.include_container_path,
                no_copy_suffixes: r.no_copy_suffixes.clone(),
                delete_after_copy: r.delete_after_copy,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(source))
    }

    #[test]
    fn test_defaults_without_sources() {
        let settings = Settings::load_from(None, env(&[])).unwrap();
        let config = settings.orchestrator_config();

        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.job_timeout, Duration::from_secs(600));
        assert_eq!(config.recipe.name, "BatchRemoteH264ContentAware");
        assert!(config.relocation.is_none());
    }

    #[test]
    fn test_file_then_environment() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
source_root = "/srv/media"

[orchestrator]
batch_size = 4
extensions = [".mp4"]

[relocation]
destination_container = "final"
delete_after_copy = true
"#
        )
        .unwrap();

        let settings = Settings::load_from(
            Some(file.path()),
            env(&[
                ("MEDIABATCH__ORCHESTRATOR__BATCH_SIZE", "3"),
                ("MEDIABATCH__ORCHESTRATOR__TAG_KEY_PREFIX", "ams_"),
            ]),
        )
        .unwrap();
        let config = settings.orchestrator_config();

        assert_eq!(settings.source_root, PathBuf::from("/srv/media"));
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.extensions, vec![".mp4"]);
        assert_eq!(config.tag_key_prefix, "ams_");
        let relocation = config.relocation.unwrap();
        assert_eq!(relocation.destination_container, "final");
        assert!(relocation.preserve_hierarchy);
        assert!(relocation.delete_after_copy);
        assert_eq!(relocation.no_copy_suffixes.len(), 4);
    }

    #[test]
    fn test_list_from_environment() {
        let settings = Settings::load_from(
            None,
            env(&[("MEDIABATCH__ORCHESTRATOR__EXTENSIONS", ".mp4,.mxf")]),
        )
        .unwrap();
        assert_eq!(settings.orchestrator.extensions, vec![".mp4", ".mxf"]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Settings::load_from(Some(Path::new("/nonexistent/mediabatch.toml")), env(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_batch_size_fails_validation() {
        let settings = Settings::load_from(
            None,
            env(&[("MEDIABATCH__ORCHESTRATOR__BATCH_SIZE", "0")]),
        )
        .unwrap();
        assert!(settings.orchestrator_config().validate().is_err());
    }
}
