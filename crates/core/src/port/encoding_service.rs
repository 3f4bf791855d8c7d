// Encoding Service Port
// Abstraction over the remote service that runs transcode jobs

use crate::domain::{OutputRef, RecipeHandle, TranscodeRecipe};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Encoding service errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Malformed input or quota exhaustion on create-job
    #[error("Submission rejected: {0}")]
    Submission(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Handle to a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub recipe: String,
    pub job_name: String,
}

impl JobHandle {
    pub fn new(recipe: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self {
            recipe: recipe.into(),
            job_name: job_name.into(),
        }
    }
}

/// One status observation as reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Raw remote state name (mapped with `JobState::from_remote`)
    pub state: String,
    pub progress_percent: Option<u8>,
    pub started_at: Option<i64>, // epoch ms
    pub ended_at: Option<i64>,   // epoch ms
}

impl JobStatus {
    pub fn new(state: impl Into<String>, progress_percent: Option<u8>) -> Self {
        Self {
            state: state.into(),
            progress_percent,
            started_at: None,
            ended_at: None,
        }
    }
}

/// Encoding Service trait
///
/// Implementations:
/// - HttpEncodingService: JSON over HTTP (infra-http)
/// - ScriptedEncodingService: deterministic test double (below)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EncodingService: Send + Sync {
    /// Create or update a named recipe
    async fn register_recipe(&self, recipe: &TranscodeRecipe)
        -> Result<RecipeHandle, EncodingError>;

    /// Allocate a fresh output asset for one job
    async fn create_output(&self, asset_name: &str) -> Result<OutputRef, EncodingError>;

    /// Submit one job. Not idempotent: callers must not repeat it per input.
    ///
    /// # Errors
    /// - EncodingError::Submission on malformed input or quota exhaustion
    async fn submit_job(
        &self,
        recipe: &RecipeHandle,
        job_name: &str,
        input_uri: &str,
        output: &OutputRef,
    ) -> Result<JobHandle, EncodingError>;

    /// Fetch the current status of a job
    async fn get_job_status(&self, job: &JobHandle) -> Result<JobStatus, EncodingError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::{Arc, Mutex};

    /// One scripted response to a status poll
    #[derive(Debug, Clone)]
    pub enum StatusStep {
        /// Report this remote state and progress
        State(String, u8),
        /// Fail the status call (transient error)
        Unavailable,
    }

    impl StatusStep {
        pub fn state(name: impl Into<String>, progress: u8) -> Self {
            StatusStep::State(name.into(), progress)
        }
    }

    #[derive(Default)]
    struct Inner {
        /// Scripts keyed by input URI, assigned to jobs on submission
        scripts_by_input: HashMap<String, Vec<StatusStep>>,
        default_script: Vec<StatusStep>,
        failing_inputs: HashSet<String>,
        fail_registration: bool,

        jobs: HashMap<String, ScriptedJob>,
        registered: Vec<String>,
        submit_calls: Vec<String>,
        status_calls: usize,
    }

    struct ScriptedJob {
        input_uri: String,
        remaining: VecDeque<StatusStep>,
        last_state: Option<String>,
    }

    /// Scripted encoding service.
    ///
    /// Each job replays the script registered for its input URI, one step per
    /// status call; the last step repeats forever.
    #[derive(Clone, Default)]
    pub struct ScriptedEncodingService {
        inner: Arc<Mutex<Inner>>,
    }

    impl ScriptedEncodingService {
        /// Every job finishes on its first poll unless scripted otherwise
        pub fn new() -> Self {
            let service = Self::default();
            service.inner.lock().unwrap().default_script =
                vec![StatusStep::state("Finished", 100)];
            service
        }

        pub fn with_default_script(self, steps: Vec<StatusStep>) -> Self {
            self.inner.lock().unwrap().default_script = steps;
            self
        }

        pub fn with_script(self, input_uri: impl Into<String>, steps: Vec<StatusStep>) -> Self {
            self.inner
                .lock()
                .unwrap()
                .scripts_by_input
                .insert(input_uri.into(), steps);
            self
        }

        /// Reject create-job for this input
        pub fn fail_submission_for(self, input_uri: impl Into<String>) -> Self {
            self.inner
                .lock()
                .unwrap()
                .failing_inputs
                .insert(input_uri.into());
            self
        }

        pub fn fail_registration(self) -> Self {
            self.inner.lock().unwrap().fail_registration = true;
            self
        }

        /// Total create-job calls
        pub fn submit_calls(&self) -> usize {
            self.inner.lock().unwrap().submit_calls.len()
        }

        /// Create-job calls for one input
        pub fn submit_calls_for(&self, input_uri: &str) -> usize {
            self.inner
                .lock()
                .unwrap()
                .submit_calls
                .iter()
                .filter(|uri| uri.as_str() == input_uri)
                .count()
        }

        pub fn status_calls(&self) -> usize {
            self.inner.lock().unwrap().status_calls
        }

        pub fn registered_recipes(&self) -> Vec<String> {
            self.inner.lock().unwrap().registered.clone()
        }

        /// Last state reported for the job reading `input_uri`
        pub fn last_reported_state(&self, input_uri: &str) -> Option<String> {
            self.inner
                .lock()
                .unwrap()
                .jobs
                .values()
                .find(|job| job.input_uri == input_uri)
                .and_then(|job| job.last_state.clone())
        }
    }

    #[async_trait]
    impl EncodingService for ScriptedEncodingService {
        async fn register_recipe(
            &self,
            recipe: &TranscodeRecipe,
        ) -> Result<RecipeHandle, EncodingError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_registration {
                return Err(EncodingError::Transport("registration unavailable".to_string()));
            }
            inner.registered.push(recipe.name.clone());
            Ok(RecipeHandle::new(&recipe.name))
        }

        async fn create_output(&self, asset_name: &str) -> Result<OutputRef, EncodingError> {
            Ok(OutputRef::new(asset_name, format!("asset-{}", asset_name)))
        }

        async fn submit_job(
            &self,
            recipe: &RecipeHandle,
            job_name: &str,
            input_uri: &str,
            _output: &OutputRef,
        ) -> Result<JobHandle, EncodingError> {
            let mut inner = self.inner.lock().unwrap();
            inner.submit_calls.push(input_uri.to_string());

            if inner.failing_inputs.contains(input_uri) {
                return Err(EncodingError::Submission(format!(
                    "input rejected: {}",
                    input_uri
                )));
            }

            let script = inner
                .scripts_by_input
                .get(input_uri)
                .cloned()
                .unwrap_or_else(|| inner.default_script.clone());
            inner.jobs.insert(
                job_name.to_string(),
                ScriptedJob {
                    input_uri: input_uri.to_string(),
                    remaining: script.into(),
                    last_state: None,
                },
            );
            Ok(JobHandle::new(&recipe.name, job_name))
        }

        async fn get_job_status(&self, job: &JobHandle) -> Result<JobStatus, EncodingError> {
            let mut inner = self.inner.lock().unwrap();
            inner.status_calls += 1;

            let scripted = inner
                .jobs
                .get_mut(&job.job_name)
                .ok_or_else(|| EncodingError::NotFound(job.job_name.clone()))?;

            let step = if scripted.remaining.len() > 1 {
                scripted.remaining.pop_front()
            } else {
                scripted.remaining.front().cloned()
            };

            match step {
                Some(StatusStep::State(state, progress)) => {
                    scripted.last_state = Some(state.clone());
                    Ok(JobStatus::new(state, Some(progress)))
                }
                Some(StatusStep::Unavailable) => {
                    Err(EncodingError::Transport("status unavailable".to_string()))
                }
                None => Ok(JobStatus::new("Queued", Some(0))),
            }
        }
    }
}
