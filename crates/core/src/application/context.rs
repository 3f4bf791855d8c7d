// Orchestrator Context
//
// Every collaborator of a run, constructed once and passed explicitly into
// each component. No ambient global client state.

use crate::application::config::OrchestratorConfig;
use crate::error::Result;
use crate::port::{
    EncodingService, IdProvider, LogProgressReporter, ObjectStore, ProgressReporter, TimeProvider,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct OrchestratorContext {
    pub encoding: Arc<dyn EncodingService>,
    pub store: Arc<dyn ObjectStore>,
    pub id_provider: Arc<dyn IdProvider>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub reporter: Arc<dyn ProgressReporter>,
    pub config: Arc<OrchestratorConfig>,
}

impl OrchestratorContext {
    /// Build a context, validating the configuration first
    pub fn new(
        encoding: Arc<dyn EncodingService>,
        store: Arc<dyn ObjectStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            encoding,
            store,
            id_provider,
            time_provider,
            reporter: Arc::new(LogProgressReporter),
            config: Arc::new(config),
        })
    }

    /// Replace the default (tracing) progress reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }
}
