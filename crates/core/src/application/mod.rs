// Application Layer - Use Cases and Business Logic

pub mod batch_builder;
pub mod cancel;
pub mod config;
pub mod constants;
pub mod context;
pub mod orchestrator;
pub mod poller;
pub mod relocator;
pub mod scanner;
pub mod submitter;
pub mod tagger;

// Re-exports
pub use batch_builder::BatchBuilder;
pub use cancel::{cancel_channel, CancelSender, CancelToken};
pub use config::{OrchestratorConfig, RelocationConfig};
pub use context::OrchestratorContext;
pub use orchestrator::{BatchSummary, Orchestrator, RunSummary};
pub use poller::{BatchOutcome, CompletionPoller};
pub use relocator::{OutputRelocator, RelocationReport};
pub use scanner::SourceScanner;
pub use submitter::{JobSubmitter, JobTable};
pub use tagger::OutcomeTagger;
