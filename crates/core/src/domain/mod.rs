// Domain Layer - Pure business logic and entities

pub mod batch;
pub mod error;
pub mod job;
pub mod outcome;
pub mod recipe;
pub mod source;

// Re-exports
pub use batch::{Batch, BatchCounts, BatchId};
pub use error::DomainError;
pub use job::{JobId, JobRecord, JobState, OutputRef};
pub use outcome::{OutcomeTag, OutcomeTagKeys};
pub use recipe::{RecipeHandle, TranscodeRecipe};
pub use source::{SourceItem, SourceKey};
