// Port Layer - Interfaces for external dependencies

pub mod encoding_service;
pub mod id_provider; // For deterministic testing
pub mod object_store;
pub mod progress;
pub mod time_provider;

// Re-exports
pub use encoding_service::{EncodingError, EncodingService, JobHandle, JobStatus};
pub use id_provider::IdProvider;
pub use object_store::{Metadata, ObjectEntry, ObjectRef, ObjectStore, StorageError};
pub use progress::{BatchReport, JobProgressRow, LogProgressReporter, ProgressReporter};
pub use time_provider::TimeProvider;
