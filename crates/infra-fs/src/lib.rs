// Mediabatch Infrastructure - Filesystem Adapters
// Implements: ObjectStore

pub mod fs_object_store;

pub use fs_object_store::FsObjectStore;
