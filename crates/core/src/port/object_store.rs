// Object Store Port
// Listing, metadata and copy operations against the media storage account

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Object store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Object metadata (flat string map)
pub type Metadata = HashMap<String, String>;

/// One listed object with its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Object name below the container, `/`-separated
    pub name: String,
    pub metadata: Metadata,
}

/// Address of one object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub container: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.name)
    }
}

/// Object store port
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List container names under the store root
    async fn list_containers(&self) -> Result<Vec<String>, StorageError>;

    /// List all objects in a container, with metadata
    async fn list_objects(&self, container: &str) -> Result<Vec<ObjectEntry>, StorageError>;

    async fn read_metadata(&self, container: &str, name: &str) -> Result<Metadata, StorageError>;

    /// Replace an object's metadata
    async fn write_metadata(
        &self,
        container: &str,
        name: &str,
        metadata: &Metadata,
    ) -> Result<(), StorageError>;

    async fn copy_object(&self, src: &ObjectRef, dest: &ObjectRef) -> Result<(), StorageError>;

    async fn delete_object(&self, object: &ObjectRef) -> Result<(), StorageError>;

    /// URL the encoding service can read the object from
    fn object_url(&self, container: &str, name: &str) -> String;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default)]
    struct StoredObject {
        data: Vec<u8>,
        metadata: Metadata,
    }

    #[derive(Default)]
    struct Inner {
        containers: BTreeMap<String, BTreeMap<String, StoredObject>>,
        fail_root_listing: bool,
        failing_containers: HashSet<String>,
        failing_metadata_writes: HashSet<ObjectRef>,
        metadata_writes: Vec<(ObjectRef, Metadata)>,
        copies: Vec<(ObjectRef, ObjectRef)>,
    }

    /// In-memory object store; listings are sorted by name
    #[derive(Clone, Default)]
    pub struct InMemoryObjectStore {
        inner: Arc<Mutex<Inner>>,
    }

    impl InMemoryObjectStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn create_container(&self, container: &str) {
            self.inner
                .lock()
                .unwrap()
                .containers
                .entry(container.to_string())
                .or_default();
        }

        pub fn put(&self, container: &str, name: &str, data: &[u8]) {
            self.put_with_metadata(container, name, data, Metadata::new());
        }

        pub fn put_with_metadata(&self, container: &str, name: &str, data: &[u8], metadata: Metadata) {
            self.inner
                .lock()
                .unwrap()
                .containers
                .entry(container.to_string())
                .or_default()
                .insert(
                    name.to_string(),
                    StoredObject {
                        data: data.to_vec(),
                        metadata,
                    },
                );
        }

        pub fn object_names(&self, container: &str) -> Vec<String> {
            self.inner
                .lock()
                .unwrap()
                .containers
                .get(container)
                .map(|objects| objects.keys().cloned().collect())
                .unwrap_or_default()
        }

        pub fn metadata(&self, container: &str, name: &str) -> Option<Metadata> {
            self.inner
                .lock()
                .unwrap()
                .containers
                .get(container)
                .and_then(|objects| objects.get(name))
                .map(|object| object.metadata.clone())
        }

        pub fn data(&self, container: &str, name: &str) -> Option<Vec<u8>> {
            self.inner
                .lock()
                .unwrap()
                .containers
                .get(container)
                .and_then(|objects| objects.get(name))
                .map(|object| object.data.clone())
        }

        /// Every successful metadata write, in order
        pub fn metadata_writes(&self) -> Vec<(ObjectRef, Metadata)> {
            self.inner.lock().unwrap().metadata_writes.clone()
        }

        pub fn copies(&self) -> Vec<(ObjectRef, ObjectRef)> {
            self.inner.lock().unwrap().copies.clone()
        }

        pub fn fail_root_listing(&self) {
            self.inner.lock().unwrap().fail_root_listing = true;
        }

        pub fn fail_listing_for(&self, container: &str) {
            self.inner
                .lock()
                .unwrap()
                .failing_containers
                .insert(container.to_string());
        }

        pub fn fail_metadata_writes_for(&self, container: &str, name: &str) {
            self.inner
                .lock()
                .unwrap()
                .failing_metadata_writes
                .insert(ObjectRef::new(container, name));
        }
    }

    #[async_trait]
    impl ObjectStore for InMemoryObjectStore {
        async fn list_containers(&self) -> Result<Vec<String>, StorageError> {
            let inner = self.inner.lock().unwrap();
            if inner.fail_root_listing {
                return Err(StorageError::PermissionDenied("list containers".to_string()));
            }
            Ok(inner.containers.keys().cloned().collect())
        }

        async fn list_objects(&self, container: &str) -> Result<Vec<ObjectEntry>, StorageError> {
            let inner = self.inner.lock().unwrap();
            if inner.failing_containers.contains(container) {
                return Err(StorageError::Backend(format!("listing {} failed", container)));
            }
            let objects = inner
                .containers
                .get(container)
                .ok_or_else(|| StorageError::NotFound(container.to_string()))?;
            Ok(objects
                .iter()
                .map(|(name, object)| ObjectEntry {
                    name: name.clone(),
                    metadata: object.metadata.clone(),
                })
                .collect())
        }

        async fn read_metadata(&self, container: &str, name: &str) -> Result<Metadata, StorageError> {
            self.metadata(container, name)
                .ok_or_else(|| StorageError::NotFound(format!("{}/{}", container, name)))
        }

        async fn write_metadata(
            &self,
            container: &str,
            name: &str,
            metadata: &Metadata,
        ) -> Result<(), StorageError> {
            let mut inner = self.inner.lock().unwrap();
            let target = ObjectRef::new(container, name);
            if inner.failing_metadata_writes.contains(&target) {
                return Err(StorageError::PermissionDenied(format!(
                    "metadata write on {}",
                    target
                )));
            }
            let object = inner
                .containers
                .get_mut(container)
                .and_then(|objects| objects.get_mut(name))
                .ok_or_else(|| StorageError::NotFound(target.to_string()))?;
            object.metadata = metadata.clone();
            inner.metadata_writes.push((target, metadata.clone()));
            Ok(())
        }

        async fn copy_object(&self, src: &ObjectRef, dest: &ObjectRef) -> Result<(), StorageError> {
            let mut inner = self.inner.lock().unwrap();
            let object = inner
                .containers
                .get(&src.container)
                .and_then(|objects| objects.get(&src.name))
                .cloned()
                .ok_or_else(|| StorageError::NotFound(src.to_string()))?;
            inner
                .containers
                .entry(dest.container.clone())
                .or_default()
                .insert(dest.name.clone(), object);
            inner.copies.push((src.clone(), dest.clone()));
            Ok(())
        }

        async fn delete_object(&self, object: &ObjectRef) -> Result<(), StorageError> {
            let mut inner = self.inner.lock().unwrap();
            inner
                .containers
                .get_mut(&object.container)
                .and_then(|objects| objects.remove(&object.name))
                .map(|_| ())
                .ok_or_else(|| StorageError::NotFound(object.to_string()))
        }

        fn object_url(&self, container: &str, name: &str) -> String {
            format!("memory://{}/{}", container, name)
        }
    }
}
