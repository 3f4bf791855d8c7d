// Filesystem ObjectStore
//
// Layout under the root directory:
//   {root}/{container}/{name}                    object data
//   {root}/.metadata/{container}/{name}.json     metadata sidecar
//
// Containers are the non-hidden top-level directories. Object names are
// `/`-separated paths below their container.

use async_trait::async_trait;
use mediabatch_core::port::{Metadata, ObjectEntry, ObjectRef, ObjectStore, StorageError};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

const METADATA_DIR: &str = ".metadata";
const SIDECAR_EXT: &str = "json";

/// Object store backed by a local directory tree
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: Arc<PathBuf>,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run blocking filesystem work off the async runtime
    async fn blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(Layout) -> Result<T, StorageError> + Send + 'static,
    {
        let layout = Layout {
            root: PathBuf::clone(&self.root),
        };
        tokio::task::spawn_blocking(move || op(layout))
            .await
            .map_err(|e| StorageError::Backend(format!("filesystem task failed: {}", e)))?
    }
}

/// Path arithmetic for one store root
struct Layout {
    root: PathBuf,
}

impl Layout {
    fn container_dir(&self, container: &str) -> Result<PathBuf, StorageError> {
        check_segment(container)?;
        Ok(self.root.join(container))
    }

    fn object_path(&self, container: &str, name: &str) -> Result<PathBuf, StorageError> {
        Ok(self.container_dir(container)?.join(relative(name)?))
    }

    fn sidecar_path(&self, container: &str, name: &str) -> Result<PathBuf, StorageError> {
        check_segment(container)?;
        let mut path = self.root.join(METADATA_DIR).join(container).join(relative(name)?);
        let file_name = format!(
            "{}.{}",
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            SIDECAR_EXT
        );
        path.set_file_name(file_name);
        Ok(path)
    }

    fn existing_object(&self, container: &str, name: &str) -> Result<PathBuf, StorageError> {
        let path = self.object_path(container, name)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(StorageError::NotFound(format!("{}/{}", container, name)))
        }
    }

    fn read_sidecar(&self, container: &str, name: &str) -> Result<Metadata, StorageError> {
        let path = self.sidecar_path(container, name)?;
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StorageError::Backend(format!("corrupt metadata {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Metadata::new()),
            Err(e) => Err(map_io(e, &path)),
        }
    }
}

/// Containers are single path segments
fn check_segment(container: &str) -> Result<(), StorageError> {
    if container.is_empty() || container.contains('/') || container == "." || container == ".." {
        return Err(StorageError::Backend(format!(
            "invalid container name: {:?}",
            container
        )));
    }
    Ok(())
}

/// Object name as a relative path; rejects anything escaping the container
fn relative(name: &str) -> Result<PathBuf, StorageError> {
    let path = Path::new(name);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if name.is_empty() || escapes {
        return Err(StorageError::Backend(format!("invalid object name: {:?}", name)));
    }
    Ok(path.to_path_buf())
}

fn map_io(e: io::Error, path: &Path) -> StorageError {
    let target = path.display().to_string();
    match e.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound(target),
        io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(target),
        _ => StorageError::Io(format!("{}: {}", target, e)),
    }
}

fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| map_io(e, parent))?;
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list_containers(&self) -> Result<Vec<String>, StorageError> {
        self.blocking(|layout| {
            let mut containers = Vec::new();
            for entry in fs::read_dir(&layout.root).map_err(|e| map_io(e, &layout.root))? {
                let entry = entry.map_err(|e| map_io(e, &layout.root))?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }
                if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    containers.push(name);
                }
            }
            containers.sort();
            Ok(containers)
        })
        .await
    }

    async fn list_objects(&self, container: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        let container = container.to_string();
        self.blocking(move |layout| {
            let dir = layout.container_dir(&container)?;
            if !dir.is_dir() {
                return Err(StorageError::NotFound(container));
            }

            let mut objects = Vec::new();
            for entry in WalkDir::new(&dir).min_depth(1).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(container = %container, error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(&dir) else {
                    continue;
                };
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let metadata = match layout.read_sidecar(&container, &name) {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        warn!(container = %container, object = %name, error = %e, "Ignoring unreadable metadata");
                        Metadata::new()
                    }
                };
                objects.push(ObjectEntry { name, metadata });
            }
            objects.sort_by(|a, b| a.name.cmp(&b.name));

            debug!(container = %container, count = objects.len(), "Listed objects");
            Ok(objects)
        })
        .await
    }

    async fn read_metadata(&self, container: &str, name: &str) -> Result<Metadata, StorageError> {
        let (container, name) = (container.to_string(), name.to_string());
        self.blocking(move |layout| {
            layout.existing_object(&container, &name)?;
            layout.read_sidecar(&container, &name)
        })
        .await
    }

    async fn write_metadata(
        &self,
        container: &str,
        name: &str,
        metadata: &Metadata,
    ) -> Result<(), StorageError> {
        let (container, name) = (container.to_string(), name.to_string());
        let body = serde_json::to_vec_pretty(metadata)
            .map_err(|e| StorageError::Backend(format!("metadata encoding failed: {}", e)))?;
        self.blocking(move |layout| {
            layout.existing_object(&container, &name)?;
            let path = layout.sidecar_path(&container, &name)?;
            ensure_parent(&path)?;
            fs::write(&path, body).map_err(|e| map_io(e, &path))
        })
        .await
    }

    async fn copy_object(&self, src: &ObjectRef, dest: &ObjectRef) -> Result<(), StorageError> {
        let (src, dest) = (src.clone(), dest.clone());
        self.blocking(move |layout| {
            let from = layout.existing_object(&src.container, &src.name)?;
            let to = layout.object_path(&dest.container, &dest.name)?;
            ensure_parent(&to)?;
            fs::copy(&from, &to).map_err(|e| map_io(e, &to))?;
            debug!(src = %src, dest = %dest, "Copied object");
            Ok(())
        })
        .await
    }

    async fn delete_object(&self, object: &ObjectRef) -> Result<(), StorageError> {
        let object = object.clone();
        self.blocking(move |layout| {
            let path = layout.existing_object(&object.container, &object.name)?;
            fs::remove_file(&path).map_err(|e| map_io(e, &path))?;

            let sidecar = layout.sidecar_path(&object.container, &object.name)?;
            match fs::remove_file(&sidecar) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(map_io(e, &sidecar)),
            }
        })
        .await
    }

    fn object_url(&self, container: &str, name: &str) -> String {
        let path = self.root.join(container).join(name);
        format!("file://{}", path.to_string_lossy().replace('\\', "/"))
    }
}
