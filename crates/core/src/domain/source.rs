// Source Item Domain Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a source object: `(container, object)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub container: String,
    pub object: String,
}

impl SourceKey {
    pub fn new(container: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.object)
    }
}

/// A media object discovered in the source store.
///
/// Created by the scanner from a storage listing and immutable for the
/// lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    /// Address the encoding service reads the input from
    pub uri: String,
    pub container_name: String,
    pub object_name: String,
    /// Matched extension from the allow-list (lowercase, with leading dot)
    pub extension: String,
    pub already_processed: bool,
}

impl SourceItem {
    pub fn new(
        uri: impl Into<String>,
        container_name: impl Into<String>,
        object_name: impl Into<String>,
        extension: impl Into<String>,
        already_processed: bool,
    ) -> Self {
        Self {
            uri: uri.into(),
            container_name: container_name.into(),
            object_name: object_name.into(),
            extension: extension.into(),
            already_processed,
        }
    }

    pub fn key(&self) -> SourceKey {
        SourceKey::new(&self.container_name, &self.object_name)
    }

    /// Directory part of the object name below its container (`""` at the root)
    pub fn parent_path(&self) -> &str {
        match self.object_name.rfind('/') {
            Some(idx) => &self.object_name[..idx],
            None => "",
        }
    }
}

/// Return the allow-listed extension `name` ends with, if any.
///
/// Matching is case-insensitive; the returned value is the configured entry.
pub fn match_extension<'a>(name: &str, extensions: &'a [String]) -> Option<&'a str> {
    let lower = name.to_ascii_lowercase();
    extensions
        .iter()
        .find(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
        .map(|ext| ext.as_str())
}
