//! Artifact metadata side file
//!
//! A small JSON record stored next to the cached artifact:
//!
//! ```json
//! { "fileName": "EnviaSaft.jar", "eTag": "\"abc\"", "lastModified": "2024-05-01T10:00:00Z" }
//! ```

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What is known about the cached artifact
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// File name of the artifact inside the cache directory
    #[serde(rename = "fileName")]
    pub file_name: String,

    /// Entity tag returned by the remote endpoint
    #[serde(rename = "eTag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Remote Last-Modified timestamp, or the local file time when the copy
    /// did not come from the remote endpoint
    #[serde(rename = "lastModified", default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Token sent with a conditional request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheValidator {
    /// Sent as `If-None-Match`
    ETag(String),
    /// Sent as `If-Modified-Since`
    LastModified(DateTime<Utc>),
}

impl ArtifactMetadata {
    /// Record for a file with no remote validators
    pub fn local(file_name: impl Into<String>, last_modified: Option<DateTime<Utc>>) -> Self {
        Self {
            file_name: file_name.into(),
            etag: None,
            last_modified,
        }
    }

    /// The validator to send, entity tag first
    pub fn cache_validator(&self) -> Option<CacheValidator> {
        match (&self.etag, self.last_modified) {
            (Some(etag), _) if !etag.trim().is_empty() => Some(CacheValidator::ETag(etag.clone())),
            (_, Some(ts)) => Some(CacheValidator::LastModified(ts)),
            _ => None,
        }
    }

    /// The stored file name, if it is a bare name usable inside the cache
    /// directory
    pub fn safe_file_name(&self) -> Option<&str> {
        let name = self.file_name.trim();
        let is_bare = !name.is_empty()
            && Path::new(name).file_name().is_some_and(|n| n == name)
            && name != "."
            && name != "..";
        is_bare.then_some(name)
    }
}

/// Reads and writes the metadata side file
///
/// Writes are last-writer-wins; the file is not a transactional store.
#[derive(Clone, Debug)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    /// Store backed by the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the side file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record; missing, unreadable or corrupt files read as `None`
    pub async fn load(&self) -> Option<ArtifactMetadata> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => self.parse(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "failed to read artifact metadata");
                None
            }
        }
    }

    /// Blocking variant of [`MetadataStore::load`]
    pub fn load_blocking(&self) -> Option<ArtifactMetadata> {
        match std::fs::read(&self.path) {
            Ok(bytes) => self.parse(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "failed to read artifact metadata");
                None
            }
        }
    }

    fn parse(&self, bytes: &[u8]) -> Option<ArtifactMetadata> {
        match serde_json::from_slice::<ArtifactMetadata>(bytes) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "ignoring corrupt artifact metadata");
                None
            }
        }
    }

    /// Overwrite the record
    ///
    /// Written to a sibling temporary file first and renamed into place.
    pub async fn save(&self, metadata: &ArtifactMetadata) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(metadata)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = ?self.path, file_name = %metadata.file_name, "saved artifact metadata");
        Ok(())
    }
}
