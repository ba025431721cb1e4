//! Adopting an artifact path announced in the tool's own output

use crate::error::{Error, Result};
use crate::utils::{absolute_path, file_modified_utc, paths_are_same};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::ArtifactManager;
use super::metadata::ArtifactMetadata;

#[allow(clippy::expect_used)]
static JAR_EXECUTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)java\s+-jar\s+(?:"(?P<dq>[^"]+)"|'(?P<sq>[^']+)'|(?P<bare>\S+))"#)
        .expect("valid regex")
});

/// An artifact copied into the cache by [`ArtifactManager::remember_artifact`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RememberedArtifact {
    /// Location of the copy inside the cache directory
    pub path: PathBuf,
    /// The cache gained a new file, the file came from elsewhere, or the
    /// metadata changed
    pub is_new: bool,
}

/// Find the artifact path in the last `java -jar <path>` command of `output`
///
/// Quoted paths may contain spaces; the result is made absolute against the
/// current directory.
///
/// ```
/// use saft_submit::acquisition::extract_artifact_path;
///
/// let out = r#"Execute: java -jar "/opt/at/EnviaSaft 2.jar" -n 123"#;
/// assert_eq!(
///     extract_artifact_path(out).unwrap(),
///     std::path::PathBuf::from("/opt/at/EnviaSaft 2.jar")
/// );
/// ```
pub fn extract_artifact_path(output: &str) -> Option<PathBuf> {
    let caps = JAR_EXECUTION.captures_iter(output).last()?;
    let raw = caps
        .name("dq")
        .or_else(|| caps.name("sq"))
        .or_else(|| caps.name("bare"))?
        .as_str()
        .trim();

    if raw.is_empty() {
        return None;
    }
    Some(absolute_path(Path::new(raw)))
}

impl ArtifactManager {
    /// Copy an existing artifact into the cache directory and make it the
    /// current one
    ///
    /// Returns `Ok(None)` when `path` does not name an existing file. The
    /// metadata is rewritten with the file's name and modification time and
    /// its remote validators are cleared.
    pub async fn remember_artifact(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<RememberedArtifact>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let source = absolute_path(path);
        let is_file = tokio::fs::metadata(&source)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            debug!(?source, "announced artifact does not exist");
            return Ok(None);
        }

        let Some(file_name) = source.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Ok(None);
        };

        let _guard = self.lock.lock().await;
        let cache_dir = &self.config.cache_dir;
        tokio::fs::create_dir_all(cache_dir).await?;

        let dest = cache_dir.join(&file_name);
        let existed = tokio::fs::try_exists(&dest).await.unwrap_or(false);
        let copied = !paths_are_same(&source, &dest);
        if copied {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            tokio::fs::copy(&source, &dest).await?;
        }

        let previous = self.store.load().await;
        let metadata = ArtifactMetadata::local(file_name, file_modified_utc(&dest));
        let metadata_changed = previous.as_ref().is_none_or(|p| {
            p.file_name != metadata.file_name
                || p.last_modified != metadata.last_modified
                || p.etag.is_some()
        });
        if metadata_changed {
            self.store.save(&metadata).await?;
        }

        let is_new = !existed || copied || metadata_changed;
        info!(?source, ?dest, is_new, "remembered artifact");
        Ok(Some(RememberedArtifact { path: dest, is_new }))
    }
}
