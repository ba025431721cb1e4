use crate::config::ExtractionConfig;
use crate::error::{Error, Result};
use crate::types::ExtractionOutcome;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Attempts at finding an unused scratch directory name
const SCRATCH_NAME_ATTEMPTS: usize = 8;

/// Create a fresh, uniquely named scratch directory under the configured root
pub(crate) async fn create_scratch_dir(config: &ExtractionConfig) -> Result<PathBuf> {
    tokio::fs::create_dir_all(&config.scratch_root).await?;

    for _ in 0..SCRATCH_NAME_ATTEMPTS {
        let name = format!("{}{:016x}", config.scratch_prefix, rand::random::<u64>());
        let path = config.scratch_root.join(name);
        match tokio::fs::create_dir(&path).await {
            Ok(()) => {
                debug!(?path, "created scratch directory");
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }

    Err(Error::Other(format!(
        "could not create a unique scratch directory under {}",
        config.scratch_root.display()
    )))
}

/// Delete a scratch directory tree
///
/// Failures are logged and otherwise ignored; a missing directory is not an
/// error.
pub fn remove_scratch_dir(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!(?path, "removed scratch directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(?path, error = %e, "failed to remove scratch directory"),
    }
}

/// Removes a scratch directory when dropped
///
/// Obtain one from [`ExtractionOutcome::scratch_guard`] right after a
/// successful extraction and keep it alive while the payload is in use:
///
/// ```no_run
/// # use saft_submit::extraction::PayloadExtractor;
/// # use saft_submit::config::ExtractionConfig;
/// # async fn run() -> saft_submit::Result<()> {
/// let extractor = PayloadExtractor::new(ExtractionConfig::default());
/// let cancel = tokio_util::sync::CancellationToken::new();
/// let outcome = extractor
///     .extract("saft.zip".as_ref(), None, None, &cancel)
///     .await?;
/// let _guard = outcome.scratch_guard();
/// let xml = tokio::fs::read_to_string(&outcome.payload_path).await?;
/// # let _ = xml;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
#[must_use = "the scratch directory is removed as soon as the guard is dropped"]
pub struct ScratchGuard {
    path: Option<PathBuf>,
}

impl ScratchGuard {
    /// Guard an arbitrary directory
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A guard that removes nothing
    pub fn empty() -> Self {
        Self { path: None }
    }

    /// The guarded directory, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Stop guarding and hand the directory back to the caller
    pub fn disarm(mut self) -> Option<PathBuf> {
        self.path.take()
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            remove_scratch_dir(&path);
        }
    }
}

impl ExtractionOutcome {
    /// Guard that deletes this outcome's scratch directory when dropped
    ///
    /// Empty when the source was already a payload file.
    pub fn scratch_guard(&self) -> ScratchGuard {
        match &self.scratch_directory {
            Some(dir) => ScratchGuard::new(dir.clone()),
            None => ScratchGuard::empty(),
        }
    }
}
