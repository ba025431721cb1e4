//! Payload extraction from user-supplied files
//!
//! A submission file may be the XML payload itself or a container (ZIP, RAR,
//! 7z, tar, tar.gz, gz) holding it, possibly nested several levels deep. The
//! [`PayloadExtractor`] unpacks everything into one scratch directory and
//! picks the most recently written payload file.

mod rar;
mod scratch;
mod sevenz;
mod shared;
mod tar;
mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

// Re-exports
pub use scratch::{ScratchGuard, remove_scratch_dir};
pub use shared::{detect_archive_type, is_archive, select_payload, sniff_archive_type};

use crate::config::ExtractionConfig;
use crate::error::{Error, ExtractionError, Result};
use crate::types::{ExtractionOutcome, ExtractionProgress};
use crate::utils::has_extension;
use shared::{ExtractContext, extract_recursive};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Channel on which extraction progress is reported
pub type ProgressSender = mpsc::UnboundedSender<ExtractionProgress>;

/// Locates the payload inside a user-supplied file
#[derive(Debug, Clone, Default)]
pub struct PayloadExtractor {
    config: ExtractionConfig,
}

impl PayloadExtractor {
    /// Create an extractor with the given configuration
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// The active configuration
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Resolve `source` to a readable payload file
    ///
    /// A payload file is returned as-is with no scratch directory. Anything
    /// else is treated as a container and unpacked, recursively, into a new
    /// scratch directory; the returned outcome then names that directory and
    /// the caller owns its deletion (see [`ExtractionOutcome::scratch_guard`]).
    ///
    /// An empty `password` counts as no password. On failure the scratch
    /// directory created by this call is removed before the error is returned.
    ///
    /// # Errors
    ///
    /// * [`ExtractionError::SourceMissing`] / [`ExtractionError::EmptyInput`]
    /// * [`ExtractionError::PasswordRequired`] / [`ExtractionError::WrongPassword`]
    /// * [`ExtractionError::CorruptArchive`] for unreadable or unrecognized containers
    /// * [`ExtractionError::TooDeeplyNested`] when nesting exceeds `max_depth`
    /// * [`ExtractionError::PayloadNotFound`] when no payload file was unpacked
    /// * [`ExtractionError::SizeLimitExceeded`]
    /// * [`Error::Cancelled`] when `cancel` fires
    pub async fn extract(
        &self,
        source: &Path,
        password: Option<&str>,
        progress: Option<ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<ExtractionOutcome> {
        let metadata = match tokio::fs::metadata(source).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => {
                return Err(ExtractionError::SourceMissing {
                    path: source.to_path_buf(),
                }
                .into());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExtractionError::SourceMissing {
                    path: source.to_path_buf(),
                }
                .into());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        if metadata.len() == 0 {
            return Err(ExtractionError::EmptyInput {
                path: source.to_path_buf(),
            }
            .into());
        }

        if has_extension(source, &self.config.payload_extension) {
            info!(?source, "source is already a payload file");
            if let Some(tx) = &progress {
                tx.send(ExtractionProgress::PayloadReady {
                    path: source.to_path_buf(),
                })
                .ok();
            }
            return Ok(ExtractionOutcome {
                payload_path: source.to_path_buf(),
                scratch_directory: None,
            });
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let scratch = scratch::create_scratch_dir(&self.config).await?;
        info!(?source, ?scratch, "extracting submission archive");
        if let Some(tx) = &progress {
            tx.send(ExtractionProgress::Started {
                source: source.to_path_buf(),
            })
            .ok();
        }

        let config = self.config.clone();
        let source_owned = source.to_path_buf();
        let scratch_bg = scratch.clone();
        let cancel_bg = cancel.clone();
        let password_owned = password.map(str::to_owned);
        let progress_bg = progress.clone();

        // Archive libraries are synchronous; keep them off the async workers
        let result = tokio::task::spawn_blocking(move || {
            Self::extract_blocking(
                &source_owned,
                &scratch_bg,
                password_owned.as_deref(),
                &config,
                progress_bg.as_ref(),
                &cancel_bg,
            )
        })
        .await
        .map_err(|e| Error::Other(format!("extraction task panicked: {}", e)))
        .and_then(|r| r);

        match result {
            Ok(payload_path) => {
                info!(?source, ?payload_path, "payload located");
                if let Some(tx) = &progress {
                    tx.send(ExtractionProgress::PayloadLocated {
                        path: payload_path.clone(),
                    })
                    .ok();
                }
                Ok(ExtractionOutcome {
                    payload_path,
                    scratch_directory: Some(scratch),
                })
            }
            Err(e) => {
                warn!(?source, error = %e, "extraction failed");
                let cleanup = scratch.clone();
                tokio::task::spawn_blocking(move || remove_scratch_dir(&cleanup))
                    .await
                    .ok();
                Err(e)
            }
        }
    }

    fn extract_blocking(
        source: &Path,
        scratch: &Path,
        password: Option<&str>,
        config: &ExtractionConfig,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let mut ctx = ExtractContext::new(scratch, password, config, progress, cancel);
        extract_recursive(source, &mut ctx, 0)?;
        ctx.check_cancelled()?;

        select_payload(scratch, &config.payload_extension)?.ok_or_else(|| {
            ExtractionError::PayloadNotFound {
                source_path: source.to_path_buf(),
                extension: config.payload_extension.clone(),
            }
            .into()
        })
    }
}
