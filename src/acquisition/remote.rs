//! Conditional refresh against the remote artifact endpoint

use crate::config::AcquisitionConfig;
use crate::error::{AcquisitionError, Error, Result};
use crate::retry::with_retry;
use crate::utils::{content_disposition_filename, file_modified_utc, paths_are_same};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_DISPOSITION, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::metadata::{ArtifactMetadata, CacheValidator, MetadataStore};

/// What the remote endpoint told us
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RemoteOutcome {
    /// The local copy is current
    NotModified,
    /// A new copy was saved
    Downloaded {
        path: PathBuf,
        remote_timestamp: Option<DateTime<Utc>>,
    },
}

/// Performs one conditional refresh
pub(crate) struct RemoteRefresh<'a> {
    pub(crate) client: &'a reqwest::Client,
    pub(crate) config: &'a AcquisitionConfig,
    pub(crate) store: &'a MetadataStore,
}

impl RemoteRefresh<'_> {
    /// Ask the endpoint for a newer copy than the one described by `metadata`
    ///
    /// `local` is the existing cache copy, if any. A `304` without one is
    /// followed by a single unconditional request.
    pub(crate) async fn run(
        &self,
        url: &str,
        metadata: Option<&ArtifactMetadata>,
        local: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<RemoteOutcome> {
        let validator = metadata.and_then(ArtifactMetadata::cache_validator);
        debug!(url, ?validator, "checking remote artifact");

        let mut response = self.fetch(url, validator.as_ref(), cancel).await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            if local.is_some() {
                info!(url, "remote artifact not modified");
                return Ok(RemoteOutcome::NotModified);
            }
            warn!(url, "remote reported not modified but no local copy exists, fetching unconditionally");
            response = self.fetch(url, None, cancel).await?;
            if response.status() == StatusCode::NOT_MODIFIED {
                return Err(AcquisitionError::RemoteRejected {
                    status: StatusCode::NOT_MODIFIED.as_u16(),
                    reason: "not modified without a local copy".to_string(),
                }
                .into());
            }
        }

        self.save(response, metadata, local, cancel).await
    }

    /// Send the request with retries; only 200-class and 304 responses
    /// come back as `Ok`
    async fn fetch(
        &self,
        url: &str,
        validator: Option<&CacheValidator>,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let attempt = move || async move {
            let mut request = self.client.get(url);
            match validator {
                Some(CacheValidator::ETag(etag)) => {
                    request = request.header(IF_NONE_MATCH, etag.as_str());
                }
                Some(CacheValidator::LastModified(ts)) => {
                    request = request.header(IF_MODIFIED_SINCE, http_date(*ts));
                }
                None => {}
            }

            let response = request.send().await.map_err(AcquisitionError::from)?;
            let status = response.status();
            if status.is_success() || status == StatusCode::NOT_MODIFIED {
                Ok(response)
            } else {
                Err(AcquisitionError::RemoteRejected {
                    status: status.as_u16(),
                    reason: status.canonical_reason().unwrap_or("unknown").to_string(),
                })
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = with_retry(&self.config.retry, attempt) => result.map_err(Error::from),
        }
    }

    async fn save(
        &self,
        mut response: reqwest::Response,
        previous: Option<&ArtifactMetadata>,
        local: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<RemoteOutcome> {
        let headers = response.headers();
        let remote_name = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(content_disposition_filename);
        let etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let remote_timestamp = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);

        let file_name = remote_name
            .or_else(|| previous.and_then(ArtifactMetadata::safe_file_name).map(str::to_string))
            .unwrap_or_else(|| self.config.default_file_name.clone());
        let cache_dir = &self.config.cache_dir;
        let target = cache_dir.join(&file_name);

        tokio::fs::create_dir_all(cache_dir).await?;
        let tmp = cache_dir.join(format!(".{}.{:08x}.download", file_name, rand::random::<u32>()));

        let written = match self.stream_to(&mut response, &tmp, cancel).await {
            Ok(n) => n,
            Err(e) => {
                remove_quietly(&tmp).await;
                return Err(e);
            }
        };
        debug!(?tmp, bytes = written, "downloaded artifact to temporary file");

        if self.config.verify_download
            && let Err(reason) = verify_container(&tmp).await
        {
            warn!(?tmp, %reason, "downloaded artifact failed verification");
            remove_quietly(&tmp).await;
            return Err(AcquisitionError::InvalidArtifact { path: tmp, reason }.into());
        }

        if self.config.keep_backup && tokio::fs::try_exists(&target).await.unwrap_or(false) {
            let mut backup = target.clone().into_os_string();
            backup.push(".bak");
            if let Err(e) = tokio::fs::copy(&target, &backup).await {
                warn!(?target, error = %e, "failed to back up existing artifact");
            }
        }

        let replaced = tokio::fs::copy(&tmp, &target).await;
        remove_quietly(&tmp).await;
        replaced?;

        let metadata = ArtifactMetadata {
            file_name: file_name.clone(),
            etag,
            last_modified: remote_timestamp.or_else(|| file_modified_utc(&target)),
        };
        self.store.save(&metadata).await?;

        // The previous copy under another name is superseded
        let old = previous
            .and_then(ArtifactMetadata::safe_file_name)
            .map(|name| cache_dir.join(name))
            .into_iter()
            .chain(local.map(Path::to_path_buf));
        for old_path in old {
            if old_path.starts_with(cache_dir)
                && !paths_are_same(&old_path, &target)
                && tokio::fs::try_exists(&old_path).await.unwrap_or(false)
            {
                match tokio::fs::remove_file(&old_path).await {
                    Ok(()) => debug!(?old_path, "removed superseded artifact"),
                    Err(e) => warn!(?old_path, error = %e, "failed to remove superseded artifact"),
                }
            }
        }

        info!(path = ?target, bytes = written, ?remote_timestamp, "saved new artifact version");
        Ok(RemoteOutcome::Downloaded {
            path: target,
            remote_timestamp,
        })
    }

    /// Stream the body to `path`, checking for cancellation between chunks
    async fn stream_to(
        &self,
        response: &mut reqwest::Response,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                chunk = response.chunk() => chunk.map_err(AcquisitionError::from)?,
            };
            let Some(chunk) = chunk else { break };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        Ok(written)
    }
}

/// A jar is a zip container; anything else is not worth keeping
async fn verify_container(path: &Path) -> std::result::Result<(), String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path).map_err(|e| e.to_string())?;
        let archive = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;
        if archive.len() == 0 {
            return Err("archive has no entries".to_string());
        }
        Ok(())
    })
    .await
    .map_err(|e| format!("verification task panicked: {}", e))?
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(?path, error = %e, "failed to remove temporary file");
    }
}

/// IMF-fixdate as used by `If-Modified-Since`
pub(crate) fn http_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub(crate) fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
