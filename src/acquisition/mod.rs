//! Artifact acquisition and caching
//!
//! [`ArtifactManager::ensure_latest`] makes sure a runnable copy of the
//! submission tool exists in the cache directory:
//!
//! 1. resolve the cache copy (metadata name, default name, newest jar)
//! 2. otherwise seed it from the application bundle
//! 3. otherwise seed it from the user's downloads, documents or desktop
//! 4. refresh it from the remote endpoint with a conditional request
//!
//! Any failure in steps 2-4 is logged and the next step is tried. A local
//! copy whose freshness could not be verified is still used, flagged as a
//! fallback. Only the absence of any local copy is reported as a failure.

mod metadata;
mod remember;
mod remote;
mod strategy;


pub use metadata::{ArtifactMetadata, CacheValidator, MetadataStore};
pub use remember::{RememberedArtifact, extract_artifact_path};

use crate::config::AcquisitionConfig;
use crate::error::{AcquisitionError, Error, Result};
use crate::types::{AcquisitionResult, ArtifactOrigin};
use crate::utils::{display_file_name, file_modified_utc, format_local_timestamp};
use chrono::{DateTime, Utc};
use remote::{RemoteOutcome, RemoteRefresh};
use std::path::{Path, PathBuf};
use strategy::{LocalArtifact, ResolveContext, best_candidate, default_strategies, resolve_cache_path};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Keeps the cached artifact present and current
///
/// One manager per cache directory: calls to [`ArtifactManager::ensure_latest`]
/// and [`ArtifactManager::remember_artifact`] on the same instance are
/// serialized.
#[derive(Debug)]
pub struct ArtifactManager {
    config: AcquisitionConfig,
    client: reqwest::Client,
    store: MetadataStore,
    lock: Mutex<()>,
}

impl ArtifactManager {
    /// Create a manager; builds the HTTP client with the configured timeout
    /// and user agent
    pub fn new(config: AcquisitionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        let store = MetadataStore::new(config.cache_dir.join(config.metadata_file_name()));

        Ok(Self {
            config,
            client,
            store,
            lock: Mutex::new(()),
        })
    }

    /// The active configuration
    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// The metadata side file used by this manager
    pub fn metadata_store(&self) -> &MetadataStore {
        &self.store
    }

    /// Best local artifact path, without network access or copying
    ///
    /// The cache copy if present, else the best bundled candidate in place,
    /// else the default cache path (which may not exist).
    pub fn local_artifact_path(&self) -> PathBuf {
        let metadata = self.store.load_blocking();
        let cached = resolve_cache_path(&self.config, metadata.as_ref());
        if cached.is_file() {
            return cached;
        }

        best_candidate(&self.config.bundle_dirs, &self.config)
            .unwrap_or_else(|| self.config.default_artifact_path())
    }

    /// Make sure a usable artifact exists and is as fresh as can be verified
    ///
    /// Never fails outright: problems are reported through the returned
    /// [`AcquisitionResult`].
    pub async fn ensure_latest(&self, cancel: &CancellationToken) -> AcquisitionResult {
        let _guard = self.lock.lock().await;

        if let Err(e) = tokio::fs::create_dir_all(&self.config.cache_dir).await {
            warn!(cache_dir = ?self.config.cache_dir, error = %e, "failed to create cache directory");
        }

        let mut metadata = self.store.load().await;
        let local = self.resolve_local(metadata.as_ref(), cancel).await;

        if let Some(found) = &local {
            metadata = self.heal_metadata(metadata, found).await;
        }

        if cancel.is_cancelled() {
            return self.without_refresh(local.as_ref(), metadata.as_ref(), Error::Cancelled);
        }

        let Some(url) = self.config.download_url.as_deref() else {
            debug!("remote checks disabled");
            return self.without_refresh(
                local.as_ref(),
                metadata.as_ref(),
                Error::Other("remote update checks are disabled".to_string()),
            );
        };

        let refresh = RemoteRefresh {
            client: &self.client,
            config: &self.config,
            store: &self.store,
        };
        let local_path = local.as_ref().map(|l| l.path.as_path());

        let outcome = refresh.run(url, metadata.as_ref(), local_path, cancel).await;

        match outcome {
            Ok(RemoteOutcome::NotModified) => {
                // run() only reports NotModified when a local copy exists
                let path = local
                    .map(|l| l.path)
                    .unwrap_or_else(|| self.config.default_artifact_path());
                let remote_timestamp = metadata.as_ref().and_then(|m| m.last_modified);
                let stamp = remote_timestamp.or_else(|| file_modified_utc(&path));
                AcquisitionResult {
                    success: true,
                    updated: false,
                    used_fallback: false,
                    user_message: up_to_date_message(&path, stamp),
                    resolved_path: path,
                    error_detail: None,
                    remote_timestamp,
                }
            }
            Ok(RemoteOutcome::Downloaded {
                path,
                remote_timestamp,
            }) => {
                let stamp = remote_timestamp.or_else(|| file_modified_utc(&path));
                AcquisitionResult {
                    success: true,
                    updated: true,
                    used_fallback: false,
                    user_message: downloaded_message(&path, stamp),
                    resolved_path: path,
                    error_detail: None,
                    remote_timestamp,
                }
            }
            Err(e) => {
                warn!(url, error = %e, "remote refresh failed");
                self.without_refresh(local.as_ref(), metadata.as_ref(), e)
            }
        }
    }

    /// Run the local strategies in order until one yields a copy
    async fn resolve_local(
        &self,
        metadata: Option<&ArtifactMetadata>,
        cancel: &CancellationToken,
    ) -> Option<LocalArtifact> {
        let ctx = ResolveContext {
            config: &self.config,
            metadata,
        };

        for strategy in default_strategies() {
            match strategy.resolve(&ctx).await {
                Ok(Some(found)) => {
                    info!(strategy = strategy.name(), path = ?found.path, "local artifact resolved");
                    return Some(found);
                }
                Ok(None) => debug!(strategy = strategy.name(), "no artifact from this step"),
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "resolution step failed, trying next")
                }
            }

            // The cache lookup always runs; seeding steps copy files
            if cancel.is_cancelled() {
                debug!("local resolution cancelled");
                return None;
            }
        }

        None
    }

    /// Rewrite metadata that does not describe the resolved copy
    ///
    /// Seeded copies always get fresh metadata without a timestamp, so the
    /// first remote check for them is unconditional.
    async fn heal_metadata(
        &self,
        metadata: Option<ArtifactMetadata>,
        found: &LocalArtifact,
    ) -> Option<ArtifactMetadata> {
        let file_name = display_file_name(&found.path);
        let matches = metadata
            .as_ref()
            .is_some_and(|m| m.file_name == file_name && found.origin == ArtifactOrigin::Cache);
        if matches {
            return metadata;
        }

        let last_modified = match found.origin {
            ArtifactOrigin::Cache => file_modified_utc(&found.path),
            _ => None,
        };
        let healed = ArtifactMetadata::local(file_name, last_modified);
        match self.store.save(&healed).await {
            Ok(()) => debug!(file_name = %healed.file_name, origin = ?found.origin, "artifact metadata rewritten"),
            Err(e) => warn!(error = %e, "failed to rewrite artifact metadata"),
        }
        Some(healed)
    }

    /// Result when the remote step did not produce a verdict
    fn without_refresh(
        &self,
        local: Option<&LocalArtifact>,
        metadata: Option<&ArtifactMetadata>,
        cause: Error,
    ) -> AcquisitionResult {
        let remote_timestamp = metadata.and_then(|m| m.last_modified);

        match local {
            Some(found) => {
                info!(path = ?found.path, cause = %cause, "using existing artifact copy");
                AcquisitionResult {
                    success: true,
                    updated: false,
                    used_fallback: true,
                    resolved_path: found.path.clone(),
                    user_message: fallback_message(&found.path),
                    error_detail: Some(cause.to_string()),
                    remote_timestamp,
                }
            }
            None => {
                let missing = AcquisitionError::NoLocalArtifact {
                    cache_dir: self.config.cache_dir.clone(),
                };
                warn!(error = %missing, cause = %cause, "no artifact available");
                AcquisitionResult {
                    success: false,
                    updated: false,
                    used_fallback: false,
                    resolved_path: self.config.default_artifact_path(),
                    user_message: failure_message(&self.config.default_file_name, &self.config.cache_dir),
                    error_detail: Some(format!("{}; {}", missing, cause)),
                    remote_timestamp,
                }
            }
        }
    }
}

fn stamp_suffix(stamp: Option<DateTime<Utc>>, label: &str) -> String {
    stamp
        .map(|ts| format!(" ({} {})", label, format_local_timestamp(ts)))
        .unwrap_or_default()
}

fn up_to_date_message(path: &Path, stamp: Option<DateTime<Utc>>) -> String {
    format!(
        "{} is already up to date{}.",
        display_file_name(path),
        stamp_suffix(stamp, "last updated")
    )
}

fn downloaded_message(path: &Path, stamp: Option<DateTime<Utc>>) -> String {
    format!(
        "Downloaded the latest version of {}{}.",
        display_file_name(path),
        stamp_suffix(stamp, "updated")
    )
}

fn fallback_message(path: &Path) -> String {
    format!(
        "Could not check for updates to {}; the existing copy will be used.",
        display_file_name(path)
    )
}

fn failure_message(file_name: &str, cache_dir: &Path) -> String {
    format!(
        "Could not prepare {}. Check your internet connection or place the artifact manually in {}.",
        file_name,
        cache_dir.display()
    )
}
