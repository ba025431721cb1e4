//! Ordered local resolution strategies
//!
//! Each strategy either produces a local artifact copy inside the cache
//! directory, reports that it found nothing, or fails. The manager tries them
//! in order and stops at the first copy.

use crate::config::AcquisitionConfig;
use crate::error::{Error, Result};
use crate::types::ArtifactOrigin;
use crate::utils::{has_extension, keyword_score};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

use super::metadata::ArtifactMetadata;

/// Inputs shared by all strategies during one acquisition
pub(crate) struct ResolveContext<'a> {
    pub(crate) config: &'a AcquisitionConfig,
    pub(crate) metadata: Option<&'a ArtifactMetadata>,
}

/// A usable artifact copy in the cache directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LocalArtifact {
    pub(crate) path: PathBuf,
    pub(crate) origin: ArtifactOrigin,
}

/// One step of the local resolution chain
#[async_trait]
pub(crate) trait ResolutionStrategy: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Produce a cache copy, `Ok(None)` when this step has nothing to offer
    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<Option<LocalArtifact>>;
}

/// The default chain: cache directory, bundle, known user folders
pub(crate) fn default_strategies() -> Vec<Box<dyn ResolutionStrategy>> {
    vec![
        Box::new(CacheDirectory),
        Box::new(BundleSeed),
        Box::new(KnownFolderSeed),
    ]
}

/// Look for an existing copy in the cache directory
pub(crate) struct CacheDirectory;

#[async_trait]
impl ResolutionStrategy for CacheDirectory {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<Option<LocalArtifact>> {
        let path = resolve_cache_path(ctx.config, ctx.metadata);
        if tokio::fs::try_exists(&path).await? {
            Ok(Some(LocalArtifact {
                path,
                origin: ArtifactOrigin::Cache,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Copy the best artifact shipped with the application into the cache
pub(crate) struct BundleSeed;

#[async_trait]
impl ResolutionStrategy for BundleSeed {
    fn name(&self) -> &'static str {
        "bundle"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<Option<LocalArtifact>> {
        seed_from(ctx.config, &ctx.config.bundle_dirs, ArtifactOrigin::Bundle).await
    }
}

/// Copy the best artifact found in conventional user folders into the cache
pub(crate) struct KnownFolderSeed;

#[async_trait]
impl ResolutionStrategy for KnownFolderSeed {
    fn name(&self) -> &'static str {
        "known_folders"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<Option<LocalArtifact>> {
        seed_from(ctx.config, &ctx.config.known_folders, ArtifactOrigin::KnownFolder).await
    }
}

async fn seed_from(
    config: &AcquisitionConfig,
    dirs: &[PathBuf],
    origin: ArtifactOrigin,
) -> Result<Option<LocalArtifact>> {
    if dirs.is_empty() {
        return Ok(None);
    }

    let search_config = config.clone();
    let search_dirs = dirs.to_vec();
    let candidate =
        tokio::task::spawn_blocking(move || best_candidate(&search_dirs, &search_config))
            .await
            .map_err(|e| Error::Other(format!("artifact search task panicked: {}", e)))?;

    let Some(source) = candidate else {
        debug!(?origin, "no seed candidate found");
        return Ok(None);
    };

    let file_name = source
        .file_name()
        .ok_or_else(|| Error::Other(format!("seed candidate {} has no file name", source.display())))?;
    let dest = config.cache_dir.join(file_name);

    tokio::fs::create_dir_all(&config.cache_dir).await?;
    tokio::fs::copy(&source, &dest).await?;
    info!(?origin, ?source, ?dest, "seeded artifact into cache directory");

    Ok(Some(LocalArtifact { path: dest, origin }))
}

/// Resolve the cache copy path from metadata and directory contents
///
/// Order: file named by metadata, default file name, most recently modified
/// file with the artifact extension, and finally the default path (which may
/// not exist).
pub(crate) fn resolve_cache_path(
    config: &AcquisitionConfig,
    metadata: Option<&ArtifactMetadata>,
) -> PathBuf {
    if let Some(name) = metadata.and_then(ArtifactMetadata::safe_file_name) {
        let candidate = config.cache_dir.join(name);
        if candidate.is_file() {
            return candidate;
        }
    }

    let default_path = config.default_artifact_path();
    if default_path.is_file() {
        return default_path;
    }

    list_artifacts(&config.cache_dir, &config.artifact_extension)
        .into_iter()
        .max_by(|(path_a, mod_a), (path_b, mod_b)| compare_recency(path_a, *mod_a, path_b, *mod_b))
        .map(|(path, _)| path)
        .unwrap_or(default_path)
}

/// Best keyword-scored artifact across `dirs`, searched non-recursively
///
/// Only names with a positive keyword score qualify. Ties on score go to the
/// most recently modified file, then to the greater file name.
pub(crate) fn best_candidate(dirs: &[PathBuf], config: &AcquisitionConfig) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| list_artifacts(dir, &config.artifact_extension))
        .filter_map(|(path, modified)| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            let score = keyword_score(&name, &config.keywords);
            (score > 0).then_some((score, path, modified))
        })
        .max_by(|(score_a, path_a, mod_a), (score_b, path_b, mod_b)| {
            score_a
                .cmp(score_b)
                .then_with(|| compare_recency(path_a, *mod_a, path_b, *mod_b))
        })
        .map(|(_, path, _)| path)
}

/// Files with the artifact extension directly inside `dir`, with their
/// modification times; an unreadable directory yields nothing
fn list_artifacts(dir: &Path, extension: &str) -> Vec<(PathBuf, SystemTime)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, extension))
        .map(|path| {
            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (path, modified)
        })
        .collect()
}

fn compare_recency(path_a: &Path, mod_a: SystemTime, path_b: &Path, mod_b: SystemTime) -> Ordering {
    mod_a
        .cmp(&mod_b)
        .then_with(|| path_a.file_name().cmp(&path_b.file_name()))
}
