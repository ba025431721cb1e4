use crate::error::Result;
use crate::types::{ArchiveType, ExtractionProgress};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::shared::{ExtractContext, corrupt, sanitize_entry_path};

/// Extractor for tarballs (plain or gzip-compressed) and single `.gz` files
pub struct TarExtractor;

impl TarExtractor {
    /// Extract a tar, tar.gz or gz file into `dest_path`
    pub(crate) fn extract(
        archive_path: &Path,
        archive_type: ArchiveType,
        dest_path: &Path,
        ctx: &mut ExtractContext<'_>,
    ) -> Result<Vec<PathBuf>> {
        debug!(?archive_path, ?archive_type, ?dest_path, "attempting tar/gzip extraction");

        let file = File::open(archive_path)?;
        match archive_type {
            ArchiveType::Gzip => Self::extract_single(archive_path, GzDecoder::new(file), dest_path, ctx),
            ArchiveType::TarGz => {
                Self::extract_tar(archive_path, Box::new(GzDecoder::new(file)), dest_path, ctx)
            }
            _ => Self::extract_tar(archive_path, Box::new(file), dest_path, ctx),
        }
    }

    fn extract_tar(
        archive_path: &Path,
        reader: Box<dyn Read>,
        dest_path: &Path,
        ctx: &mut ExtractContext<'_>,
    ) -> Result<Vec<PathBuf>> {
        let mut archive: tar::Archive<Box<dyn Read>> = tar::Archive::new(reader);
        let entries = archive
            .entries()
            .map_err(|e| corrupt(archive_path, format!("failed to read tar archive: {}", e)))?;

        let mut extracted_files = Vec::new();
        for entry in entries {
            ctx.check_cancelled()?;
            let mut entry =
                entry.map_err(|e| corrupt(archive_path, format!("failed to read tar entry: {}", e)))?;

            let entry_type = entry.header().entry_type();
            let raw_path = entry
                .path()
                .map_err(|e| corrupt(archive_path, format!("invalid tar entry name: {}", e)))?
                .into_owned();

            let Some(relative) = sanitize_entry_path(&raw_path) else {
                warn!(?archive_path, entry = ?raw_path, "skipping entry with unsafe path");
                continue;
            };
            let file_path = dest_path.join(&relative);

            if entry_type.is_dir() {
                std::fs::create_dir_all(&file_path)?;
                continue;
            }
            if !entry_type.is_file() {
                // Links and special files never carry the payload
                debug!(?archive_path, entry = ?raw_path, "skipping non-regular tar entry");
                continue;
            }

            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&file_path)?;
            ctx.copy_entry(&mut entry, &mut outfile)
                .map_err(|e| corrupt(archive_path, format!("failed to extract entry: {}", e)))?;
            ctx.check_size_limit(archive_path)?;

            ctx.emit(ExtractionProgress::EntryExtracted {
                entry: relative.display().to_string(),
            });
            extracted_files.push(file_path);
        }

        Ok(extracted_files)
    }

    /// A bare `.gz` holds one file, named after the archive minus `.gz`
    fn extract_single(
        archive_path: &Path,
        mut decoder: GzDecoder<File>,
        dest_path: &Path,
        ctx: &mut ExtractContext<'_>,
    ) -> Result<Vec<PathBuf>> {
        let name = archive_path
            .file_stem()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("decompressed"));
        let file_path = dest_path.join(&name);

        let mut outfile = File::create(&file_path)?;
        ctx.copy_entry(&mut decoder, &mut outfile)
            .map_err(|e| corrupt(archive_path, format!("failed to decompress gzip stream: {}", e)))?;
        ctx.check_size_limit(archive_path)?;

        ctx.emit(ExtractionProgress::EntryExtracted {
            entry: name.display().to_string(),
        });
        Ok(vec![file_path])
    }
}
