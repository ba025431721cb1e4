use crate::error::{Error, Result};
use crate::types::ExtractionProgress;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::shared::{ExtractContext, corrupt, mentions_password, password_error};

/// Archive extractor for ZIP files
pub struct ZipExtractor;

impl ZipExtractor {
    /// Open a ZIP entry by index, decrypting with the context password if any
    fn open_zip_entry<'a>(
        archive: &'a mut zip::ZipArchive<std::fs::File>,
        index: usize,
        password: Option<&str>,
        archive_path: &Path,
    ) -> Result<zip::read::ZipFile<'a>> {
        let map_err = |e: zip::result::ZipError| {
            let err_str = e.to_string();
            if mentions_password(&err_str) {
                password_error(archive_path, password.is_some())
            } else {
                corrupt(archive_path, format!("failed to read ZIP entry: {}", e))
            }
        };

        match password {
            None => archive.by_index(index).map_err(map_err),
            Some(password) => archive
                .by_index_decrypt(index, password.as_bytes())
                .map_err(map_err)?
                .map_err(|_| password_error(archive_path, true)),
        }
    }

    /// Extract a single ZIP entry to disk, creating directories as needed
    fn extract_zip_entry(
        file: &mut zip::read::ZipFile<'_>,
        dest_path: &Path,
        archive_path: &Path,
        ctx: &mut ExtractContext<'_>,
    ) -> Result<Option<PathBuf>> {
        let relative = match file.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                warn!(?archive_path, entry = file.name(), "skipping entry with unsafe path");
                return Ok(None);
            }
        };
        let file_path = dest_path.join(&relative);

        if file.is_dir() {
            std::fs::create_dir_all(&file_path)?;
            return Ok(None);
        }

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = std::fs::File::create(&file_path)?;

        let password_supplied = ctx.password.is_some();
        ctx.copy_entry(file, &mut outfile).map_err(|e| {
            let err_str = e.to_string();
            // ZipCrypto only checks one header byte, so a wrong password can
            // get this far and fail on the entry checksum instead.
            if mentions_password(&err_str)
                || (password_supplied && err_str.to_lowercase().contains("checksum"))
            {
                password_error(archive_path, password_supplied)
            } else {
                corrupt(archive_path, format!("failed to extract entry: {}", e))
            }
        })?;
        ctx.check_size_limit(archive_path)?;

        ctx.emit(ExtractionProgress::EntryExtracted {
            entry: relative.display().to_string(),
        });
        Ok(Some(file_path))
    }

    /// Extract every entry of a ZIP archive into `dest_path`
    pub(crate) fn extract(
        archive_path: &Path,
        dest_path: &Path,
        ctx: &mut ExtractContext<'_>,
    ) -> Result<Vec<PathBuf>> {
        debug!(
            ?archive_path,
            has_password = ctx.password.is_some(),
            ?dest_path,
            "attempting ZIP extraction"
        );

        let file = std::fs::File::open(archive_path).map_err(Error::Io)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| corrupt(archive_path, format!("failed to read ZIP archive: {}", e)))?;

        let mut extracted_files = Vec::new();
        for i in 0..archive.len() {
            ctx.check_cancelled()?;
            let mut file = Self::open_zip_entry(&mut archive, i, ctx.password, archive_path)?;
            if let Some(file_path) = Self::extract_zip_entry(&mut file, dest_path, archive_path, ctx)? {
                extracted_files.push(file_path);
            }
        }

        Ok(extracted_files)
    }
}
