use crate::error::{Error, Result};
use crate::types::ExtractionProgress;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::shared::{ExtractContext, corrupt, password_error, sanitize_entry_path};

/// Archive extractor for RAR files
pub struct RarExtractor;

impl RarExtractor {
    /// Check if an unrar error indicates a password problem
    fn is_password_error(error_msg: &str) -> bool {
        let lower = error_msg.to_lowercase();
        lower.contains("password") || lower.contains("encrypted")
    }

    /// Convert an unrar error to our error type, checking for password errors
    fn convert_unrar_error(
        e: unrar::error::UnrarError,
        archive_path: &Path,
        password_supplied: bool,
    ) -> Error {
        let err_str = e.to_string();
        if Self::is_password_error(&err_str) {
            password_error(archive_path, password_supplied)
        } else {
            corrupt(archive_path, err_str)
        }
    }

    /// Extract a RAR archive into `dest_path`
    ///
    /// Entries whose names have no normal path component left after
    /// sanitizing (e.g. `../..`) are skipped.
    pub(crate) fn extract(
        archive_path: &Path,
        dest_path: &Path,
        ctx: &mut ExtractContext<'_>,
    ) -> Result<Vec<PathBuf>> {
        debug!(
            ?archive_path,
            has_password = ctx.password.is_some(),
            ?dest_path,
            "attempting RAR extraction"
        );
        let password_supplied = ctx.password.is_some();

        let archive = match ctx.password {
            None => unrar::Archive::new(archive_path),
            Some(password) => unrar::Archive::with_password(archive_path, password.as_bytes()),
        };

        let mut at_header = archive
            .open_for_processing()
            .map_err(|e| Self::convert_unrar_error(e, archive_path, password_supplied))?;

        let mut extracted_files = Vec::new();
        loop {
            ctx.check_cancelled()?;

            let at_file = match at_header.read_header() {
                Ok(Some(entry_processor)) => entry_processor,
                Ok(None) => break,
                Err(e) => return Err(Self::convert_unrar_error(e, archive_path, password_supplied)),
            };

            let header = at_file.entry();
            let is_directory = header.is_directory();

            let Some(sanitized) = sanitize_entry_path(Path::new(&header.filename)) else {
                warn!(?archive_path, "skipping entry with unsafe path");
                at_header = at_file
                    .skip()
                    .map_err(|e| corrupt(archive_path, format!("failed to skip unsafe entry: {}", e)))?;
                continue;
            };

            if is_directory {
                at_header = at_file
                    .skip()
                    .map_err(|e| corrupt(archive_path, format!("failed to skip directory: {}", e)))?;
                continue;
            }

            let file_path = dest_path.join(&sanitized);
            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            at_header = at_file
                .extract_to(&file_path)
                .map_err(|e| Self::convert_unrar_error(e, archive_path, password_supplied))?;

            let written = std::fs::metadata(&file_path).map(|m| m.len()).unwrap_or(0);
            ctx.record_written(written, archive_path)?;
            ctx.emit(ExtractionProgress::EntryExtracted {
                entry: sanitized.display().to_string(),
            });
            extracted_files.push(file_path);
        }

        Ok(extracted_files)
    }
}
