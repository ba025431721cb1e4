use crate::error::Result;
use crate::types::ExtractionProgress;
use std::collections::HashSet;
use sevenz_rust::SevenZMethod;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::shared::{ExtractContext, collect_files, corrupt, mentions_password, password_error};

/// Archive extractor for 7z files
pub struct SevenZipExtractor;

impl SevenZipExtractor {
    /// Extract a 7z archive into `dest_path`
    ///
    /// The decoder writes the whole archive at once, so cancellation is only
    /// observed before it starts and the size limit is checked afterwards.
    pub(crate) fn extract(
        archive_path: &Path,
        dest_path: &Path,
        ctx: &mut ExtractContext<'_>,
    ) -> Result<Vec<PathBuf>> {
        debug!(
            ?archive_path,
            has_password = ctx.password.is_some(),
            ?dest_path,
            "attempting 7z extraction"
        );
        ctx.check_cancelled()?;

        let before: HashSet<PathBuf> = collect_files(dest_path)?.into_iter().collect();

        use sevenz_rust::Password;
        let result = match ctx.password {
            None => sevenz_rust::decompress_file(archive_path, dest_path),
            Some(password) => sevenz_rust::decompress_file_with_password(
                archive_path,
                dest_path,
                Password::from(password),
            ),
        };

        if let Err(e) = result {
            let password_supplied = ctx.password.is_some();
            // A wrong AES key surfaces as a decoder error, not a password error
            let locked = mentions_password(&e.to_string())
                || (password_supplied && Self::has_encrypted_content(archive_path));
            return Err(if locked {
                password_error(archive_path, password_supplied)
            } else {
                corrupt(archive_path, format!("failed to extract 7z archive: {}", e))
            });
        }

        Self::validate_extracted_paths(dest_path, archive_path)?;

        let extracted_files: Vec<PathBuf> = collect_files(dest_path)?
            .into_iter()
            .filter(|p| !before.contains(p))
            .collect();

        let bytes = extracted_files
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();
        ctx.record_written(bytes, archive_path)?;

        for file in &extracted_files {
            let entry = file.strip_prefix(dest_path).unwrap_or(file);
            ctx.emit(ExtractionProgress::EntryExtracted {
                entry: entry.display().to_string(),
            });
        }

        Ok(extracted_files)
    }

    /// Whether any folder of the archive goes through the AES coder
    ///
    /// Archives with encrypted headers cannot even be listed without the
    /// password, which also counts as encrypted.
    fn has_encrypted_content(archive_path: &Path) -> bool {
        match sevenz_rust::Archive::open(archive_path) {
            Ok(archive) => archive
                .folders
                .iter()
                .flat_map(|folder| folder.coders.iter())
                .any(|coder| coder.decompression_method_id() == SevenZMethod::ID_AES256SHA256),
            Err(e) => mentions_password(&e.to_string()),
        }
    }

    /// Validate that all extracted files are within the destination directory
    fn validate_extracted_paths(dest_path: &Path, archive_path: &Path) -> Result<()> {
        let canonical_dest = dest_path.canonicalize()?;

        fn check_dir(dir: &Path, canonical_dest: &Path, archive_path: &Path) -> Result<()> {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                let canonical = path.canonicalize()?;

                if !canonical.starts_with(canonical_dest) {
                    return Err(corrupt(
                        archive_path,
                        format!(
                            "path traversal detected: extracted file {:?} is outside destination",
                            canonical
                        ),
                    ));
                }

                if path.is_dir() {
                    check_dir(&path, canonical_dest, archive_path)?;
                }
            }
            Ok(())
        }

        check_dir(dest_path, &canonical_dest, archive_path)
    }
}
