use crate::config::ExtractionConfig;
use crate::error::{Error, ExtractionError, Result};
use crate::types::{ArchiveType, ExtractionProgress};
use crate::utils::has_extension;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ProgressSender;
use super::rar::RarExtractor;
use super::sevenz::SevenZipExtractor;
use super::tar::TarExtractor;
use super::zip::ZipExtractor;

/// State shared by every level of one extraction call
///
/// Holds no depth: depth travels by value through [`extract_recursive`].
pub(crate) struct ExtractContext<'a> {
    pub(crate) scratch_root: &'a Path,
    pub(crate) password: Option<&'a str>,
    pub(crate) config: &'a ExtractionConfig,
    progress: Option<&'a ProgressSender>,
    cancel: &'a CancellationToken,
    written: u64,
}

impl<'a> ExtractContext<'a> {
    pub(crate) fn new(
        scratch_root: &'a Path,
        password: Option<&'a str>,
        config: &'a ExtractionConfig,
        progress: Option<&'a ProgressSender>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            scratch_root,
            password: password.filter(|p| !p.is_empty()),
            config,
            progress,
            cancel,
            written: 0,
        }
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Send a progress notification; a dropped receiver is ignored
    pub(crate) fn emit(&self, progress: ExtractionProgress) {
        if let Some(tx) = self.progress {
            tx.send(progress).ok();
        }
    }

    /// Bytes that may still be written before the size limit trips
    pub(crate) fn remaining(&self) -> u64 {
        self.config.max_extracted_bytes.saturating_sub(self.written)
    }

    /// Account for bytes written by a reader that extracts on its own
    pub(crate) fn record_written(&mut self, bytes: u64, archive: &Path) -> Result<()> {
        self.written = self.written.saturating_add(bytes);
        self.check_size_limit(archive)
    }

    /// Copy one entry to disk, reading at most one byte past the size limit
    ///
    /// The overflow byte is what lets [`Self::check_size_limit`] trip.
    pub(crate) fn copy_entry(
        &mut self,
        reader: &mut dyn Read,
        writer: &mut dyn Write,
    ) -> std::io::Result<u64> {
        let mut limited = reader.take(self.remaining().saturating_add(1));
        let written = std::io::copy(&mut limited, writer)?;
        self.written = self.written.saturating_add(written);
        Ok(written)
    }

    pub(crate) fn check_size_limit(&self, archive: &Path) -> Result<()> {
        if self.written > self.config.max_extracted_bytes {
            warn!(?archive, limit = self.config.max_extracted_bytes, "extraction size limit reached");
            return Err(ExtractionError::SizeLimitExceeded {
                archive: archive.to_path_buf(),
                limit: self.config.max_extracted_bytes,
            }
            .into());
        }
        Ok(())
    }
}

/// Build the error for an archive that cannot be read
pub(crate) fn corrupt(archive: &Path, reason: impl std::fmt::Display) -> Error {
    Error::Extraction(ExtractionError::CorruptArchive {
        archive: archive.to_path_buf(),
        reason: reason.to_string(),
    })
}

/// Map a reader error mentioning a password to the right password error
pub(crate) fn password_error(archive: &Path, password_supplied: bool) -> Error {
    if password_supplied {
        Error::Extraction(ExtractionError::WrongPassword {
            archive: archive.to_path_buf(),
        })
    } else {
        Error::Extraction(ExtractionError::PasswordRequired {
            archive: archive.to_path_buf(),
        })
    }
}

pub(crate) fn mentions_password(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("password") || lower.contains("encrypted")
}

/// Keep only the normal components of an entry path
///
/// Returns `None` for entries with nothing left (e.g. `../..`), which callers
/// skip instead of writing outside the scratch directory.
pub(crate) fn sanitize_entry_path(entry: &Path) -> Option<PathBuf> {
    let sanitized = entry
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect::<PathBuf>();
    if sanitized.as_os_str().is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Detect archive type by file extension
///
/// `.gz` is a tarball when the stem ends in `.tar`, a single compressed file
/// otherwise.
pub fn detect_archive_type(path: &Path) -> Option<ArchiveType> {
    let ext = path.extension()?.to_str()?.to_lowercase();

    match ext.as_str() {
        "zip" => Some(ArchiveType::Zip),
        "7z" => Some(ArchiveType::SevenZip),
        "rar" => Some(ArchiveType::Rar),
        "tar" => Some(ArchiveType::Tar),
        "tgz" => Some(ArchiveType::TarGz),
        "gz" => {
            let stem = Path::new(path.file_stem()?);
            if has_extension(stem, "tar") {
                Some(ArchiveType::TarGz)
            } else {
                Some(ArchiveType::Gzip)
            }
        }
        _ => None,
    }
}

/// Detect archive type from the leading bytes of a file
pub fn sniff_archive_type(path: &Path) -> Option<ArchiveType> {
    let mut header = [0u8; 262];
    let mut file = std::fs::File::open(path).ok()?;
    let mut read = 0;
    while read < header.len() {
        match file.read(&mut header[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(_) => return None,
        }
    }
    let header = &header[..read];

    if header.starts_with(b"PK\x03\x04") || header.starts_with(b"PK\x05\x06") {
        Some(ArchiveType::Zip)
    } else if header.starts_with(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]) {
        Some(ArchiveType::SevenZip)
    } else if header.starts_with(b"Rar!\x1A\x07") {
        Some(ArchiveType::Rar)
    } else if header.starts_with(&[0x1F, 0x8B]) {
        Some(ArchiveType::Gzip)
    } else if header.len() >= 262 && &header[257..262] == b"ustar" {
        Some(ArchiveType::Tar)
    } else {
        None
    }
}

/// Check if a file is a nested container based on its extension
pub fn is_archive(path: &Path, archive_extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| archive_extensions.iter().any(|ae| ae.to_lowercase() == ext))
}

/// Unpack `archive_path`, then recurse into every extracted file that is
/// itself a container
///
/// The source (depth 0) unpacks into the scratch root; every nested container
/// unpacks into its own directory next to it, so an entry can never overwrite
/// the archive still being read. A container found at a depth greater than
/// `max_depth` fails the whole call with `TooDeeplyNested`.
pub(crate) fn extract_recursive(
    archive_path: &Path,
    ctx: &mut ExtractContext<'_>,
    depth: u32,
) -> Result<()> {
    if depth > ctx.config.max_depth {
        warn!(?archive_path, depth, max_depth = ctx.config.max_depth, "archive nested too deeply");
        return Err(ExtractionError::TooDeeplyNested {
            archive: archive_path.to_path_buf(),
            max_depth: ctx.config.max_depth,
        }
        .into());
    }
    ctx.check_cancelled()?;

    let archive_type = detect_archive_type(archive_path)
        .or_else(|| sniff_archive_type(archive_path))
        .ok_or_else(|| corrupt(archive_path, "unrecognized container format"))?;

    debug!(?archive_path, ?archive_type, depth, "extracting container");

    let dest = if depth == 0 {
        ctx.scratch_root.to_path_buf()
    } else {
        nested_destination(archive_path)?
    };
    let extracted = match archive_type {
        ArchiveType::Zip => ZipExtractor::extract(archive_path, &dest, ctx)?,
        ArchiveType::SevenZip => SevenZipExtractor::extract(archive_path, &dest, ctx)?,
        ArchiveType::Rar => RarExtractor::extract(archive_path, &dest, ctx)?,
        ArchiveType::Tar | ArchiveType::TarGz | ArchiveType::Gzip => {
            TarExtractor::extract(archive_path, archive_type, &dest, ctx)?
        }
    };
    ctx.check_size_limit(archive_path)?;

    info!(
        ?archive_path,
        extracted_count = extracted.len(),
        depth,
        "extracted {} files at depth {}",
        extracted.len(),
        depth
    );

    for file in &extracted {
        if is_archive(file, &ctx.config.archive_extensions) {
            let entry = file
                .strip_prefix(ctx.scratch_root)
                .unwrap_or(file)
                .display()
                .to_string();
            debug!(?file, depth = depth + 1, "found nested archive");
            ctx.emit(ExtractionProgress::NestedArchive {
                entry,
                depth: depth + 1,
            });
            extract_recursive(file, ctx, depth + 1)?;
        }
    }

    Ok(())
}

const MAX_DESTINATION_ATTEMPTS: u32 = 1000;

/// Create a fresh directory for a nested container: `<name>.d`, or
/// `<name>.d-N` when that name is already taken
fn nested_destination(archive_path: &Path) -> Result<PathBuf> {
    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "nested".to_string());

    for attempt in 0..MAX_DESTINATION_ATTEMPTS {
        let candidate = if attempt == 0 {
            archive_path.with_file_name(format!("{}.d", name))
        } else {
            archive_path.with_file_name(format!("{}.d-{}", name, attempt))
        };
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Err(corrupt(archive_path, "no free directory name to unpack into"))
}

/// Recursively collect all files (not directories) below a directory
pub(crate) fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    fn visit_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                visit_dir(&path, files)?;
            } else {
                files.push(path);
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    visit_dir(dir, &mut files)?;
    Ok(files)
}

/// Pick the payload in an unpacked tree: the most recently written file with
/// the payload extension, ties broken by the greater path
pub fn select_payload(dir: &Path, extension: &str) -> Result<Option<PathBuf>> {
    let candidates = collect_files(dir)?
        .into_iter()
        .filter(|p| has_extension(p, extension))
        .map(|p| {
            let modified = std::fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, p)
        });

    Ok(candidates.max().map(|(_, path)| path))
}
