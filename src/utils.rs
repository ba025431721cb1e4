//! Utility functions for file operations, headers and path manipulation

use crate::config::ArtifactKeyword;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Extract the file name from a Content-Disposition header value
///
/// Understands `filename*=charset'lang'encoded` (RFC 5987, preferred) and
/// `filename="..."`. The result is reduced to its final path component, so a
/// hostile header cannot point outside the directory it is saved into.
///
/// # Examples
///
/// ```
/// use saft_submit::utils::content_disposition_filename;
///
/// assert_eq!(
///     content_disposition_filename(r#"attachment; filename="EnviaSaft.jar""#).as_deref(),
///     Some("EnviaSaft.jar")
/// );
/// assert_eq!(content_disposition_filename("inline"), None);
/// ```
pub fn content_disposition_filename(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in value.split(';') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("filename*=") {
            // Format is: charset'lang'encoded-filename
            let encoded = rest.rfind('\'').map_or(rest, |idx| &rest[idx + 1..]);
            if let Ok(decoded) = urlencoding::decode(encoded.trim_matches('"')) {
                extended = Some(decoded.into_owned());
            }
        } else if let Some(rest) = part.strip_prefix("filename=") {
            plain = Some(rest.trim_matches('"').to_string());
        }
    }

    extended
        .or(plain)
        .and_then(|name| sanitize_file_name(&name))
}

/// Reduce a remote-supplied name to a bare file name
fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(last.to_string())
}

/// Last modification time of a file in UTC, if it can be read
pub fn file_modified_utc(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

/// Whether two paths name the same file
///
/// Falls back to a case-insensitive comparison of the raw paths when either
/// side cannot be canonicalized (e.g. it does not exist yet).
pub fn paths_are_same(first: &Path, second: &Path) -> bool {
    match (first.canonicalize(), second.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => {
            let a = first.to_string_lossy().trim_end_matches(['/', '\\']).to_lowercase();
            let b = second.to_string_lossy().trim_end_matches(['/', '\\']).to_lowercase();
            a == b
        }
    }
}

/// Make a path absolute against the current directory without touching the
/// filesystem
pub fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Score a file name against artifact-family keywords
///
/// Each keyword contained in the name (case-insensitive) adds its weight; a
/// score of zero means the file is not a candidate.
pub fn keyword_score(file_name: &str, keywords: &[ArtifactKeyword]) -> u32 {
    let name = file_name.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.keyword.is_empty() && name.contains(&k.keyword.to_lowercase()))
        .map(|k| k.weight)
        .sum()
}

/// Whether a path has the given extension (case-insensitive, no dot)
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Local-time rendering used in user messages ("dd/mm/yyyy HH:MM")
pub fn format_local_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&chrono::Local)
        .format("%d/%m/%Y %H:%M")
        .to_string()
}

/// File name component as a string, or the whole path when there is none
pub fn display_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
