use crate::config::ExtractionConfig;
use crate::error::{Error, ExtractionError};
use crate::extraction::*;
use crate::types::{ArchiveType, ExtractionProgress};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PAYLOAD: &[u8] = b"<?xml version=\"1.0\"?><AuditFile></AuditFile>";

fn test_config(dir: &TempDir) -> ExtractionConfig {
    ExtractionConfig {
        scratch_root: dir.path().join("scratch"),
        ..Default::default()
    }
}

/// Build an in-memory ZIP holding the given entries
fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ::zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    std::fs::write(archive_path, zip_bytes(files)).unwrap();
}

/// Create a password-encrypted ZIP using the deprecated ZipCrypto method
/// (only encryption method supported for writing by zip 0.6)
fn create_encrypted_zip(archive_path: &Path, file_name: &str, content: &[u8], password: &[u8]) {
    use ::zip::unstable::write::FileOptionsExt;
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options = ::zip::write::FileOptions::default()
        .compression_method(::zip::CompressionMethod::Stored)
        .with_deprecated_encryption(password);
    writer.start_file(file_name, options).unwrap();
    writer.write_all(content).unwrap();
    writer.finish().unwrap();
}

/// Build `levels` nested ZIPs; the innermost holds `saft.xml`
///
/// The returned archive sits at depth 0 and the innermost one at
/// `levels - 1`.
fn create_nested_chain(dir: &Path, levels: usize) -> PathBuf {
    assert!(levels >= 1);
    let mut bytes = zip_bytes(&[("saft.xml", PAYLOAD)]);
    for level in (1..levels).rev() {
        let inner_name = format!("level{}.zip", level);
        bytes = zip_bytes(&[(inner_name.as_str(), bytes.as_slice())]);
    }
    let outer = dir.join("level0.zip");
    std::fs::write(&outer, bytes).unwrap();
    outer
}

fn create_tar_gz(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = ::tar::Builder::new(encoder);
    for (name, content) in files {
        let mut header = ::tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn create_7z_archive(archive_path: &Path, source_dir: &Path) {
    sevenz_rust::compress_to_path(source_dir, archive_path).unwrap();
}

fn create_encrypted_7z(archive_path: &Path, source_dir: &Path, password: &str) {
    sevenz_rust::compress_to_path_encrypted(source_dir, archive_path, password.into()).unwrap();
}

fn extraction_error(result: crate::Result<crate::types::ExtractionOutcome>) -> ExtractionError {
    match result {
        Err(Error::Extraction(e)) => e,
        other => panic!("expected an extraction error, got {:?}", other),
    }
}

fn subdir(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::create_dir_all(&path).unwrap();
    path
}

fn scratch_dirs(config: &ExtractionConfig) -> Vec<PathBuf> {
    match std::fs::read_dir(&config.scratch_root) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

#[test]
fn test_detect_archive_type_by_extension() {
    assert_eq!(detect_archive_type(Path::new("a.zip")), Some(ArchiveType::Zip));
    assert_eq!(detect_archive_type(Path::new("a.RAR")), Some(ArchiveType::Rar));
    assert_eq!(detect_archive_type(Path::new("a.7z")), Some(ArchiveType::SevenZip));
    assert_eq!(detect_archive_type(Path::new("a.tar")), Some(ArchiveType::Tar));
    assert_eq!(detect_archive_type(Path::new("a.tgz")), Some(ArchiveType::TarGz));
    assert_eq!(detect_archive_type(Path::new("a.tar.gz")), Some(ArchiveType::TarGz));
    assert_eq!(detect_archive_type(Path::new("a.xml.gz")), Some(ArchiveType::Gzip));
    assert_eq!(detect_archive_type(Path::new("a.xml")), None);
    assert_eq!(detect_archive_type(Path::new("noext")), None);
}

#[test]
fn test_sniff_archive_type_reads_magic_bytes() {
    let dir = TempDir::new().unwrap();

    let zip = dir.path().join("upload.bin");
    create_zip_archive(&zip, &[("saft.xml", PAYLOAD)]);
    assert_eq!(sniff_archive_type(&zip), Some(ArchiveType::Zip));

    let gz = dir.path().join("upload.dat");
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(PAYLOAD).unwrap();
    std::fs::write(&gz, encoder.finish().unwrap()).unwrap();
    assert_eq!(sniff_archive_type(&gz), Some(ArchiveType::Gzip));

    let text = dir.path().join("notes.txt");
    std::fs::write(&text, b"just some text").unwrap();
    assert_eq!(sniff_archive_type(&text), None);
}

#[test]
fn test_is_archive_default_extensions() {
    let config = ExtractionConfig::default();
    for name in ["a.zip", "a.rar", "a.7z", "a.tar", "a.tgz", "a.tar.gz", "a.ZIP"] {
        assert!(is_archive(Path::new(name), &config.archive_extensions), "{name}");
    }
    for name in ["a.xml", "a.txt", "noext"] {
        assert!(!is_archive(Path::new(name), &config.archive_extensions), "{name}");
    }
}

#[test]
fn test_select_payload_prefers_most_recent() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();

    let old = dir.path().join("z_old.xml");
    let new = dir.path().join("sub").join("a_new.xml");
    std::fs::write(&old, PAYLOAD).unwrap();
    std::fs::write(&new, PAYLOAD).unwrap();
    std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();

    let now = SystemTime::now();
    std::fs::File::options()
        .write(true)
        .open(&old)
        .unwrap()
        .set_modified(now - Duration::from_secs(3600))
        .unwrap();
    std::fs::File::options()
        .write(true)
        .open(&new)
        .unwrap()
        .set_modified(now)
        .unwrap();

    assert_eq!(select_payload(dir.path(), "xml").unwrap(), Some(new));
}

#[test]
fn test_select_payload_ties_break_on_path() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.xml");
    let b = dir.path().join("b.XML");
    std::fs::write(&a, PAYLOAD).unwrap();
    std::fs::write(&b, PAYLOAD).unwrap();

    let stamp = SystemTime::now() - Duration::from_secs(60);
    for path in [&a, &b] {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(stamp)
            .unwrap();
    }

    assert_eq!(select_payload(dir.path(), "xml").unwrap(), Some(b));
}

// ---------------------------------------------------------------------------
// Input validation and fast path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_xml_source_is_returned_without_scratch_dir() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let source = dir.path().join("SAFT.XML");
    std::fs::write(&source, PAYLOAD).unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let outcome = PayloadExtractor::new(config.clone())
        .extract(&source, None, Some(tx), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.payload_path, source);
    assert!(outcome.scratch_directory.is_none());
    assert!(scratch_dirs(&config).is_empty());
    assert_eq!(
        rx.try_recv().unwrap(),
        ExtractionProgress::PayloadReady { path: source }
    );
}

#[tokio::test]
async fn test_missing_source() {
    let dir = TempDir::new().unwrap();
    let extractor = PayloadExtractor::new(test_config(&dir));

    let err = extraction_error(
        extractor
            .extract(&dir.path().join("nope.zip"), None, None, &CancellationToken::new())
            .await,
    );
    assert!(matches!(err, ExtractionError::SourceMissing { .. }));
}

#[tokio::test]
async fn test_empty_source_fails_before_anything_else() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let source = dir.path().join("empty.xml");
    std::fs::write(&source, b"").unwrap();

    let err = extraction_error(
        PayloadExtractor::new(config.clone())
            .extract(&source, None, None, &CancellationToken::new())
            .await,
    );
    assert!(matches!(err, ExtractionError::EmptyInput { .. }));
    assert!(scratch_dirs(&config).is_empty());
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_zip_extraction_finds_payload() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let source = dir.path().join("submission.zip");
    create_zip_archive(
        &source,
        &[("readme.txt", &b"read me"[..]), ("2024/saft.xml", PAYLOAD)],
    );

    let outcome = PayloadExtractor::new(config.clone())
        .extract(&source, None, None, &CancellationToken::new())
        .await
        .unwrap();

    let scratch = outcome.scratch_directory.clone().unwrap();
    assert!(scratch.starts_with(&config.scratch_root));
    assert!(
        scratch
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(&config.scratch_prefix)
    );
    assert_eq!(outcome.payload_path, scratch.join("2024").join("saft.xml"));
    assert_eq!(std::fs::read(&outcome.payload_path).unwrap(), PAYLOAD);
}

#[tokio::test]
async fn test_nesting_up_to_max_depth_is_extracted() {
    let dir = TempDir::new().unwrap();
    let source = create_nested_chain(dir.path(), 5);

    let outcome = PayloadExtractor::new(test_config(&dir))
        .extract(&source, None, None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.payload_path.ends_with("saft.xml"));
    assert_eq!(std::fs::read(&outcome.payload_path).unwrap(), PAYLOAD);
}

#[tokio::test]
async fn test_nesting_beyond_max_depth_fails() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let source = create_nested_chain(dir.path(), 6);

    let err = extraction_error(
        PayloadExtractor::new(config.clone())
            .extract(&source, None, None, &CancellationToken::new())
            .await,
    );
    match err {
        ExtractionError::TooDeeplyNested { archive, max_depth } => {
            assert_eq!(max_depth, 4);
            assert!(archive.ends_with("level5.zip"));
        }
        other => panic!("expected TooDeeplyNested, got {:?}", other),
    }
    assert!(scratch_dirs(&config).is_empty(), "failed extraction leaves no scratch dir");
}

#[tokio::test]
async fn test_custom_max_depth() {
    let dir = TempDir::new().unwrap();
    let config = ExtractionConfig {
        max_depth: 1,
        ..test_config(&dir)
    };
    let extractor = PayloadExtractor::new(config);

    let ok = create_nested_chain(&subdir(&dir, "ok"), 2);
    assert!(extractor.extract(&ok, None, None, &CancellationToken::new()).await.is_ok());

    let deep = create_nested_chain(&subdir(&dir, "deep"), 3);
    let err = extraction_error(extractor.extract(&deep, None, None, &CancellationToken::new()).await);
    assert!(matches!(err, ExtractionError::TooDeeplyNested { max_depth: 1, .. }));
}

#[tokio::test]
async fn test_tar_gz_extraction() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("submission.tar.gz");
    create_tar_gz(&source, &[("docs/saft.xml", PAYLOAD), ("docs/notes.txt", &b"n"[..])]);

    let outcome = PayloadExtractor::new(test_config(&dir))
        .extract(&source, None, None, &CancellationToken::new())
        .await
        .unwrap();

    let scratch = outcome.scratch_directory.unwrap();
    assert_eq!(outcome.payload_path, scratch.join("docs").join("saft.xml"));
}

#[tokio::test]
async fn test_single_gzip_file_is_decompressed() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("saft_2024.xml.gz");
    let mut encoder = flate2::write::GzEncoder::new(
        std::fs::File::create(&source).unwrap(),
        flate2::Compression::default(),
    );
    encoder.write_all(PAYLOAD).unwrap();
    encoder.finish().unwrap();

    let outcome = PayloadExtractor::new(test_config(&dir))
        .extract(&source, None, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome.payload_path,
        outcome.scratch_directory.unwrap().join("saft_2024.xml")
    );
    assert_eq!(std::fs::read(&outcome.payload_path).unwrap(), PAYLOAD);
}

#[tokio::test]
async fn test_7z_extraction() {
    let dir = TempDir::new().unwrap();
    let content_dir = dir.path().join("content");
    std::fs::create_dir(&content_dir).unwrap();
    std::fs::write(content_dir.join("saft.xml"), PAYLOAD).unwrap();

    let source = dir.path().join("submission.7z");
    create_7z_archive(&source, &content_dir);

    let outcome = PayloadExtractor::new(test_config(&dir))
        .extract(&source, None, None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.payload_path.ends_with("saft.xml"));
    assert_eq!(std::fs::read(&outcome.payload_path).unwrap(), PAYLOAD);
}

#[tokio::test]
async fn test_zip_nested_in_tar_gz() {
    let dir = TempDir::new().unwrap();
    let inner = zip_bytes(&[("saft.xml", PAYLOAD)]);
    let source = dir.path().join("bundle.tgz");
    create_tar_gz(&source, &[("inner.zip", inner.as_slice())]);

    let outcome = PayloadExtractor::new(test_config(&dir))
        .extract(&source, None, None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.payload_path.ends_with("saft.xml"));
}

#[tokio::test]
async fn test_unknown_extension_is_sniffed() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("upload.bin");
    create_zip_archive(&source, &[("saft.xml", PAYLOAD)]);

    let outcome = PayloadExtractor::new(test_config(&dir))
        .extract(&source, None, None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.payload_path.ends_with("saft.xml"));
}

#[tokio::test]
async fn test_unrecognized_file_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("notes.txt");
    std::fs::write(&source, b"definitely not an archive").unwrap();

    let err = extraction_error(
        PayloadExtractor::new(test_config(&dir))
            .extract(&source, None, None, &CancellationToken::new())
            .await,
    );
    assert!(matches!(err, ExtractionError::CorruptArchive { .. }));
}

#[tokio::test]
async fn test_garbage_zip_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("broken.zip");
    std::fs::write(&source, b"PK\x03\x04 truncated garbage").unwrap();

    let err = extraction_error(
        PayloadExtractor::new(test_config(&dir))
            .extract(&source, None, None, &CancellationToken::new())
            .await,
    );
    assert!(matches!(err, ExtractionError::CorruptArchive { .. }));
}

#[tokio::test]
async fn test_archive_without_payload() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let source = dir.path().join("photos.zip");
    create_zip_archive(&source, &[("photo.jpg", &b"jpeg"[..]), ("notes.txt", &b"text"[..])]);

    let err = extraction_error(
        PayloadExtractor::new(config.clone())
            .extract(&source, None, None, &CancellationToken::new())
            .await,
    );
    match err {
        ExtractionError::PayloadNotFound {
            source_path,
            extension,
        } => {
            assert_eq!(source_path, source);
            assert_eq!(extension, "xml");
        }
        other => panic!("expected PayloadNotFound, got {:?}", other),
    }
    assert!(scratch_dirs(&config).is_empty());
}

#[tokio::test]
async fn test_unsafe_entry_paths_are_skipped() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let source = dir.path().join("hostile.zip");
    create_zip_archive(&source, &[("../escaped.xml", PAYLOAD), ("ok/saft.xml", PAYLOAD)]);

    let outcome = PayloadExtractor::new(config.clone())
        .extract(&source, None, None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.payload_path.ends_with("ok/saft.xml"));
    let escaped: Vec<_> = walkdir::WalkDir::new(dir.path())
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() == "escaped.xml")
        .collect();
    assert!(escaped.is_empty(), "entry escaped the scratch directory: {escaped:?}");
}

#[tokio::test]
async fn test_size_limit() {
    let dir = TempDir::new().unwrap();
    let config = ExtractionConfig {
        max_extracted_bytes: 16,
        ..test_config(&dir)
    };
    let source = dir.path().join("big.zip");
    create_zip_archive(&source, &[("saft.xml", &[b'x'; 1024][..])]);

    let err = extraction_error(
        PayloadExtractor::new(config)
            .extract(&source, None, None, &CancellationToken::new())
            .await,
    );
    assert!(matches!(err, ExtractionError::SizeLimitExceeded { limit: 16, .. }));
}

// ---------------------------------------------------------------------------
// Passwords
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_encrypted_zip_without_password() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("secret.zip");
    create_encrypted_zip(&source, "saft.xml", PAYLOAD, b"s3cret");
    let extractor = PayloadExtractor::new(test_config(&dir));

    let err = extraction_error(
        extractor
            .extract(&source, None, None, &CancellationToken::new())
            .await,
    );
    assert!(matches!(err, ExtractionError::PasswordRequired { .. }));

    // An empty password is no password
    let err = extraction_error(
        extractor
            .extract(&source, Some(""), None, &CancellationToken::new())
            .await,
    );
    assert!(matches!(err, ExtractionError::PasswordRequired { .. }));
}

#[tokio::test]
async fn test_encrypted_zip_with_wrong_password() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("secret.zip");
    create_encrypted_zip(&source, "saft.xml", PAYLOAD, b"s3cret");

    let err = extraction_error(
        PayloadExtractor::new(test_config(&dir))
            .extract(&source, Some("wrong"), None, &CancellationToken::new())
            .await,
    );
    assert!(matches!(err, ExtractionError::WrongPassword { .. }));
}

#[tokio::test]
async fn test_password_applies_through_nesting() {
    let dir = TempDir::new().unwrap();
    let inner = zip_bytes(&[("saft.xml", PAYLOAD)]);
    let middle = zip_bytes(&[("inner.zip", inner.as_slice())]);
    let source = dir.path().join("outer.zip");
    create_encrypted_zip(&source, "middle.zip", &middle, b"s3cret");

    let outcome = PayloadExtractor::new(test_config(&dir))
        .extract(&source, Some("s3cret"), None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.payload_path.ends_with("saft.xml"));
    assert_eq!(std::fs::read(&outcome.payload_path).unwrap(), PAYLOAD);
}

fn encrypted_7z_source(dir: &TempDir) -> PathBuf {
    let content_dir = subdir(dir, "content");
    std::fs::write(content_dir.join("saft.xml"), PAYLOAD).unwrap();
    let source = dir.path().join("secret.7z");
    create_encrypted_7z(&source, &content_dir, "s3cret");
    source
}

#[tokio::test]
async fn test_encrypted_7z_without_password() {
    let dir = TempDir::new().unwrap();
    let source = encrypted_7z_source(&dir);

    let err = extraction_error(
        PayloadExtractor::new(test_config(&dir))
            .extract(&source, None, None, &CancellationToken::new())
            .await,
    );
    assert!(matches!(err, ExtractionError::PasswordRequired { .. }));
}

#[tokio::test]
async fn test_encrypted_7z_with_wrong_password() {
    let dir = TempDir::new().unwrap();
    let source = encrypted_7z_source(&dir);

    let err = extraction_error(
        PayloadExtractor::new(test_config(&dir))
            .extract(&source, Some("wrong"), None, &CancellationToken::new())
            .await,
    );
    assert!(matches!(err, ExtractionError::WrongPassword { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_encrypted_7z_with_password() {
    let dir = TempDir::new().unwrap();
    let source = encrypted_7z_source(&dir);

    let outcome = PayloadExtractor::new(test_config(&dir))
        .extract(&source, Some("s3cret"), None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(std::fs::read(&outcome.payload_path).unwrap(), PAYLOAD);
}

#[tokio::test]
async fn test_corrupt_plain_7z_with_password_stays_corrupt() {
    let dir = TempDir::new().unwrap();
    let content_dir = subdir(&dir, "content");
    std::fs::write(content_dir.join("saft.xml"), PAYLOAD.repeat(64)).unwrap();
    let source = dir.path().join("plain.7z");
    create_7z_archive(&source, &content_dir);

    // Damage the packed stream right after the 32-byte signature header
    let mut bytes = std::fs::read(&source).unwrap();
    for byte in &mut bytes[32..48] {
        *byte ^= 0xFF;
    }
    std::fs::write(&source, bytes).unwrap();

    let err = extraction_error(
        PayloadExtractor::new(test_config(&dir))
            .extract(&source, Some("anything"), None, &CancellationToken::new())
            .await,
    );
    assert!(matches!(err, ExtractionError::CorruptArchive { .. }), "{:?}", err);
}

// ---------------------------------------------------------------------------
// Nesting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_nested_archives_sharing_a_name() {
    let dir = TempDir::new().unwrap();
    let mut bytes = zip_bytes(&[("saft.xml", PAYLOAD)]);
    for _ in 0..2 {
        bytes = zip_bytes(&[("export.zip", bytes.as_slice())]);
    }
    let source = dir.path().join("export.zip");
    std::fs::write(&source, bytes).unwrap();

    let outcome = PayloadExtractor::new(test_config(&dir))
        .extract(&source, None, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(std::fs::read(&outcome.payload_path).unwrap(), PAYLOAD);
    let scratch = outcome.scratch_directory.clone().unwrap();
    assert!(outcome.payload_path.starts_with(&scratch));
    assert!(
        outcome
            .payload_path
            .ends_with("export.zip.d/export.zip.d/saft.xml")
    );
}

#[tokio::test]
async fn test_nested_directory_name_already_taken() {
    let dir = TempDir::new().unwrap();
    let inner = zip_bytes(&[("saft.xml", PAYLOAD)]);
    let source = dir.path().join("outer.zip");
    create_zip_archive(
        &source,
        &[
            ("inner.zip", inner.as_slice()),
            ("inner.zip.d/readme.txt", &b"unrelated"[..]),
        ],
    );

    let outcome = PayloadExtractor::new(test_config(&dir))
        .extract(&source, None, None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.payload_path.ends_with("inner.zip.d-1/saft.xml"));
    assert_eq!(std::fs::read(&outcome.payload_path).unwrap(), PAYLOAD);
}

// ---------------------------------------------------------------------------
// Progress, cancellation, cleanup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_progress_notifications() {
    let dir = TempDir::new().unwrap();
    let inner = zip_bytes(&[("saft.xml", PAYLOAD)]);
    let source = dir.path().join("outer.zip");
    create_zip_archive(&source, &[("inner.zip", inner.as_slice())]);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let outcome = PayloadExtractor::new(test_config(&dir))
        .extract(&source, None, Some(tx), &CancellationToken::new())
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert_eq!(events.first(), Some(&ExtractionProgress::Started { source: source.clone() }));
    assert!(events.contains(&ExtractionProgress::NestedArchive {
        entry: "inner.zip".to_string(),
        depth: 1,
    }));
    assert!(events.contains(&ExtractionProgress::EntryExtracted {
        entry: "saft.xml".to_string(),
    }));
    assert_eq!(
        events.last(),
        Some(&ExtractionProgress::PayloadLocated {
            path: outcome.payload_path.clone()
        })
    );
}

#[tokio::test]
async fn test_dropped_progress_receiver_is_harmless() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("submission.zip");
    create_zip_archive(&source, &[("saft.xml", PAYLOAD)]);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    drop(rx);

    let outcome = PayloadExtractor::new(test_config(&dir))
        .extract(&source, None, Some(tx), &CancellationToken::new())
        .await;
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let source = dir.path().join("submission.zip");
    create_zip_archive(&source, &[("saft.xml", PAYLOAD)]);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = PayloadExtractor::new(config.clone())
        .extract(&source, None, None, &cancel)
        .await;
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(scratch_dirs(&config).is_empty());
}

#[tokio::test]
async fn test_scratch_guard_removes_directory() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("submission.zip");
    create_zip_archive(&source, &[("saft.xml", PAYLOAD)]);

    let outcome = PayloadExtractor::new(test_config(&dir))
        .extract(&source, None, None, &CancellationToken::new())
        .await
        .unwrap();
    let scratch = outcome.scratch_directory.clone().unwrap();

    {
        let guard = outcome.scratch_guard();
        assert_eq!(guard.path(), Some(scratch.as_path()));
        assert!(outcome.payload_path.exists());
    }
    assert!(!scratch.exists());

    // Removing again is a no-op
    remove_scratch_dir(&scratch);
}

#[test]
fn test_disarmed_guard_keeps_directory() {
    let dir = TempDir::new().unwrap();
    let kept = dir.path().join("keep");
    std::fs::create_dir(&kept).unwrap();

    let guard = ScratchGuard::new(kept.clone());
    assert_eq!(guard.disarm(), Some(kept.clone()));
    assert!(kept.exists());

    drop(ScratchGuard::empty());
}

#[tokio::test]
async fn test_each_extraction_gets_its_own_scratch_dir() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("submission.zip");
    create_zip_archive(&source, &[("saft.xml", PAYLOAD)]);
    let extractor = PayloadExtractor::new(test_config(&dir));

    let first = extractor
        .extract(&source, None, None, &CancellationToken::new())
        .await
        .unwrap();
    let second = extractor
        .extract(&source, None, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_ne!(first.scratch_directory, second.scratch_directory);
}
