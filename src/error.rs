//! Error types for saft-submit
//!
//! This module provides the error taxonomy for the three core operations:
//! - Artifact acquisition failures (network, remote status, missing local copy)
//! - Archive extraction failures (password, corruption, depth, missing payload)
//! - Shared infrastructure failures (I/O, configuration, cancellation)
//!
//! Classification never fails, so it has no error type of its own.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for saft-submit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for saft-submit
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_url")
        key: Option<String>,
    },

    /// Artifact acquisition error
    #[error("acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// Archive extraction error
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation was cancelled through its cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Artifact acquisition errors
///
/// Everything except [`AcquisitionError::NoLocalArtifact`] is recoverable:
/// the manager logs it as a step transition and falls back to a local copy.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Remote fetch failed entirely (DNS, connect, timeout, body read)
    #[error("remote artifact endpoint unavailable: {reason}")]
    NetworkUnavailable {
        /// The underlying transport failure
        reason: String,
        /// Whether the failure looked transient (timeout or connect)
        transient: bool,
    },

    /// Remote endpoint answered with a status other than 200 or 304
    #[error("remote artifact endpoint rejected the request: HTTP {status} {reason}")]
    RemoteRejected {
        /// HTTP status code
        status: u16,
        /// Canonical reason phrase for the status
        reason: String,
    },

    /// No resolution step produced a local copy of the artifact
    #[error("no local artifact available in {cache_dir}")]
    NoLocalArtifact {
        /// The cache directory where the artifact was expected
        cache_dir: PathBuf,
    },

    /// Downloaded bytes failed verification and were discarded
    #[error("downloaded artifact {path} is not usable: {reason}")]
    InvalidArtifact {
        /// Where the rejected download was written or meant to go
        path: PathBuf,
        /// Why the download was rejected
        reason: String,
    },
}

/// Archive extraction errors
///
/// All variants are terminal for the extraction call that produced them.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Source file does not exist
    #[error("source file {path} does not exist")]
    SourceMissing {
        /// The missing source path
        path: PathBuf,
    },

    /// Source file has zero length
    #[error("source file {path} is empty")]
    EmptyInput {
        /// The empty source path
        path: PathBuf,
    },

    /// An encrypted entry was met and no password was supplied
    #[error("archive {archive} is password protected; supply a password to extract it")]
    PasswordRequired {
        /// The archive holding the encrypted entry
        archive: PathBuf,
    },

    /// The supplied password does not open the archive
    #[error("wrong password for encrypted archive {archive}")]
    WrongPassword {
        /// The archive that could not be decrypted
        archive: PathBuf,
    },

    /// The container could not be read
    #[error("archive {archive} could not be read: {reason}")]
    CorruptArchive {
        /// The unreadable archive
        archive: PathBuf,
        /// The reader's description of the problem
        reason: String,
    },

    /// Containers are nested deeper than the configured bound
    #[error("archive {archive} is nested more than {max_depth} levels deep; extract it manually and try again")]
    TooDeeplyNested {
        /// The archive found beyond the bound
        archive: PathBuf,
        /// The configured bound
        max_depth: u32,
    },

    /// No file with the payload extension exists in the unpacked tree
    #[error("no .{extension} file was found inside {source_path}")]
    PayloadNotFound {
        /// The user-supplied source file
        source_path: PathBuf,
        /// The payload extension searched for
        extension: String,
    },

    /// Extraction wrote more bytes than allowed
    #[error("extracting {archive} exceeded the limit of {limit} bytes")]
    SizeLimitExceeded {
        /// The archive being extracted when the limit was hit
        archive: PathBuf,
        /// The configured byte limit
        limit: u64,
    },
}

impl Error {
    /// Machine-readable error code, stable across releases
    ///
    /// Intended for history records and log correlation.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Acquisition(e) => match e {
                AcquisitionError::NetworkUnavailable { .. } => "network_unavailable",
                AcquisitionError::RemoteRejected { .. } => "remote_rejected",
                AcquisitionError::NoLocalArtifact { .. } => "no_local_artifact",
                AcquisitionError::InvalidArtifact { .. } => "invalid_artifact",
            },
            Error::Extraction(e) => match e {
                ExtractionError::SourceMissing { .. } => "source_missing",
                ExtractionError::EmptyInput { .. } => "empty_input",
                ExtractionError::PasswordRequired { .. } => "password_required",
                ExtractionError::WrongPassword { .. } => "wrong_password",
                ExtractionError::CorruptArchive { .. } => "corrupt_archive",
                ExtractionError::TooDeeplyNested { .. } => "too_deeply_nested",
                ExtractionError::PayloadNotFound { .. } => "payload_not_found",
                ExtractionError::SizeLimitExceeded { .. } => "size_limit_exceeded",
            },
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Cancelled => "cancelled",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether this error is terminal for the operation that raised it
    ///
    /// Acquisition step failures that a local fallback can absorb return `false`.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Error::Acquisition(
                AcquisitionError::NetworkUnavailable { .. }
                    | AcquisitionError::RemoteRejected { .. }
                    | AcquisitionError::InvalidArtifact { .. }
            )
        )
    }
}

impl From<reqwest::Error> for AcquisitionError {
    fn from(e: reqwest::Error) -> Self {
        AcquisitionError::NetworkUnavailable {
            transient: e.is_timeout() || e.is_connect(),
            reason: e.to_string(),
        }
    }
}
