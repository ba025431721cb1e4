//! Core types for saft-submit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;

/// Outcome of an artifact acquisition attempt
///
/// When `success` is false, `resolved_path` still names the best-known location
/// (it may not exist) so the caller can report it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionResult {
    /// A usable artifact exists at `resolved_path`
    pub success: bool,
    /// A newer artifact was downloaded during this call
    pub updated: bool,
    /// Freshness could not be verified; an existing local copy is used
    pub used_fallback: bool,
    /// Artifact path (best known path on failure)
    pub resolved_path: PathBuf,
    /// Message suitable for the end user
    pub user_message: String,
    /// Technical detail of the failure that caused a fallback or failure
    pub error_detail: Option<String>,
    /// Last-Modified timestamp reported by (or remembered from) the remote
    pub remote_timestamp: Option<DateTime<Utc>>,
}

/// Where a local artifact copy came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    /// Already present in the cache directory
    Cache,
    /// Copied from a directory shipped with the application
    Bundle,
    /// Copied from a conventional user folder
    KnownFolder,
}

/// Supported archive formats
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveType {
    /// ZIP archive (.zip)
    Zip,
    /// 7-Zip archive (.7z)
    SevenZip,
    /// RAR archive (.rar)
    Rar,
    /// Uncompressed tarball (.tar)
    Tar,
    /// Gzip-compressed tarball (.tar.gz, .tgz)
    TarGz,
    /// Single gzip-compressed file (.gz)
    Gzip,
}

/// Result of locating the payload inside a user-supplied file
///
/// `scratch_directory` is set only when extraction created a temporary
/// directory; the caller owns its deletion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionOutcome {
    /// Existing, readable payload file
    pub payload_path: PathBuf,
    /// Scratch directory holding the extracted tree, if one was created
    pub scratch_directory: Option<PathBuf>,
}

/// Progress notification emitted during extraction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtractionProgress {
    /// The source is already a payload file; nothing to extract
    PayloadReady {
        /// The payload path
        path: PathBuf,
    },
    /// Extraction of the source container started
    Started {
        /// The source container
        source: PathBuf,
    },
    /// An entry was written to the scratch directory
    EntryExtracted {
        /// Entry name inside its container
        entry: String,
    },
    /// A nested container was found and will be unpacked
    NestedArchive {
        /// Entry name of the nested container
        entry: String,
        /// Nesting depth of the nested container
        depth: u32,
    },
    /// The payload was selected
    PayloadLocated {
        /// The selected payload
        path: PathBuf,
    },
}

impl ExtractionProgress {
    /// Human-readable description of the notification
    pub fn message(&self) -> String {
        match self {
            ExtractionProgress::PayloadReady { .. } => "Payload file ready to read.".to_string(),
            ExtractionProgress::Started { .. } => "Extracting archive...".to_string(),
            ExtractionProgress::EntryExtracted { entry } => format!("Extracted: {entry}"),
            ExtractionProgress::NestedArchive { entry, .. } => {
                format!("Inspecting nested archive: {entry}")
            }
            ExtractionProgress::PayloadLocated { .. } => "Payload file located.".to_string(),
        }
    }
}

/// Classification state of a process response
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseState {
    /// The submission was accepted
    Success,
    /// The remote side demands a newer client before resubmission
    ClientUpdateRequired,
    /// The submission failed
    Error,
    /// Completed without errors but with warnings
    Warning,
    /// Nothing conclusive could be read from the output
    Indeterminate,
}

impl ResponseState {
    /// Stable identifier for persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseState::Success => "success",
            ResponseState::ClientUpdateRequired => "client_update_required",
            ResponseState::Error => "error",
            ResponseState::Warning => "warning",
            ResponseState::Indeterminate => "indeterminate",
        }
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            ResponseState::Success => "Success",
            ResponseState::ClientUpdateRequired => "Client update required",
            ResponseState::Error => "Error",
            ResponseState::Warning => "Completed with warnings",
            ResponseState::Indeterminate => "Indeterminate result",
        }
    }
}

impl std::fmt::Display for ResponseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Structured interpretation of a process invocation's output
///
/// Invariant: `success` implies `errors` is empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSummary {
    /// Final classification
    pub state: ResponseState,
    /// Whether the invocation is considered successful
    pub success: bool,
    /// Never empty
    pub headline_message: String,
    /// Error lines, markup stripped, in output order
    pub errors: Vec<String>,
    /// Warning lines, markup stripped, in output order
    pub warnings: Vec<String>,
    /// Diagnostic codes in order of first appearance, without duplicates
    pub codes: Vec<String>,
    /// Captured standard output
    pub raw_stdout: String,
    /// Captured standard error
    pub raw_stderr: String,
}

impl ResponseSummary {
    /// Whether the response asks for a client update before resubmitting
    pub fn requires_client_update(&self) -> bool {
        self.state == ResponseState::ClientUpdateRequired
    }

    /// Multi-line plain-text rendering for display or clipboard
    pub fn readable_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "State: {}", self.state.label());
        if !self.headline_message.trim().is_empty() {
            let _ = writeln!(out, "{}", self.headline_message);
        }

        let sections: [(&str, &[String]); 3] = [
            ("Errors:", &self.errors),
            ("Warnings:", &self.warnings),
            ("Codes:", &self.codes),
        ];
        for (title, items) in sections {
            if items.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{title}");
            for item in items {
                let _ = writeln!(out, " • {item}");
            }
        }

        out.trim().to_string()
    }
}

/// One problem reported by the XSD validator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Validator message, or the whole output line when it has no location
    pub message: String,
    /// 1-based line in the validated file
    pub line: Option<u32>,
    /// 1-based column in the validated file
    pub column: Option<u32>,
    /// Hint for fixing the field the message names
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// `Line 12, Column 7: <message>`, or just the message without a location
    pub fn located_message(&self) -> String {
        match (self.line, self.column) {
            (Some(line), Some(column)) => format!("Line {line}, Column {column}: {}", self.message),
            (Some(line), None) => format!("Line {line}: {}", self.message),
            _ => self.message.clone(),
        }
    }
}

/// Result of checking a payload against the official schema
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// No issue was reported
    pub valid: bool,
    /// Issues in output order
    pub issues: Vec<ValidationIssue>,
    /// One-sentence outcome
    pub summary: String,
    /// Distinct follow-up actions, most specific first
    pub suggestions: Vec<String>,
}
