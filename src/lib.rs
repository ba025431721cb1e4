//! # saft-submit
//!
//! Core library for SAF-T submission front-ends.
//!
//! ## Design Philosophy
//!
//! saft-submit covers the three parts of a submission that are more than
//! plumbing:
//! - **Artifact acquisition** - keep a runnable copy of the official
//!   submission tool cached and current, falling back to local copies when
//!   the remote endpoint cannot be reached
//! - **Payload extraction** - find the XML payload inside whatever the user
//!   supplied, including password-protected and nested archives
//! - **Response classification** - turn the tool's free-form output into a
//!   structured outcome
//!
//! Alongside these, [`validation`] keeps the official schema at hand and
//! reads the XSD validator's report, and [`preflight`] checks the
//! environment before a run.
//!
//! Rendering, running the tools and persisting history are left to the caller.
//!
//! ## Quick Start
//!
//! ```no_run
//! use saft_submit::{ArtifactManager, Config, PayloadExtractor, classify};
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     config.validate()?;
//!     let cancel = CancellationToken::new();
//!
//!     let extractor = PayloadExtractor::new(config.extraction.clone());
//!     let outcome = extractor
//!         .extract(Path::new("saft-2024-05.zip"), None, None, &cancel)
//!         .await?;
//!     let _scratch = outcome.scratch_guard();
//!
//!     let manager = ArtifactManager::new(config.acquisition.clone())?;
//!     let artifact = manager.ensure_latest(&cancel).await;
//!     println!("{}", artifact.user_message);
//!
//!     // ... run `java -jar <artifact> ... <payload>` and capture its output ...
//!     let summary = classify("Envio efetuado com sucesso.", "", Some(0));
//!     println!("{}", summary.readable_summary());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Artifact caching and remote refresh
pub mod acquisition;
/// Process output classification
pub mod classification;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Payload extraction from archives
pub mod extraction;
/// Environment checks
pub mod preflight;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;
/// Schema validation of the payload
pub mod validation;

// Re-export commonly used types
pub use acquisition::{ArtifactManager, ArtifactMetadata, MetadataStore, RememberedArtifact};
pub use classification::classify;
pub use config::{
    AcquisitionConfig, ArtifactKeyword, Config, ExtractionConfig, RetryConfig, ValidationConfig,
};
pub use error::{AcquisitionError, Error, ExtractionError, Result};
pub use extraction::{PayloadExtractor, ProgressSender, ScratchGuard};
pub use preflight::PreflightCheck;
pub use types::{
    AcquisitionResult, ArchiveType, ArtifactOrigin, ExtractionOutcome, ExtractionProgress,
    ResponseState, ResponseSummary, ValidationIssue, ValidationReport,
};
pub use validation::{SchemaStore, parse_validator_output, validate_output};
