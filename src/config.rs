//! Configuration types for saft-submit

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Well-known download location of the submission tool
pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://www.portaldasfinancas.gov.pt/static/docs/factemi/EnviaSaft.jar";

/// Published location of the SAF-T (PT) 1.04_01 schema
pub const DEFAULT_SCHEMA_URL: &str =
    "https://info.portaldasfinancas.gov.pt/apps/saft-pt04/saftpt1.04_01.xsd";

/// Application namespace used under the platform data directory
pub const APP_NAMESPACE: &str = "saft-submit";

/// Main configuration
///
/// Owned by the caller and handed to each component at construction; there is
/// no process-wide state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Artifact cache and remote refresh settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Archive extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Schema validation settings
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl Config {
    /// Check settings that would otherwise fail late, at first use
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.acquisition.download_url {
            url::Url::parse(url).map_err(|e| Error::Config {
                message: format!("invalid download URL {url:?}: {e}"),
                key: Some("acquisition.download_url".to_string()),
            })?;
        }

        if self.acquisition.default_file_name.trim().is_empty() {
            return Err(Error::Config {
                message: "default artifact file name must not be empty".to_string(),
                key: Some("acquisition.default_file_name".to_string()),
            });
        }

        url::Url::parse(&self.validation.schema_url).map_err(|e| Error::Config {
            message: format!("invalid schema URL {:?}: {e}", self.validation.schema_url),
            key: Some("validation.schema_url".to_string()),
        })?;

        if self.extraction.max_depth == 0 {
            return Err(Error::Config {
                message: "max_depth must be at least 1".to_string(),
                key: Some("extraction.max_depth".to_string()),
            });
        }

        if self.extraction.payload_extension.trim().is_empty() {
            return Err(Error::Config {
                message: "payload extension must not be empty".to_string(),
                key: Some("extraction.payload_extension".to_string()),
            });
        }

        Ok(())
    }
}

/// Keyword contributing to a candidate artifact's score
///
/// A file name containing the keyword (case-insensitive) gains `weight`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactKeyword {
    /// Substring looked for in candidate file names
    pub keyword: String,
    /// Score contribution when present
    pub weight: u32,
}

impl ArtifactKeyword {
    /// Create a keyword with the given weight
    pub fn new(keyword: impl Into<String>, weight: u32) -> Self {
        Self {
            keyword: keyword.into(),
            weight,
        }
    }
}

/// Artifact acquisition configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Remote artifact URL (None disables update checks)
    #[serde(default = "default_download_url")]
    pub download_url: Option<String>,

    /// Directory holding the cached artifact and its metadata side file
    /// (default: `<data_dir>/saft-submit/libs`)
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Read-only directories shipped with the application, searched for a
    /// pre-bundled artifact (default: `<exe_dir>/libs`, `<exe_dir>/resources`)
    #[serde(default = "default_bundle_dirs")]
    pub bundle_dirs: Vec<PathBuf>,

    /// User folders scanned non-recursively for a manually downloaded artifact
    /// (default: Downloads, Documents, Desktop)
    #[serde(default = "default_known_folders")]
    pub known_folders: Vec<PathBuf>,

    /// File name used when nothing better is known (default: "EnviaSaft.jar")
    #[serde(default = "default_file_name")]
    pub default_file_name: String,

    /// Extension of artifact candidates, without the dot (default: "jar")
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,

    /// Keywords that identify the artifact family in file names
    #[serde(default = "default_keywords")]
    pub keywords: Vec<ArtifactKeyword>,

    /// Upper bound for a single HTTP request (default: 120 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent to the remote endpoint
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Reject downloads that are not readable zip containers (default: true)
    #[serde(default = "default_true")]
    pub verify_download: bool,

    /// Keep a `.bak` copy of the artifact replaced by a download (default: true)
    #[serde(default = "default_true")]
    pub keep_backup: bool,

    /// Retry policy for transient remote failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            download_url: default_download_url(),
            cache_dir: default_cache_dir(),
            bundle_dirs: default_bundle_dirs(),
            known_folders: default_known_folders(),
            default_file_name: default_file_name(),
            artifact_extension: default_artifact_extension(),
            keywords: default_keywords(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            verify_download: true,
            keep_backup: true,
            retry: RetryConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    /// Configuration rooted at explicit directories, with no known folders
    ///
    /// Convenient for embedding and tests where platform folders must not leak in.
    pub fn with_dirs(cache_dir: impl Into<PathBuf>, bundle_dirs: Vec<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            bundle_dirs,
            known_folders: Vec::new(),
            ..Default::default()
        }
    }

    /// Name of the metadata side file (e.g. "EnviaSaft.jar.metadata.json")
    pub fn metadata_file_name(&self) -> String {
        format!("{}.metadata.json", self.default_file_name)
    }

    /// Default artifact path inside the cache directory
    pub fn default_artifact_path(&self) -> PathBuf {
        self.cache_dir.join(&self.default_file_name)
    }
}

/// Retry configuration for transient remote failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Policy that never retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }
}

/// Archive extraction configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Maximum nesting depth below the source container (default: 4)
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Extension of the payload file, without the dot (default: "xml")
    #[serde(default = "default_payload_extension")]
    pub payload_extension: String,

    /// File extensions to treat as nested containers
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,

    /// Parent directory for scratch directories (default: system temp dir)
    #[serde(default = "default_scratch_root")]
    pub scratch_root: PathBuf,

    /// Prefix for scratch directory names (default: "saft-submit-")
    #[serde(default = "default_scratch_prefix")]
    pub scratch_prefix: String,

    /// Upper bound for the total bytes written per extraction (default: 2 GiB)
    #[serde(default = "default_max_extracted_bytes")]
    pub max_extracted_bytes: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            payload_extension: default_payload_extension(),
            archive_extensions: default_archive_extensions(),
            scratch_root: default_scratch_root(),
            scratch_prefix: default_scratch_prefix(),
            max_extracted_bytes: default_max_extracted_bytes(),
        }
    }
}

/// Schema validation configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Where the schema is downloaded from when no local copy exists
    #[serde(default = "default_schema_url")]
    pub schema_url: String,

    /// Local schema copy (default: `<data_dir>/saft-submit/schemas/SAFTPT1.04_01.xsd`)
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,

    /// Upper bound for the schema download (default: 60 seconds)
    #[serde(default = "default_schema_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Retry policy for the schema download
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            schema_url: default_schema_url(),
            schema_path: default_schema_path(),
            request_timeout: default_schema_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

// Default value functions
fn default_download_url() -> Option<String> {
    Some(DEFAULT_DOWNLOAD_URL.to_string())
}

fn default_cache_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAMESPACE)
        .join("libs")
}

fn default_schema_url() -> String {
    DEFAULT_SCHEMA_URL.to_string()
}

fn default_schema_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAMESPACE)
        .join("schemas")
        .join("SAFTPT1.04_01.xsd")
}

fn default_schema_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_bundle_dirs() -> Vec<PathBuf> {
    let base = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));
    vec![base.join("libs"), base.join("resources")]
}

fn default_known_folders() -> Vec<PathBuf> {
    [dirs::download_dir(), dirs::document_dir(), dirs::desktop_dir()]
        .into_iter()
        .flatten()
        .collect()
}

fn default_file_name() -> String {
    "EnviaSaft.jar".to_string()
}

fn default_artifact_extension() -> String {
    "jar".to_string()
}

fn default_keywords() -> Vec<ArtifactKeyword> {
    vec![
        ArtifactKeyword::new("enviasaft", 4),
        ArtifactKeyword::new("factemicli", 3),
        ArtifactKeyword::new("cmdclient", 2),
        ArtifactKeyword::new("saft", 1),
    ]
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_user_agent() -> String {
    concat!("saft-submit/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_depth() -> u32 {
    4
}

fn default_payload_extension() -> String {
    "xml".to_string()
}

fn default_archive_extensions() -> Vec<String> {
    vec![
        "zip".into(),
        "rar".into(),
        "7z".into(),
        "tar".into(),
        "gz".into(),
        "tgz".into(),
    ]
}

fn default_scratch_root() -> PathBuf {
    std::env::temp_dir()
}

fn default_scratch_prefix() -> String {
    format!("{APP_NAMESPACE}-")
}

fn default_max_extracted_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
