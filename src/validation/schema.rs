//! Local copy of the official schema

use crate::config::ValidationConfig;
use crate::error::{AcquisitionError, Error, Result};
use crate::retry::with_retry;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Keeps the schema file present, downloading it once when missing
///
/// An existing non-empty copy is always used as is; the schema is versioned
/// in its file name, so there is no freshness check.
#[derive(Debug)]
pub struct SchemaStore {
    config: ValidationConfig,
    client: reqwest::Client,
}

impl SchemaStore {
    /// Create a store; builds the HTTP client with the configured timeout
    pub fn new(config: ValidationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("saft-submit/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, client })
    }

    /// Where the schema lives, whether or not it exists yet
    pub fn schema_path(&self) -> &Path {
        &self.config.schema_path
    }

    /// Return the local schema path, downloading the schema first if needed
    pub async fn ensure_schema(&self, cancel: &CancellationToken) -> Result<PathBuf> {
        let path = &self.config.schema_path;
        if let Ok(meta) = tokio::fs::metadata(path).await
            && meta.is_file()
            && meta.len() > 0
        {
            debug!(?path, "using local schema");
            return Ok(path.clone());
        }

        let url = self.config.schema_url.as_str();
        info!(url, ?path, "downloading schema");

        let attempt = move || async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(AcquisitionError::from)?;
            let status = response.status();
            if !status.is_success() {
                return Err(AcquisitionError::RemoteRejected {
                    status: status.as_u16(),
                    reason: status.canonical_reason().unwrap_or("unknown").to_string(),
                });
            }
            response.bytes().await.map_err(AcquisitionError::from)
        };

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = with_retry(&self.config.retry, attempt) => result?,
        };

        if !looks_like_xml(&body) {
            warn!(url, bytes = body.len(), "downloaded schema is not XML");
            return Err(AcquisitionError::InvalidArtifact {
                path: path.clone(),
                reason: "downloaded schema is not an XML document".to_string(),
            }
            .into());
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(dir).await?;
        let tmp = dir.join(format!(".schema.{:08x}.download", rand::random::<u32>()));
        tokio::fs::write(&tmp, &body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }

        info!(?path, bytes = body.len(), "saved schema");
        Ok(path.clone())
    }
}

/// Skips a UTF-8 byte order mark and leading whitespace
fn looks_like_xml(body: &[u8]) -> bool {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<')
}
