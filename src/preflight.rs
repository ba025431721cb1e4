//! Environment checks run before a submission
//!
//! Each check reports independently; a failed check never stops the others.

use crate::acquisition::ArtifactManager;
use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Upper bound for `java -version`
const JAVA_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one environment check
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightCheck {
    /// Short name of the check
    pub name: String,
    /// Whether the check passed
    pub success: bool,
    /// What was found
    pub details: String,
    /// What the user can do about a failure
    pub suggested_fix: Option<String>,
}

impl PreflightCheck {
    fn passed(name: &str, details: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            details: details.into(),
            suggested_fix: None,
        }
    }

    fn failed(name: &str, details: impl Into<String>, fix: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            details: details.into(),
            suggested_fix: Some(fix.into()),
        }
    }
}

/// Run all checks: Java runtime, artifact availability, storage writability
pub async fn run(config: &Config) -> Vec<PreflightCheck> {
    let artifact_config = config.clone();
    let artifact = tokio::task::spawn_blocking(move || check_artifact(&artifact_config))
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "artifact check did not finish");
            PreflightCheck::failed(
                "Submission tool",
                format!("the artifact check did not finish: {}", e),
                "Run the checks again.",
            )
        });

    let checks = vec![
        check_java().await,
        artifact,
        check_writable("Artifact cache", &config.acquisition.cache_dir).await,
        check_writable("Scratch space", &config.extraction.scratch_root).await,
    ];

    let failed = checks.iter().filter(|c| !c.success).count();
    debug!(total = checks.len(), failed, "preflight checks finished");
    checks
}

/// Locate `java` on the PATH and read its version banner
pub async fn check_java() -> PreflightCheck {
    const NAME: &str = "Java runtime";
    const FIX: &str = "Install a Java runtime (version 8 or later) and make sure `java` is on the PATH.";

    let Ok(java) = which::which("java") else {
        return PreflightCheck::failed(NAME, "`java` was not found on the PATH", FIX);
    };

    let probe = Command::new(&java).arg("-version").kill_on_drop(true).output();
    match tokio::time::timeout(JAVA_PROBE_TIMEOUT, probe).await {
        Ok(Ok(output)) if output.status.success() => {
            // The banner goes to stderr
            let banner = String::from_utf8_lossy(&output.stderr);
            let version = banner
                .lines()
                .chain(String::from_utf8_lossy(&output.stdout).lines())
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("unknown version")
                .to_string();
            PreflightCheck::passed(NAME, format!("{} ({})", version, java.display()))
        }
        Ok(Ok(output)) => PreflightCheck::failed(
            NAME,
            format!("`java -version` exited with {:?}", output.status.code()),
            FIX,
        ),
        Ok(Err(e)) => {
            warn!(?java, error = %e, "failed to run java");
            PreflightCheck::failed(NAME, format!("could not run {}: {}", java.display(), e), FIX)
        }
        Err(_) => {
            warn!(?java, timeout = ?JAVA_PROBE_TIMEOUT, "java -version timed out");
            PreflightCheck::failed(
                NAME,
                format!("`java -version` did not answer within {:?}", JAVA_PROBE_TIMEOUT),
                FIX,
            )
        }
    }
}

/// Whether a local artifact copy can be found without network access
///
/// Walks the cache and bundle directories synchronously; async callers go
/// through [`run`], which moves it onto the blocking pool.
pub fn check_artifact(config: &Config) -> PreflightCheck {
    const NAME: &str = "Submission tool";

    let manager = match ArtifactManager::new(config.acquisition.clone()) {
        Ok(manager) => manager,
        Err(e) => {
            return PreflightCheck::failed(
                NAME,
                format!("could not prepare the artifact manager: {}", e),
                "Check the acquisition settings.",
            );
        }
    };

    let path = manager.local_artifact_path();
    if path.is_file() {
        PreflightCheck::passed(NAME, format!("found {}", path.display()))
    } else {
        PreflightCheck::failed(
            NAME,
            format!("no local copy of {}", config.acquisition.default_file_name),
            format!(
                "Connect to the internet so it can be downloaded, or place it manually in {}.",
                config.acquisition.cache_dir.display()
            ),
        )
    }
}

/// Create and remove a probe file inside `dir`, creating `dir` if needed
pub async fn check_writable(name: &str, dir: &Path) -> PreflightCheck {
    let probe = dir.join(format!(".saft-submit-probe-{:08x}", rand::random::<u32>()));

    let result = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&probe, b"probe").await?;
        tokio::fs::remove_file(&probe).await
    }
    .await;

    match result {
        Ok(()) => PreflightCheck::passed(name, format!("{} is writable", dir.display())),
        Err(e) => {
            warn!(?dir, error = %e, "directory is not writable");
            PreflightCheck::failed(
                name,
                format!("{} is not writable: {}", dir.display(), e),
                format!("Grant write access to {} or choose another directory.", dir.display()),
            )
        }
    }
}
