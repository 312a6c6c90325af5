//! Artifact selection and download.

use super::release::{ArtifactRef, ReleaseDescriptor};
use crate::config::UpdateConfig;
use crate::error::UpdateError;
use std::path::Path;
use std::time::Duration;

/// Select the artifact named [`UpdateConfig::artifact_name`].
///
/// Matching is exact; the order of the release's artifact list does not
/// matter.
///
/// # Errors
///
/// Returns [`UpdateError::NotFound`] if no artifact carries that name.
pub fn select_artifact(
    release: &ReleaseDescriptor,
    config: &UpdateConfig,
) -> Result<ArtifactRef, UpdateError> {
    let expected = config.artifact_name();
    release
        .artifacts
        .iter()
        .find(|a| a.name == expected)
        .cloned()
        .ok_or_else(|| UpdateError::NotFound {
            platform: config.platform.clone(),
            arch: config.arch.clone(),
        })
}

/// Downloads release artifacts to local storage.
pub struct ArtifactFetcher {
    agent: ureq::Agent,
}

impl ArtifactFetcher {
    /// Create a fetcher whose reads time out after `read_timeout`.
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            agent: super::http_agent(read_timeout),
        }
    }

    /// Stream `artifact` into `dest`, replacing any stale file there.
    ///
    /// Returns the number of bytes written. On error `dest` may hold a
    /// truncated download and must not be used.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Fetch`] on transport failure, a non-200
    /// status, or a write failure.
    pub fn download(&self, artifact: &ArtifactRef, dest: &Path) -> Result<u64, UpdateError> {
        tracing::info!(artifact = %artifact.name, url = %artifact.url, "downloading update");

        let resp = match self
            .agent
            .get(&artifact.url)
            .set("User-Agent", super::USER_AGENT)
            .call()
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, _)) => {
                return Err(UpdateError::Fetch(format!(
                    "{} returned status {status}",
                    artifact.url
                )));
            }
            Err(e) => return Err(UpdateError::Fetch(e.to_string())),
        };

        if resp.status() != 200 {
            return Err(UpdateError::Fetch(format!(
                "{} returned status {}",
                artifact.url,
                resp.status()
            )));
        }

        let mut file = std::fs::File::create(dest).map_err(|e| {
            UpdateError::Fetch(format!("cannot create {}: {e}", dest.display()))
        })?;

        let written = std::io::copy(&mut resp.into_reader(), &mut file)
            .map_err(|e| UpdateError::Fetch(format!("download write failed: {e}")))?;

        file.sync_all()
            .map_err(|e| UpdateError::Fetch(format!("cannot flush {}: {e}", dest.display())))?;

        tracing::debug!(bytes = written, dest = %dest.display(), "download complete");
        Ok(written)
    }
}
