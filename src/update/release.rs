//! Release index lookup.
//!
//! Queries a GitHub-style "latest release" endpoint and returns the tag and
//! the downloadable artifacts it lists.

use crate::error::UpdateError;
use serde::Deserialize;
use std::time::Duration;

/// A published release: its tag and the artifacts attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseDescriptor {
    /// Version tag (e.g. `"v1.2.3"`).
    #[serde(rename = "tag_name")]
    pub tag: String,
    /// Downloadable artifacts, in the order the index lists them.
    #[serde(rename = "assets", default)]
    pub artifacts: Vec<ArtifactRef>,
}

/// A single downloadable artifact of a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtifactRef {
    /// Artifact filename (e.g. `"uppi-agent-linux-amd64"`).
    pub name: String,
    /// Direct download URL.
    #[serde(rename = "browser_download_url")]
    pub url: String,
}

/// Fetches the latest release from the release index.
pub struct ReleaseResolver {
    agent: ureq::Agent,
    url: String,
}

impl ReleaseResolver {
    /// Create a resolver for the given index endpoint.
    pub fn new(url: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            agent: super::http_agent(read_timeout),
            url: url.into(),
        }
    }

    /// Fetch the latest published release.
    ///
    /// Makes exactly one request; failures are not retried.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Network`] on transport failure,
    /// [`UpdateError::Remote`] on a non-200 status and
    /// [`UpdateError::Decode`] if the body is not a release document.
    pub fn fetch_latest(&self) -> Result<ReleaseDescriptor, UpdateError> {
        tracing::debug!(url = %self.url, "querying release index");

        let resp = match self
            .agent
            .get(&self.url)
            .set("User-Agent", super::USER_AGENT)
            .set("Accept", "application/vnd.github+json")
            .call()
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, _)) => return Err(UpdateError::Remote { status }),
            Err(e) => return Err(UpdateError::Network(e.to_string())),
        };

        if resp.status() != 200 {
            return Err(UpdateError::Remote {
                status: resp.status(),
            });
        }

        serde_json::from_reader(resp.into_reader())
            .map_err(|e| UpdateError::Decode(e.to_string()))
    }
}
