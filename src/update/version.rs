//! Release tag comparison.
//!
//! The default [`VersionPolicy::Exact`] is a staleness check, not an
//! ordering: any tag that differs from the running one after stripping a
//! leading `v` counts as newer, including downgrades and pre-releases.
//! [`VersionPolicy::Semver`] only accepts strictly greater versions.

use serde::{Deserialize, Serialize};

/// How a candidate release tag is compared against the running version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionPolicy {
    /// Any textual difference is an update.
    #[default]
    Exact,
    /// Only a strictly greater semantic version is an update.
    Semver,
}

impl VersionPolicy {
    /// Returns `true` if `candidate` should replace `running`.
    pub fn is_newer(self, candidate: &str, running: &str) -> bool {
        match self {
            Self::Exact => is_newer(candidate, running),
            Self::Semver => {
                let parsed = (
                    semver::Version::parse(normalize(candidate)),
                    semver::Version::parse(normalize(running)),
                );
                match parsed {
                    (Ok(candidate), Ok(running)) => candidate > running,
                    _ => {
                        tracing::warn!(
                            candidate,
                            running,
                            "tag is not a semantic version, falling back to exact comparison"
                        );
                        is_newer(candidate, running)
                    }
                }
            }
        }
    }
}

impl std::fmt::Display for VersionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Semver => write!(f, "semver"),
        }
    }
}

/// Returns `true` if the tags differ after stripping one leading `v`.
pub fn is_newer(candidate: &str, running: &str) -> bool {
    normalize(candidate) != normalize(running)
}

fn normalize(tag: &str) -> &str {
    tag.strip_prefix('v').unwrap_or(tag)
}
