//! Agent configuration.
//!
//! Built once at startup from an optional TOML file plus command-line flags,
//! then handed by value to the components that need it. Nothing here is
//! mutated after the daemon starts.

use crate::error::{AgentError, Result};
use crate::update::VersionPolicy;
use crate::update::platform;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default Uppi instance receiving metric reports.
pub const DEFAULT_INSTANCE: &str = "https://uppi.dev";

/// Default GitHub endpoint listing the latest agent release.
pub const DEFAULT_RELEASE_INDEX_URL: &str =
    "https://api.github.com/repos/janyksteenbeek/uppi-server-agent/releases/latest";

/// Top-level agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Server identifier assigned by the Uppi instance.
    pub server_id: String,
    /// Shared secret used to sign metric reports.
    pub secret: String,
    /// Base URL of the Uppi instance.
    pub instance: String,
    /// Minutes between two metric reports.
    pub interval_minutes: u64,
    /// Skip the update check at startup.
    pub skip_updates: bool,
    /// Self-update settings.
    pub update: UpdateConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_id: String::new(),
            secret: String::new(),
            instance: DEFAULT_INSTANCE.to_owned(),
            interval_minutes: 1,
            skip_updates: false,
            update: UpdateConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AgentError::Config(e.to_string()))
    }

    /// Fill `server_id` and `secret` from a `serverId:secret` token.
    ///
    /// The token is split on the first `:` so secrets may contain colons.
    ///
    /// # Errors
    ///
    /// Returns an error if the separator is missing or either half is empty.
    pub fn apply_token(&mut self, token: &str) -> Result<()> {
        let (server_id, secret) = token.split_once(':').ok_or_else(|| {
            AgentError::Config("token must be in format {serverId}:{secret}".to_owned())
        })?;
        if server_id.is_empty() {
            return Err(AgentError::Config("server ID cannot be empty".to_owned()));
        }
        if secret.is_empty() {
            return Err(AgentError::Config("secret cannot be empty".to_owned()));
        }
        self.server_id = server_id.to_owned();
        self.secret = secret.to_owned();
        Ok(())
    }

    /// Check that the configuration can drive the daemon.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.server_id.is_empty() || self.secret.is_empty() {
            return Err(AgentError::Config("server ID and secret are required".to_owned()));
        }
        if self.instance.trim().is_empty() {
            return Err(AgentError::Config("instance URL cannot be empty".to_owned()));
        }
        if self.interval_minutes == 0 {
            return Err(AgentError::Config(
                "interval must be at least one minute".to_owned(),
            ));
        }
        Ok(())
    }

    /// Time between two metric reports.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    /// URL the metric reports are posted to.
    pub fn report_url(&self) -> String {
        format!(
            "{}/api/server/{}/report",
            self.instance.trim_end_matches('/'),
            self.server_id
        )
    }
}

/// Self-update configuration.
///
/// The running version and the platform identifiers describe the executable
/// itself, so they are never read from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Version compiled into this executable (e.g. `"1.0.0"`).
    #[serde(skip)]
    pub running_version: String,
    /// Operating system name used in artifact names (e.g. `"linux"`).
    #[serde(skip)]
    pub platform: String,
    /// Architecture name used in artifact names (e.g. `"amd64"`).
    #[serde(skip)]
    pub arch: String,
    /// Endpoint returning the latest release as JSON.
    pub release_index_url: String,
    /// Artifact name prefix, `<binary_name>-<os>-<arch>`.
    pub binary_name: String,
    /// Service manager unit restarted when running supervised.
    pub service_name: String,
    /// Fixed location the artifact is downloaded to.
    pub temp_path: PathBuf,
    /// Delay between spawning the replacement process and exiting.
    pub restart_grace_secs: u64,
    /// Read timeout for the release index request.
    pub index_timeout_secs: u64,
    /// Read timeout for the artifact download.
    pub download_timeout_secs: u64,
    /// How release tags are compared against the running version.
    pub policy: VersionPolicy,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            running_version: env!("CARGO_PKG_VERSION").to_owned(),
            platform: platform::os_name().to_owned(),
            arch: platform::arch_name().to_owned(),
            release_index_url: DEFAULT_RELEASE_INDEX_URL.to_owned(),
            binary_name: "uppi-agent".to_owned(),
            service_name: "uppi-agent".to_owned(),
            temp_path: std::env::temp_dir().join("uppi-agent-new"),
            restart_grace_secs: 2,
            index_timeout_secs: 60,
            download_timeout_secs: 300,
            policy: VersionPolicy::default(),
        }
    }
}

impl UpdateConfig {
    /// Grace delay before the old process exits after a self-managed restart.
    pub fn restart_grace(&self) -> Duration {
        Duration::from_secs(self.restart_grace_secs)
    }

    /// Name of the artifact built for this platform and architecture.
    pub fn artifact_name(&self) -> String {
        format!("{}-{}-{}", self.binary_name, self.platform, self.arch)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn default_config_matches_agent_constants() {
        let config = AgentConfig::default();
        assert_eq!(config.instance, "https://uppi.dev");
        assert_eq!(config.interval_minutes, 1);
        assert!(!config.skip_updates);
        assert_eq!(config.update.running_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.update.restart_grace(), Duration::from_secs(2));
        assert!(config.update.temp_path.ends_with("uppi-agent-new"));
    }

    #[test]
    fn apply_token_splits_on_first_colon() {
        let mut config = AgentConfig::default();
        config.apply_token("srv-1:se:cret").unwrap();
        assert_eq!(config.server_id, "srv-1");
        assert_eq!(config.secret, "se:cret");
    }

    #[test]
    fn apply_token_rejects_malformed() {
        let mut config = AgentConfig::default();
        assert!(config.apply_token("no-separator").is_err());
        assert!(config.apply_token(":secret").is_err());
        assert!(config.apply_token("server:").is_err());
        assert!(config.server_id.is_empty());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = AgentConfig::default();
        config.apply_token("a:b").unwrap();
        assert!(config.validate().is_ok());
        config.interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_credentials() {
        assert!(AgentConfig::default().validate().is_err());
    }

    #[test]
    fn report_url_trims_trailing_slash() {
        let config = AgentConfig {
            server_id: "42".to_owned(),
            instance: "https://example.test/".to_owned(),
            ..Default::default()
        };
        assert_eq!(config.report_url(), "https://example.test/api/server/42/report");
    }

    #[test]
    fn artifact_name_uses_platform_and_arch() {
        let config = UpdateConfig {
            platform: "linux".to_owned(),
            arch: "arm64".to_owned(),
            ..Default::default()
        };
        assert_eq!(config.artifact_name(), "uppi-agent-linux-arm64");
    }

    #[test]
    fn from_file_reads_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            r#"
instance = "https://monitor.example"
interval_minutes = 5

[update]
service_name = "custom-agent"
policy = "semver"
"#,
        )
        .unwrap();

        let config = AgentConfig::from_file(&path).unwrap();
        assert_eq!(config.instance, "https://monitor.example");
        assert_eq!(config.interval_minutes, 5);
        assert_eq!(config.update.service_name, "custom-agent");
        assert_eq!(config.update.policy, VersionPolicy::Semver);
        // Fields describing the executable are never taken from the file.
        assert_eq!(config.update.running_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.update.binary_name, "uppi-agent");
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = AgentConfig::from_file(Path::new("/nonexistent/path/agent.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(matches!(
            AgentConfig::from_file(&path),
            Err(AgentError::Config(_))
        ));
    }
}
