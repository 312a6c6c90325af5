//! Sequencing of a single update check.
//!
//! resolve → compare → fetch → swap → restart. Every failure before a
//! successful Replace leaves the running binary untouched and the daemon
//! simply carries on. Only a successful swap triggers the restart.

use super::fetch::{ArtifactFetcher, select_artifact};
use super::release::{ArtifactRef, ReleaseDescriptor, ReleaseResolver};
use super::restart::{OsProcessControl, ProcessControl, ProcessRestarter, RestartAction};
use super::swap::{BackupOutcome, BinarySwapper, OsFs, SwapFs};
use crate::config::UpdateConfig;
use crate::error::UpdateError;
use std::time::Duration;

/// What comparing a release with the running version concluded.
#[derive(Debug)]
pub enum UpdateDecision {
    /// The release is not newer than the running version.
    UpToDate,
    /// A newer release exists and has an artifact for this platform.
    Available(ArtifactRef),
    /// A newer release exists but nothing was built for this platform.
    NoMatchingArtifact(UpdateError),
}

impl UpdateDecision {
    /// Compare `release` against the running version in `config`.
    pub fn evaluate(release: &ReleaseDescriptor, config: &UpdateConfig) -> Self {
        if !config.policy.is_newer(&release.tag, &config.running_version) {
            return Self::UpToDate;
        }
        match select_artifact(release, config) {
            Ok(artifact) => Self::Available(artifact),
            Err(e) => Self::NoMatchingArtifact(e),
        }
    }
}

/// How an update check ended.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// Already running the latest release.
    UpToDate,
    /// The release index could not be queried.
    CheckFailed(UpdateError),
    /// A newer release exists without an artifact for this platform.
    NoMatchingArtifact(UpdateError),
    /// Download or staging failed; the live binary was not touched.
    Aborted(UpdateError),
    /// Replace failed and the previous binary was restored.
    RolledBack(UpdateError),
    /// Replace and rollback both failed. Needs operator attention.
    Critical(UpdateError),
    /// The new binary is in place and the restart was issued.
    Applied {
        /// Tag of the installed release.
        version: String,
        /// Whether a backup existed during the swap.
        backup: BackupOutcome,
        /// How the hand-over was performed.
        restart: RestartAction,
    },
}

impl UpdateOutcome {
    /// Returns `true` if the outcome requires operator attention.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical(_))
    }
}

/// Runs update checks for the agent.
///
/// Built once from an [`UpdateConfig`] and never reconfigured.
pub struct Updater<F = OsFs, C = OsProcessControl> {
    config: UpdateConfig,
    resolver: ReleaseResolver,
    fetcher: ArtifactFetcher,
    swapper: BinarySwapper<F>,
    restarter: ProcessRestarter<C>,
}

impl Updater<OsFs, OsProcessControl> {
    /// Updater for the running executable.
    ///
    /// # Errors
    ///
    /// Returns an error if the executable path cannot be determined.
    pub fn new(config: UpdateConfig) -> Result<Self, UpdateError> {
        let swapper = BinarySwapper::for_current_exe(&config.temp_path)?;
        let restarter = ProcessRestarter::for_current_process(
            &config.service_name,
            config.restart_grace(),
            swapper.live_path(),
        );
        Ok(Self::with_parts(config, swapper, restarter))
    }
}

impl<F: SwapFs, C: ProcessControl> Updater<F, C> {
    /// Updater with explicit swap and restart components.
    ///
    /// The swapper must have been created with `config.temp_path` as its
    /// temporary artifact path.
    pub fn with_parts(
        config: UpdateConfig,
        swapper: BinarySwapper<F>,
        restarter: ProcessRestarter<C>,
    ) -> Self {
        let resolver = ReleaseResolver::new(
            &config.release_index_url,
            Duration::from_secs(config.index_timeout_secs),
        );
        let fetcher = ArtifactFetcher::new(Duration::from_secs(config.download_timeout_secs));
        Self {
            config,
            resolver,
            fetcher,
            swapper,
            restarter,
        }
    }

    /// Check for a newer release and install it.
    ///
    /// Never fails: every error is logged and folded into the outcome. On
    /// [`UpdateOutcome::Applied`] with a self-managed restart this process
    /// exits shortly after returning.
    pub fn check_and_apply(&self) -> UpdateOutcome {
        tracing::info!(current = %self.config.running_version, "checking for updates");

        let release = match self.resolver.fetch_latest() {
            Ok(release) => release,
            Err(e) => {
                tracing::warn!(error = %e, "cannot check for updates");
                return UpdateOutcome::CheckFailed(e);
            }
        };

        let artifact = match UpdateDecision::evaluate(&release, &self.config) {
            UpdateDecision::UpToDate => {
                tracing::info!(latest = %release.tag, "already running the latest version");
                return UpdateOutcome::UpToDate;
            }
            UpdateDecision::NoMatchingArtifact(err) => {
                tracing::warn!(latest = %release.tag, error = %err, "update skipped");
                return UpdateOutcome::NoMatchingArtifact(err);
            }
            UpdateDecision::Available(artifact) => artifact,
        };

        tracing::info!(
            latest = %release.tag,
            current = %self.config.running_version,
            policy = %self.config.policy,
            "new version available"
        );

        if let Err(e) = self.fetcher.download(&artifact, &self.config.temp_path) {
            tracing::warn!(error = %e, "update aborted");
            return UpdateOutcome::Aborted(e);
        }

        let report = match self.swapper.swap() {
            Ok(report) => report,
            Err(e) if e.is_critical() => return UpdateOutcome::Critical(e),
            Err(e @ UpdateError::ReplaceFailed(_)) => {
                tracing::warn!(error = %e, "update failed, continuing on the current binary");
                return UpdateOutcome::RolledBack(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "update aborted");
                return UpdateOutcome::Aborted(e);
            }
        };

        tracing::info!(version = %release.tag, "update completed successfully, restarting");
        let restart = self.restarter.restart();

        UpdateOutcome::Applied {
            version: release.tag,
            backup: report.backup,
            restart,
        }
    }
}
