//! Self-update system for the agent.
//!
//! Checks the release index for a newer version, downloads the artifact
//! built for this platform, swaps it in place of the running executable
//! with a rollback path, and restarts so the new binary takes over. Runs
//! once at daemon startup.

pub mod fetch;
pub mod orchestrator;
pub mod platform;
pub mod release;
pub mod restart;
pub mod swap;
pub mod version;

pub use fetch::{ArtifactFetcher, select_artifact};
pub use orchestrator::{UpdateDecision, UpdateOutcome, Updater};
pub use release::{ArtifactRef, ReleaseDescriptor, ReleaseResolver};
pub use restart::{
    OsProcessControl, ProcessControl, ProcessRestarter, RestartAction, SupervisionMode,
};
pub use swap::{BackupOutcome, BinarySwapper, OsFs, SwapFs, SwapReport};
pub use version::{VersionPolicy, is_newer};

use std::time::Duration;

/// User-Agent sent with every update request. GitHub rejects requests
/// without one.
pub(crate) const USER_AGENT: &str =
    concat!("uppi-agent/", env!("CARGO_PKG_VERSION"), " (self-update)");

/// Blocking HTTP agent with a bounded connect and read timeout.
pub(crate) fn http_agent(read_timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(15))
        .timeout_read(read_timeout)
        .build()
}
