//! Error types for the uppi agent.

/// Failures of the self-update subsystem.
///
/// Every variant except [`UpdateError::RollbackFailed`] is routine: the
/// update attempt is abandoned and the daemon keeps running the binary it
/// started with.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// Transport failure talking to the release index.
    #[error("network error: {0}")]
    Network(String),

    /// The release index answered with a non-success status.
    #[error("release index returned status {status}")]
    Remote {
        /// HTTP status code.
        status: u16,
    },

    /// The release index body could not be parsed.
    #[error("cannot decode release index: {0}")]
    Decode(String),

    /// The release carries no artifact for this platform/architecture.
    #[error("no artifact found for {platform}-{arch}")]
    NotFound {
        /// Operating system name used in artifact names (e.g. `linux`).
        platform: String,
        /// Architecture name used in artifact names (e.g. `amd64`).
        arch: String,
    },

    /// Transport, status, or write failure while downloading an artifact.
    #[error("download failed: {0}")]
    Fetch(String),

    /// The downloaded artifact could not be made executable.
    #[error("cannot make downloaded binary executable: {0}")]
    Permission(String),

    /// Replacing the live binary failed and the backup was restored.
    #[error("cannot replace binary: {0}")]
    ReplaceFailed(String),

    /// Replacing the live binary failed and so did restoring the backup.
    /// The host may be left without a runnable agent.
    #[error("cannot replace binary ({replace}) and cannot restore backup ({rollback})")]
    RollbackFailed {
        /// Why the replace step failed.
        replace: String,
        /// Why the rollback failed.
        rollback: String,
    },

    /// Filesystem error outside the swap state machine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    /// Returns `true` when the error requires operator attention.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::RollbackFailed { .. })
    }
}

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Metric collection error.
    #[error("collect error: {0}")]
    Collect(String),

    /// Metric report error (transport, status, serialization).
    #[error("report error: {0}")]
    Report(String),

    /// Self-update error.
    #[error("update error: {0}")]
    Update(#[from] UpdateError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AgentError>;
