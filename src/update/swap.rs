//! Replacing the running executable.
//!
//! The swap runs four steps on the live path `L`, the downloaded artifact
//! `T` and the backup `B = L + ".backup"`:
//!
//! 1. **Stage**: mark `T` executable. Failure aborts before `L` is touched.
//! 2. **Backup**: copy `L` to `B`. Failure is accepted: the swap goes on
//!    without a safety net ([`BackupOutcome::ProceedWithoutSafetyNet`]).
//! 3. **Replace**: install `T` at `L` through a freshly created file. On
//!    failure exactly one rollback from `B` is attempted; if that fails too
//!    the error is critical.
//! 4. **Cleanup**: remove `T` and `B`. Failures are only logged.
//!
//! `L` is never truncated in place. New content is written to a staging
//! file next to it and renamed over it, so `L` always holds either the old
//! or the new binary.

use crate::error::UpdateError;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Filesystem operations used by the swap.
///
/// [`OsFs`] is the real implementation; tests substitute failing ones.
pub trait SwapFs {
    /// Apply executable permission bits to `path`.
    fn set_executable(&self, path: &Path) -> io::Result<()>;

    /// Copy `src` to `dst`, preserving the file mode.
    fn copy(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Put `src`'s bytes and mode at `dst` via a new file, never by
    /// truncating `dst`.
    fn install(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Delete `path`.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// [`SwapFs`] backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFs;

impl SwapFs for OsFs {
    fn set_executable(&self, path: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        }
        #[cfg(not(unix))]
        {
            std::fs::metadata(path).map(|_| ())
        }
    }

    fn copy(&self, src: &Path, dst: &Path) -> io::Result<()> {
        std::fs::copy(src, dst)?;
        std::fs::set_permissions(dst, std::fs::metadata(src)?.permissions())
    }

    fn install(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let staging = with_suffix(dst, ".new");
        let result = std::fs::copy(src, &staging)
            .and_then(|_| std::fs::set_permissions(&staging, std::fs::metadata(src)?.permissions()))
            .and_then(|()| std::fs::rename(&staging, dst));
        if result.is_err() {
            let _ = std::fs::remove_file(&staging);
        }
        result
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Result of the Backup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// `B` holds a copy of the previous binary.
    Created,
    /// `B` could not be written; the swap continues without a rollback path.
    ProceedWithoutSafetyNet,
}

/// Summary of a successful swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapReport {
    /// How the Backup step ended.
    pub backup: BackupOutcome,
}

/// Performs the Stage → Backup → Replace → Cleanup sequence.
pub struct BinarySwapper<F = OsFs> {
    live: PathBuf,
    temp: PathBuf,
    backup: PathBuf,
    fs: F,
}

impl BinarySwapper<OsFs> {
    /// Swapper for the running executable.
    ///
    /// # Errors
    ///
    /// Returns an error if the executable path cannot be determined.
    pub fn for_current_exe(temp: impl Into<PathBuf>) -> Result<Self, UpdateError> {
        Ok(Self::new(current_exe_path()?, temp))
    }

    /// Swapper replacing `live` with the already downloaded `temp`.
    pub fn new(live: impl Into<PathBuf>, temp: impl Into<PathBuf>) -> Self {
        Self::with_fs(live, temp, OsFs)
    }
}

impl<F: SwapFs> BinarySwapper<F> {
    /// Swapper using custom filesystem operations.
    pub fn with_fs(live: impl Into<PathBuf>, temp: impl Into<PathBuf>, fs: F) -> Self {
        let live = live.into();
        let backup = with_suffix(&live, ".backup");
        Self {
            live,
            temp: temp.into(),
            backup,
            fs,
        }
    }

    /// The live executable path.
    pub fn live_path(&self) -> &Path {
        &self.live
    }

    /// The backup path (`live + ".backup"`).
    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// Run the full swap.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Permission`] if Stage fails; nothing was changed.
    /// - [`UpdateError::ReplaceFailed`] if Replace fails and the backup was
    ///   restored.
    /// - [`UpdateError::RollbackFailed`] if Replace fails and the backup could
    ///   not be restored. The live path may be broken.
    pub fn swap(&self) -> Result<SwapReport, UpdateError> {
        self.stage()?;
        let backup = self.backup();
        if let Err(e) = self.fs.install(&self.temp, &self.live) {
            return Err(self.rollback(backup, e));
        }
        tracing::info!(path = %self.live.display(), "binary replaced");
        self.cleanup();
        Ok(SwapReport { backup })
    }

    fn stage(&self) -> Result<(), UpdateError> {
        self.fs.set_executable(&self.temp).map_err(|e| {
            UpdateError::Permission(format!("{}: {e}", self.temp.display()))
        })
    }

    fn backup(&self) -> BackupOutcome {
        match self.fs.copy(&self.live, &self.backup) {
            Ok(()) => {
                tracing::debug!(backup = %self.backup.display(), "backup created");
                BackupOutcome::Created
            }
            Err(e) => {
                tracing::warn!(
                    backup = %self.backup.display(),
                    error = %e,
                    "cannot create backup, replacing binary without a safety net"
                );
                BackupOutcome::ProceedWithoutSafetyNet
            }
        }
    }

    fn rollback(&self, backup: BackupOutcome, replace_err: io::Error) -> UpdateError {
        let replace = format!("{}: {replace_err}", self.live.display());

        let restored = match backup {
            BackupOutcome::Created => self.fs.install(&self.backup, &self.live),
            BackupOutcome::ProceedWithoutSafetyNet => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no backup available",
            )),
        };

        match restored {
            Ok(()) => {
                tracing::warn!(
                    path = %self.live.display(),
                    error = %replace_err,
                    "replace failed, previous binary restored"
                );
                self.remove_quietly(&self.backup);
                UpdateError::ReplaceFailed(replace)
            }
            Err(e) => {
                let message = match backup {
                    BackupOutcome::Created => {
                        "CRITICAL: cannot restore backup after failed update, \
                         agent binary may be unusable"
                    }
                    BackupOutcome::ProceedWithoutSafetyNet => {
                        "CRITICAL: replace failed and no backup exists to restore, \
                         verify the agent binary before the next restart"
                    }
                };
                tracing::error!(
                    critical = true,
                    path = %self.live.display(),
                    replace_error = %replace_err,
                    rollback_error = %e,
                    "{message}"
                );
                UpdateError::RollbackFailed {
                    replace,
                    rollback: e.to_string(),
                }
            }
        }
    }

    fn cleanup(&self) {
        self.remove_quietly(&self.temp);
        self.remove_quietly(&self.backup);
    }

    fn remove_quietly(&self, path: &Path) {
        match self.fs.remove(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot remove file"),
        }
    }
}

/// Returns the path to the currently running executable.
///
/// # Errors
///
/// Returns an error if the path cannot be determined.
pub fn current_exe_path() -> Result<PathBuf, UpdateError> {
    let path = std::env::current_exe()?;
    Ok(std::fs::canonicalize(&path).unwrap_or(path))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
