//! Handing over to the freshly installed binary.
//!
//! Under a service manager the agent asks the manager to restart the unit
//! and lets it do the rest. Otherwise it launches a detached copy of itself
//! with the same arguments and exits after a grace delay, even if the launch
//! failed.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Environment variables set by systemd for the main process of a unit.
///
/// `INVOCATION_ID` is not a marker: children of any unit inherit it, so it
/// does not mean that `uppi-agent` itself is a unit.
pub const SUPERVISOR_ENV_MARKERS: &[&str] = &["SYSTEMD_EXEC_PID"];

/// Whether something outside the agent manages its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionMode {
    /// A service manager restarts the process.
    Supervised,
    /// The agent has to relaunch itself.
    SelfManaged,
}

impl SupervisionMode {
    /// Inspect the environment and parent process of this process.
    pub fn detect() -> Self {
        Self::from_signals(|key| std::env::var_os(key).is_some(), parent_pid())
    }

    /// Decide from an environment lookup and the parent PID.
    ///
    /// A parent PID of 1 means the process was started by init.
    pub fn from_signals(has_env: impl Fn(&str) -> bool, parent_pid: Option<u32>) -> Self {
        if SUPERVISOR_ENV_MARKERS.iter().any(|key| has_env(key)) || parent_pid == Some(1) {
            Self::Supervised
        } else {
            Self::SelfManaged
        }
    }
}

#[cfg(unix)]
fn parent_pid() -> Option<u32> {
    Some(std::os::unix::process::parent_id())
}

#[cfg(not(unix))]
fn parent_pid() -> Option<u32> {
    None
}

/// OS process operations needed for a restart.
pub trait ProcessControl {
    /// Current supervision mode. Evaluated on every restart attempt.
    fn supervision(&self) -> SupervisionMode {
        SupervisionMode::detect()
    }

    /// Ask the service manager to restart `service`.
    fn restart_service(&self, service: &str) -> io::Result<()>;

    /// Launch `program` with `args` as a detached process.
    fn spawn(&self, program: &Path, args: &[OsString]) -> io::Result<()>;

    /// Terminate this process once `grace` has elapsed.
    fn schedule_exit(&self, grace: Duration);
}

/// [`ProcessControl`] backed by `systemctl` and `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsProcessControl;

impl ProcessControl for OsProcessControl {
    fn restart_service(&self, service: &str) -> io::Result<()> {
        let status = Command::new("systemctl")
            .args(["restart", service])
            .stdin(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "systemctl restart {service} exited with {status}"
            )))
        }
    }

    fn spawn(&self, program: &Path, args: &[OsString]) -> io::Result<()> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd.spawn().map(|child| {
            tracing::debug!(pid = child.id(), "replacement process started");
        })
    }

    fn schedule_exit(&self, grace: Duration) {
        std::thread::spawn(move || {
            std::thread::sleep(grace);
            tracing::info!("exiting to hand over to the replacement process");
            std::process::exit(0);
        });
    }
}

/// What the restarter did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartAction {
    /// The service manager was asked to restart the unit.
    ServiceRestart {
        /// Whether the restart command succeeded.
        requested: bool,
    },
    /// A new instance was launched and this process will exit.
    Relaunch {
        /// Whether the new instance was started.
        spawned: bool,
    },
}

/// Restarts the agent so the new binary takes over.
pub struct ProcessRestarter<C = OsProcessControl> {
    service_name: String,
    grace: Duration,
    program: PathBuf,
    args: Vec<OsString>,
    control: C,
}

impl ProcessRestarter<OsProcessControl> {
    /// Restarter for this process, relaunching `program` with the arguments
    /// the process was started with.
    pub fn for_current_process(
        service_name: impl Into<String>,
        grace: Duration,
        program: impl Into<PathBuf>,
    ) -> Self {
        Self::with_control(
            service_name,
            grace,
            program,
            std::env::args_os().skip(1).collect(),
            OsProcessControl,
        )
    }
}

impl<C: ProcessControl> ProcessRestarter<C> {
    /// Restarter with explicit arguments and process operations.
    pub fn with_control(
        service_name: impl Into<String>,
        grace: Duration,
        program: impl Into<PathBuf>,
        args: Vec<OsString>,
        control: C,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            grace,
            program: program.into(),
            args,
            control,
        }
    }

    /// Restart under the supervisor or relaunch this binary.
    ///
    /// When relaunching, this process exits after the grace delay whether or
    /// not the new instance could be started.
    pub fn restart(&self) -> RestartAction {
        match self.control.supervision() {
            SupervisionMode::Supervised => {
                tracing::info!(
                    service = %self.service_name,
                    "requesting restart from service manager"
                );
                let requested = match self.control.restart_service(&self.service_name) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!(
                            service = %self.service_name,
                            error = %e,
                            "service restart failed"
                        );
                        false
                    }
                };
                RestartAction::ServiceRestart { requested }
            }
            SupervisionMode::SelfManaged => {
                tracing::info!(program = %self.program.display(), "relaunching agent");
                let spawned = match self.control.spawn(&self.program, &self.args) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            "cannot start replacement process, exiting anyway"
                        );
                        false
                    }
                };
                self.control.schedule_exit(self.grace);
                RestartAction::Relaunch { spawned }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// A recorded [`ProcessControl`] call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        RestartService(String),
        Spawn(PathBuf, Vec<OsString>),
        ScheduleExit(Duration),
    }

    /// Records calls instead of touching processes.
    #[derive(Clone)]
    pub(crate) struct RecordingControl {
        pub(crate) mode: SupervisionMode,
        pub(crate) fail: bool,
        pub(crate) calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RecordingControl {
        pub(crate) fn new(mode: SupervisionMode) -> Self {
            Self {
                mode,
                fail: false,
                calls: Arc::default(),
            }
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        fn record(&self, call: Call) -> io::Result<()> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
            if self.fail {
                Err(io::Error::other("simulated failure"))
            } else {
                Ok(())
            }
        }
    }

    impl ProcessControl for RecordingControl {
        fn supervision(&self) -> SupervisionMode {
            self.mode
        }

        fn restart_service(&self, service: &str) -> io::Result<()> {
            self.record(Call::RestartService(service.to_owned()))
        }

        fn spawn(&self, program: &Path, args: &[OsString]) -> io::Result<()> {
            self.record(Call::Spawn(program.to_owned(), args.to_vec()))
        }

        fn schedule_exit(&self, grace: Duration) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(Call::ScheduleExit(grace));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::testing::{Call, RecordingControl};
    use super::*;

    fn restarter(control: RecordingControl) -> ProcessRestarter<RecordingControl> {
        ProcessRestarter::with_control(
            "uppi-agent",
            Duration::from_secs(2),
            "/usr/local/bin/uppi-agent",
            vec![OsString::from("srv:secret"), OsString::from("--interval-minutes=5")],
            control,
        )
    }

    #[test]
    fn env_marker_means_supervised() {
        let mode = SupervisionMode::from_signals(|key| key == "SYSTEMD_EXEC_PID", Some(4242));
        assert_eq!(mode, SupervisionMode::Supervised);
    }

    #[test]
    fn inherited_invocation_id_is_not_supervision() {
        let mode = SupervisionMode::from_signals(|key| key == "INVOCATION_ID", Some(4242));
        assert_eq!(mode, SupervisionMode::SelfManaged);
    }

    #[test]
    fn init_parent_means_supervised() {
        let mode = SupervisionMode::from_signals(|_| false, Some(1));
        assert_eq!(mode, SupervisionMode::Supervised);
    }

    #[test]
    fn no_signal_means_self_managed() {
        assert_eq!(
            SupervisionMode::from_signals(|_| false, Some(4242)),
            SupervisionMode::SelfManaged
        );
        assert_eq!(
            SupervisionMode::from_signals(|_| false, None),
            SupervisionMode::SelfManaged
        );
    }

    #[test]
    fn supervised_restart_does_not_spawn() {
        let control = RecordingControl::new(SupervisionMode::Supervised);
        let action = restarter(control.clone()).restart();

        assert_eq!(action, RestartAction::ServiceRestart { requested: true });
        assert_eq!(control.calls(), vec![Call::RestartService("uppi-agent".to_owned())]);
    }

    #[test]
    fn self_managed_restart_spawns_with_same_args_and_exits() {
        let control = RecordingControl::new(SupervisionMode::SelfManaged);
        let action = restarter(control.clone()).restart();

        assert_eq!(action, RestartAction::Relaunch { spawned: true });
        assert_eq!(
            control.calls(),
            vec![
                Call::Spawn(
                    PathBuf::from("/usr/local/bin/uppi-agent"),
                    vec![OsString::from("srv:secret"), OsString::from("--interval-minutes=5")],
                ),
                Call::ScheduleExit(Duration::from_secs(2)),
            ]
        );
    }

    #[test]
    fn failed_spawn_still_schedules_exit() {
        let mut control = RecordingControl::new(SupervisionMode::SelfManaged);
        control.fail = true;
        let action = restarter(control.clone()).restart();

        assert_eq!(action, RestartAction::Relaunch { spawned: false });
        assert!(control
            .calls()
            .contains(&Call::ScheduleExit(Duration::from_secs(2))));
    }

    #[test]
    fn failed_service_restart_is_reported() {
        let mut control = RecordingControl::new(SupervisionMode::Supervised);
        control.fail = true;
        let action = restarter(control.clone()).restart();

        assert_eq!(action, RestartAction::ServiceRestart { requested: false });
        assert_eq!(control.calls().len(), 1);
    }
}
