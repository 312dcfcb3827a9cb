//! Preflight checks that decide whether an instance may talk to the desktop shell at all.
use std::{
    ffi::OsStr,
    io::Read,
    process::{Command, Stdio},
    time::Duration,
};

use sysinfo::{ProcessRefreshKind, RefreshKind, System};
use wait_timeout::ChildExt;

use crate::{bus::SessionBus, Error, Result};

/// Resolves a process name to the pid of one running instance.
pub trait ProcessLookup {
    fn pid_of(&self, name: &str) -> Option<u32>;
}

/// Looks processes up on the real host.
///
/// Runs `pidof` and waits at most `timeout` for it. Hosts without `pidof` get a scan of the
/// process table instead.
#[derive(Debug, Clone)]
pub struct SystemProcesses {
    timeout: Duration,
}

impl SystemProcesses {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// `Err` only if `pidof` could not be started.
    fn run_pidof(&self, name: &str) -> std::io::Result<Option<u32>> {
        let mut command = Command::new("pidof");
        command.arg(name);
        let output = output_with_timeout(command, self.timeout)?;
        Ok(output.as_deref().and_then(parse_pid))
    }
}

/// Run `command` and collect its stdout, giving up after `timeout`.
///
/// `Err` only if the command could not be started. Any later failure yields `Ok(None)`, and a
/// command that did not finish is killed and reaped.
fn output_with_timeout(mut command: Command, timeout: Duration) -> std::io::Result<Option<String>> {
    let mut child = command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null()).spawn()?;
    let program = command.get_program().to_string_lossy().into_owned();

    let finished = match child.wait_timeout(timeout) {
        Ok(Some(_)) => true,
        Ok(None) => {
            log::warn!("{} timed out after {:?}", program, timeout);
            false
        }
        Err(err) => {
            log::error!("Failed to wait for {}: {}", program, err);
            false
        }
    };
    if !finished {
        let _ = child.kill();
        let _ = child.wait();
        return Ok(None);
    }

    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        if let Err(err) = stdout.read_to_string(&mut output) {
            log::warn!("Failed to read output of {}: {}", program, err);
            return Ok(None);
        }
    }
    Ok(Some(output))
}

impl ProcessLookup for SystemProcesses {
    fn pid_of(&self, name: &str) -> Option<u32> {
        match self.run_pidof(name) {
            Ok(pid) => pid,
            Err(err) => {
                log::warn!("Could not run pidof ({}), scanning the process table for {} instead", err, name);
                scan_process_table(name)
            }
        }
    }
}

fn scan_process_table(name: &str) -> Option<u32> {
    let system = System::new_with_specifics(RefreshKind::new().with_processes(ProcessRefreshKind::new()));
    let pid = system.processes_by_exact_name(OsStr::new(name)).next().map(|process| process.pid().as_u32());
    pid
}

/// `pidof` prints every matching pid separated by spaces; the first one is enough.
fn parse_pid(output: &str) -> Option<u32> {
    output.split_whitespace().next()?.parse().ok()
}

/// Everything the preflight checks look at.
pub struct Environment<'a> {
    /// Operating system family, as in [`std::env::consts::OS`].
    pub os: &'a str,
    pub session_markers: &'a [String],
    pub processes: &'a dyn ProcessLookup,
}

impl Environment<'_> {
    /// Check the platform, then the desktop session. Everything that can be decided without a bus.
    pub fn check_host(&self) -> Result<()> {
        self.check_platform()?;
        self.check_session()
    }

    fn check_platform(&self) -> Result<()> {
        if self.os == "linux" {
            Ok(())
        } else {
            Err(Error::UnsupportedPlatform { os: self.os.to_string() })
        }
    }

    fn check_session(&self) -> Result<()> {
        for marker in self.session_markers {
            if let Some(pid) = self.processes.pid_of(marker) {
                log::debug!("Found session marker {} with pid {}", marker, pid);
                return Ok(());
            }
        }
        Err(Error::UnsupportedDesktopSession)
    }
}

pub fn check_bus(bus: &dyn SessionBus) -> Result<()> {
    if bus.is_connected() {
        Ok(())
    } else {
        let reason = bus.unreachable_reason().unwrap_or("not connected").to_string();
        Err(Error::BusUnreachable { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LauncherUpdate;
    use std::cell::RefCell;

    struct FakeProcesses {
        running: Vec<(&'static str, u32)>,
        asked: RefCell<Vec<String>>,
    }

    impl ProcessLookup for FakeProcesses {
        fn pid_of(&self, name: &str) -> Option<u32> {
            self.asked.borrow_mut().push(name.to_string());
            self.running.iter().find(|(n, _)| *n == name).map(|(_, pid)| *pid)
        }
    }

    struct StaticBus(bool);

    impl SessionBus for StaticBus {
        fn is_connected(&self) -> bool {
            self.0
        }

        fn send(&self, _object_path: &str, _update: &LauncherUpdate) -> zbus::Result<()> {
            Ok(())
        }
    }

    fn markers() -> Vec<String> {
        vec!["unity".to_string(), "ksmserver".to_string()]
    }

    fn fake(running: Vec<(&'static str, u32)>) -> FakeProcesses {
        FakeProcesses { running, asked: RefCell::new(Vec::new()) }
    }

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid("1234\n"), Some(1234));
        assert_eq!(parse_pid("1234 5678\n"), Some(1234));
        assert_eq!(parse_pid(""), None);
        assert_eq!(parse_pid("not-a-pid"), None);
    }

    #[test]
    fn test_slow_command_is_killed_and_reaped() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let started = std::time::Instant::now();
        let output = output_with_timeout(command, Duration::from_millis(100)).unwrap();
        assert_eq!(output, None);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_command_output_is_collected() {
        let mut command = Command::new("echo");
        command.arg("4242 17");
        let output = output_with_timeout(command, Duration::from_secs(5)).unwrap();
        assert_eq!(output.as_deref().and_then(parse_pid), Some(4242));
    }

    #[test]
    fn test_missing_command_is_an_error() {
        let command = Command::new("taskbar-progress-no-such-command");
        assert!(output_with_timeout(command, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_system_lookup_of_missing_process() {
        let processes = SystemProcesses::new(Duration::from_secs(2));
        assert_eq!(processes.pid_of("taskbar-progress-no-such-process"), None);
    }

    #[test]
    fn test_non_linux_is_rejected_before_process_lookup() {
        let markers = markers();
        let processes = fake(vec![("ksmserver", 42)]);
        let env = Environment { os: "macos", session_markers: &markers, processes: &processes };
        let result = env.check_host();
        assert!(matches!(result, Err(Error::UnsupportedPlatform { ref os }) if os == "macos"));
        assert!(processes.asked.borrow().is_empty());
    }

    #[test]
    fn test_any_marker_is_enough() {
        let markers = markers();
        let processes = fake(vec![("ksmserver", 42)]);
        let env = Environment { os: "linux", session_markers: &markers, processes: &processes };
        assert!(env.check_host().is_ok());
        assert_eq!(*processes.asked.borrow(), vec!["unity".to_string(), "ksmserver".to_string()]);
    }

    #[test]
    fn test_no_marker_running() {
        let markers = markers();
        let processes = fake(vec![("gnome-shell", 7)]);
        let env = Environment { os: "linux", session_markers: &markers, processes: &processes };
        assert!(matches!(env.check_host(), Err(Error::UnsupportedDesktopSession)));
    }

    #[test]
    fn test_bus_unreachable() {
        assert!(check_bus(&StaticBus(true)).is_ok());
        let err = check_bus(&StaticBus(false)).unwrap_err();
        assert!(matches!(err, Error::BusUnreachable { ref reason } if reason == "not connected"));
        assert!(err.is_eligibility_failure());
    }
}
