//! The application under test, when the orchestrator launches it.
//!
//! [`AppProcess`] exclusively owns the child: output goes to a log file in
//! the run directory, readiness is probed over TCP (or approximated by a
//! fixed wait), and termination is SIGTERM, a grace period, then SIGKILL.

use std::fs::File;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use crate::config::AppSettings;
use crate::harness::types::StartupError;

const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

/// A launched application under test
#[derive(Debug)]
pub struct AppProcess {
    child: Child,
    command: String,
    log_path: PathBuf,
    exit: Option<ExitStatus>,
}

impl AppProcess {
    /// Spawn `settings.command` with its output redirected to `log_path`
    pub fn launch(settings: &AppSettings, log_path: &Path) -> Result<Self, StartupError> {
        let (program, args) = settings
            .command
            .split_first()
            .ok_or_else(|| StartupError::Spawn {
                command: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            })?;
        let command = settings.command.join(" ");

        let log = File::create(log_path)?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .env("DISPLAY", &settings.display)
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log);
        if let Some(dir) = &settings.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| StartupError::Spawn {
            command: command.clone(),
            source,
        })?;
        info!("launched `{}` (pid {}), output in {}", command, child.id(), log_path.display());

        Ok(Self {
            child,
            command,
            log_path: log_path.to_path_buf(),
            exit: None,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Whether the child is still running
    pub fn is_running(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!("failed to poll `{}`: {}", self.command, e);
                false
            }
        }
    }

    /// Wait until the application accepts connections on `probe`
    /// (`host:port`), or, without a probe, for the whole `ceiling`.
    ///
    /// Fails if the process exits first or the probe never succeeds.
    pub fn wait_until_ready(
        &mut self,
        probe: Option<&str>,
        ceiling: Duration,
        poll: Duration,
    ) -> Result<Duration, StartupError> {
        let start = Instant::now();
        let poll = poll.max(Duration::from_millis(10));

        loop {
            if !self.is_running() {
                return Err(StartupError::AppExited {
                    status: self
                        .exit
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "unknown status".to_string()),
                });
            }
            if let Some(addr) = probe {
                if probe_tcp(addr) {
                    let elapsed = start.elapsed();
                    debug!("`{}` ready at {} after {:?}", self.command, addr, elapsed);
                    return Ok(elapsed);
                }
            }
            let elapsed = start.elapsed();
            if elapsed >= ceiling {
                return match probe {
                    Some(addr) => Err(StartupError::NotReady {
                        probe: addr.to_string(),
                        timeout: ceiling,
                    }),
                    None => Ok(elapsed),
                };
            }
            thread::sleep(poll.min(ceiling - elapsed));
        }
    }

    /// Stop the application: SIGTERM, wait up to `grace`, then kill.
    ///
    /// Safe to call repeatedly; returns the exit status once known.
    pub fn terminate(&mut self, grace: Duration) -> std::io::Result<Option<ExitStatus>> {
        if !self.is_running() {
            return Ok(self.exit);
        }

        request_termination(&self.child);
        if let Some(status) = self.child.wait_timeout(grace)? {
            info!("`{}` exited with {}", self.command, status);
            self.exit = Some(status);
            return Ok(self.exit);
        }

        warn!("`{}` ignored termination for {:?}; killing", self.command, grace);
        self.child.kill()?;
        let status = self.child.wait()?;
        self.exit = Some(status);
        Ok(self.exit)
    }
}

impl Drop for AppProcess {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(unix)]
fn request_termination(child: &Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM) {
        warn!("failed to send SIGTERM to pid {}: {}", child.id(), e);
    }
}

#[cfg(not(unix))]
fn request_termination(_child: &Child) {}

/// Whether something accepts TCP connections at `addr`
pub fn probe_tcp(addr: &str) -> bool {
    let Ok(addrs) = addr.to_socket_addrs() else {
        return false;
    };
    addrs
        .into_iter()
        .any(|a| TcpStream::connect_timeout(&a, PROBE_CONNECT_TIMEOUT).is_ok())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn settings(command: &[&str]) -> AppSettings {
        AppSettings {
            command: command.iter().map(|s| s.to_string()).collect(),
            ..AppSettings::defaults()
        }
    }

    #[test]
    fn test_launch_and_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        let mut app = AppProcess::launch(&settings(&["sleep", "30"]), &log).unwrap();
        assert!(app.is_running());

        let start = Instant::now();
        let status = app.terminate(Duration::from_secs(5)).unwrap();
        assert!(status.is_some());
        assert!(!app.is_running());
        assert!(start.elapsed() < Duration::from_secs(5));

        // Second call is a no-op
        assert_eq!(app.terminate(Duration::from_secs(5)).unwrap(), status);
    }

    #[test]
    fn test_kill_after_grace() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        let mut app =
            AppProcess::launch(&settings(&["sh", "-c", "trap '' TERM; sleep 30"]), &log).unwrap();
        // Give the shell time to install the trap
        thread::sleep(Duration::from_millis(200));
        let status = app.terminate(Duration::from_millis(200)).unwrap();
        assert!(status.is_some());
        assert!(!app.is_running());
    }

    #[test]
    fn test_output_goes_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        let mut app = AppProcess::launch(&settings(&["sh", "-c", "echo hello from app"]), &log).unwrap();
        app.child.wait().unwrap();
        assert!(std::fs::read_to_string(&log).unwrap().contains("hello from app"));
    }

    #[test]
    fn test_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppProcess::launch(
            &settings(&["definitely-not-a-real-app-4242"]),
            &dir.path().join("app.log"),
        )
        .unwrap_err();
        assert!(matches!(err, StartupError::Spawn { .. }));
    }

    #[test]
    fn test_ready_when_port_accepts() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let dir = tempfile::tempdir().unwrap();
        let mut app =
            AppProcess::launch(&settings(&["sleep", "30"]), &dir.path().join("app.log")).unwrap();

        let waited = app
            .wait_until_ready(Some(&addr), Duration::from_secs(5), Duration::from_millis(20))
            .unwrap();
        assert!(waited < Duration::from_secs(5));
        app.terminate(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_exit_during_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut app =
            AppProcess::launch(&settings(&["sh", "-c", "exit 2"]), &dir.path().join("app.log")).unwrap();
        let err = app
            .wait_until_ready(None, Duration::from_secs(5), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, StartupError::AppExited { .. }));
    }

    #[test]
    fn test_readiness_timeout() {
        // Bind then drop to get a port with nothing listening
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let dir = tempfile::tempdir().unwrap();
        let mut app =
            AppProcess::launch(&settings(&["sleep", "30"]), &dir.path().join("app.log")).unwrap();
        let err = app
            .wait_until_ready(Some(&addr), Duration::from_millis(150), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, StartupError::NotReady { .. }));
    }
}
