//! Network profile management - spawning and stopping shaping scripts
//!
//! A profile is an opaque script that imposes bandwidth/latency constraints
//! on the path to the player endpoint. The harness only starts and stops it;
//! the script's own output goes straight to the operator's terminal.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};

/// Grace period between SIGTERM and a hard kill
const STOP_GRACE: Duration = Duration::from_secs(2);

/// How often a stopping group is checked for remaining members
#[cfg(unix)]
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Starts network profile scripts
#[derive(Debug, Clone)]
pub struct ProfileRunner {
    scripts_dir: PathBuf,
    interpreter: String,
    active: ActiveProfile,
}

impl ProfileRunner {
    pub fn new(scripts_dir: impl Into<PathBuf>, interpreter: impl Into<String>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            interpreter: interpreter.into(),
            active: ActiveProfile::default(),
        }
    }

    /// Shared view of the currently running profile, for signal handlers
    pub fn active(&self) -> ActiveProfile {
        self.active.clone()
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Start a profile if one is named.
    ///
    /// Never fails: no profile, or a profile that cannot be started, yields a
    /// no-op guard and the test runs under native network conditions.
    pub fn start(&self, profile: Option<&str>) -> ProfileGuard {
        let Some(name) = profile else {
            debug!("No network profile for this test");
            return ProfileGuard::noop(self.active.clone());
        };

        match self.try_start(name) {
            Ok(guard) => guard,
            Err(e) => {
                warn!("{}", e);
                ProfileGuard::noop(self.active.clone())
            }
        }
    }

    /// Start a named profile, reporting spawn failures
    pub fn try_start(&self, name: &str) -> HarnessResult<ProfileGuard> {
        let script = self.scripts_dir.join(name);
        if !script.is_file() {
            return Err(HarnessError::ProfileStart {
                profile: name.to_string(),
                reason: format!("script not found at {}", script.display()),
            });
        }

        info!("Starting network script: {}", name);

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        // Own process group, so stopping reaches helpers the script spawned
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| HarnessError::ProfileStart {
            profile: name.to_string(),
            reason: format!("failed to spawn {}: {}", self.interpreter, e),
        })?;

        // Leader of its own group, so the pid doubles as the pgid
        let pgid = child.id();
        if let Some(pgid) = pgid {
            self.active.set(name, pgid);
        }
        debug!("Network profile {} running (pgid: {:?})", name, pgid);

        Ok(ProfileGuard {
            name: Some(name.to_string()),
            child: Some(child),
            pgid,
            active: self.active.clone(),
        })
    }
}

/// Handle to a started profile; stopping is idempotent and also happens on drop.
///
/// Stopping targets the whole process group recorded at spawn, so helpers the
/// script left behind are terminated even after the script itself exited.
#[derive(Debug)]
pub struct ProfileGuard {
    name: Option<String>,
    child: Option<Child>,
    pgid: Option<u32>,
    active: ActiveProfile,
}

impl ProfileGuard {
    fn noop(active: ActiveProfile) -> Self {
        Self {
            name: None,
            child: None,
            pgid: None,
            active,
        }
    }

    /// Profile name, if a process was started
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether a profile process is still owned by this guard
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Process group of the profile, if one was started
    pub fn pgid(&self) -> Option<u32> {
        self.pgid
    }

    /// Stop the profile process group.
    ///
    /// Safe to call repeatedly and on a script that already exited.
    pub async fn stop(&mut self) -> HarnessResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let name = self.name.clone().unwrap_or_default();
        let pgid = self.pgid;
        if let Some(pgid) = pgid {
            self.active.clear(pgid);
        }

        match child.try_wait() {
            Ok(Some(status)) => debug!("Network profile {} already exited ({}), stopping its group", name, status),
            Ok(None) => info!("Stopping network profile {} (pgid: {:?})", name, pgid),
            Err(e) => {
                return Err(HarnessError::ProfileStop {
                    profile: name,
                    reason: e.to_string(),
                })
            }
        }

        #[cfg(unix)]
        if let Some(pgid) = pgid {
            signal_group(pgid, nix::sys::signal::Signal::SIGTERM);
        }

        let settled = timeout(STOP_GRACE, async {
            let status = child.wait().await;
            #[cfg(unix)]
            if let Some(pgid) = pgid {
                while group_alive(pgid) {
                    sleep(GROUP_POLL_INTERVAL).await;
                }
            }
            status
        })
        .await;

        match settled {
            Ok(Ok(status)) => {
                debug!("Network profile {} exited ({})", name, status);
                Ok(())
            }
            Ok(Err(e)) => Err(HarnessError::ProfileStop {
                profile: name,
                reason: e.to_string(),
            }),
            Err(_) => {
                warn!("Network profile {} ignored SIGTERM, killing", name);
                #[cfg(unix)]
                if let Some(pgid) = pgid {
                    signal_group(pgid, nix::sys::signal::Signal::SIGKILL);
                }
                // Fails harmlessly when the leader was already reaped
                let _ = child.start_kill();
                child.wait().await.map(|_| ()).map_err(|e| HarnessError::ProfileStop {
                    profile: name,
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl Drop for ProfileGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Some(pgid) = self.pgid {
                self.active.clear(pgid);
                #[cfg(unix)]
                signal_group(pgid, nix::sys::signal::Signal::SIGKILL);
            }
            let _ = child.start_kill();
        }
    }
}

/// The profile currently running, shared with the shutdown path
#[derive(Debug, Clone, Default)]
pub struct ActiveProfile {
    inner: Arc<Mutex<Option<(String, u32)>>>,
}

impl ActiveProfile {
    fn set(&self, name: &str, pid: u32) {
        *self.inner.lock() = Some((name.to_string(), pid));
    }

    fn clear(&self, pid: u32) {
        let mut inner = self.inner.lock();
        if matches!(&*inner, Some((_, active)) if *active == pid) {
            *inner = None;
        }
    }

    /// Name of the running profile, if any
    pub fn current(&self) -> Option<String> {
        self.inner.lock().as_ref().map(|(name, _)| name.clone())
    }

    /// Best-effort termination of the running profile; failures are swallowed
    pub fn terminate(&self) {
        if let Some((name, pid)) = self.inner.lock().take() {
            info!("Terminating network profile {} (pid: {})", name, pid);
            #[cfg(unix)]
            signal_group(pid, nix::sys::signal::Signal::SIGTERM);
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::unistd::Pid;

    if let Err(e) = nix::sys::signal::killpg(Pid::from_raw(pid as i32), signal) {
        // ESRCH: the group is already gone
        if e != nix::errno::Errno::ESRCH {
            debug!("Failed to send {:?} to process group {}: {}", signal, pid, e);
        }
    }
}

/// Whether any member of the process group is still signalable
#[cfg(unix)]
fn group_alive(pgid: u32) -> bool {
    use nix::unistd::Pid;

    nix::sys::signal::killpg(Pid::from_raw(pgid as i32), None).is_ok()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runner_with(script: &str, body: &str) -> (tempfile::TempDir, ProfileRunner) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(script), body).unwrap();
        let runner = ProfileRunner::new(dir.path(), "sh");
        (dir, runner)
    }

    #[tokio::test]
    async fn test_no_profile_is_noop() {
        let runner = ProfileRunner::new("scripts", "sh");
        let mut guard = runner.start(None);
        assert!(!guard.is_running());
        guard.stop().await.unwrap();
        guard.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_script_falls_back_to_noop() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProfileRunner::new(dir.path(), "sh");

        assert!(matches!(
            runner.try_start("nope.sh"),
            Err(HarnessError::ProfileStart { .. })
        ));
        let guard = runner.start(Some("nope.sh"));
        assert!(!guard.is_running());
        assert_eq!(runner.active().current(), None);
    }

    #[tokio::test]
    async fn test_stop_terminates_long_running_profile() {
        let (_dir, runner) = runner_with("slow.sh", "sleep 30\n");
        let mut guard = runner.start(Some("slow.sh"));
        assert!(guard.is_running());
        assert_eq!(runner.active().current().as_deref(), Some("slow.sh"));

        guard.stop().await.unwrap();
        assert!(!guard.is_running());
        assert_eq!(runner.active().current(), None);

        // Second stop is a no-op
        guard.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_after_profile_exited() {
        let (_dir, runner) = runner_with("quick.sh", "exit 0\n");
        let mut guard = runner.start(Some("quick.sh"));
        tokio::time::sleep(Duration::from_millis(200)).await;
        guard.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_reaches_helpers_after_script_exited() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("helper-still-running");
        let body = format!("(sleep 1; touch '{}') &\nexit 0\n", marker.display());
        std::fs::write(dir.path().join("detach.sh"), body).unwrap();
        let runner = ProfileRunner::new(dir.path(), "sh");

        let mut guard = runner.start(Some("detach.sh"));
        assert!(guard.pgid().is_some());

        // Leader is gone, the backgrounded helper is not
        tokio::time::sleep(Duration::from_millis(300)).await;
        guard.stop().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "helper outlived stop");
        assert!(!guard.is_running());
    }

    #[tokio::test]
    async fn test_drop_reaches_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("helper-still-running");
        let body = format!("(sleep 1; touch '{}') &\nsleep 30\n", marker.display());
        std::fs::write(dir.path().join("detach.sh"), body).unwrap();
        let runner = ProfileRunner::new(dir.path(), "sh");

        let guard = runner.start(Some("detach.sh"));
        assert!(guard.is_running());
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(guard);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "helper outlived drop");
        assert_eq!(runner.active().current(), None);
    }

    #[tokio::test]
    async fn test_terminate_active_profile() {
        let (_dir, runner) = runner_with("slow.sh", "sleep 30\n");
        let mut guard = runner.start(Some("slow.sh"));

        runner.active().terminate();
        assert_eq!(runner.active().current(), None);

        // Stopping a terminated profile must not fail
        guard.stop().await.unwrap();
    }
}
