//! Engine process lifecycle — launch sclang, scrape its console, tear down
//! the sclang/scsynth pair.
//!
//! sclang is spawned directly and owned as a child handle. scsynth is not:
//! sclang boots it internally, and the only way to learn its pid is to watch
//! the console stream for the boot announcement. The pid is therefore a weak
//! OS identifier — teardown can only ask the OS to signal it, best-effort.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use scbridge_core::console::scan_server_pid;
use scbridge_core::types::{EngineConfig, EngineStatus};

use crate::bus::UdpBus;

/// Why the engine could not be started. Steady-state process-control
/// failures never surface here — they are logged and recovered locally.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("no sclang binary known for this platform; set an explicit sclang path")]
    UnsupportedPlatform,
    #[error("SuperCollider script not found: {0}")]
    ScriptNotFound(PathBuf),
    #[error("failed to spawn sclang: {0}")]
    Spawn(#[from] std::io::Error),
}

struct EngineHandle {
    child: Child,
    /// Discovered at most once per handle by the console reader tasks.
    server_pid: Arc<OnceLock<u32>>,
}

/// Cloneable handle to the supervised sclang/scsynth pair.
#[derive(Clone)]
pub struct EngineSupervisor {
    config: EngineConfig,
    handle: Arc<Mutex<Option<EngineHandle>>>,
    bus: Arc<UdpBus>,
}

impl EngineSupervisor {
    pub fn new(config: EngineConfig, bus: Arc<UdpBus>) -> Self {
        Self {
            config,
            handle: Arc::new(Mutex::new(None)),
            bus,
        }
    }

    /// Launch sclang with the configured script.
    ///
    /// Safe to call repeatedly: a still-live prior instance is stopped first.
    /// The child's working directory is the script's directory, and on
    /// Windows the sclang install dir is prepended to its PATH so scsynth
    /// resolves at boot.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let sclang = resolve_sclang(self.config.sclang_path.as_deref())?;
        let script = &self.config.script_path;
        if !script.is_file() {
            return Err(SupervisorError::ScriptNotFound(script.clone()));
        }

        // a prior handle may hold a discovered scsynth pid even if sclang
        // itself already exited, so always tear down through stop()
        if self.handle.lock().await.is_some() {
            info!("previous engine instance tracked, stopping before relaunch");
            self.stop().await;
        }

        let script_dir = script.parent().filter(|p| !p.as_os_str().is_empty());
        let mut cmd = Command::new(&sclang);
        cmd.arg(script)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        if let Some(dir) = script_dir {
            cmd.current_dir(dir);
        }
        #[cfg(windows)]
        prepend_to_path(&mut cmd, &sclang);

        let mut child = cmd.spawn()?;
        info!("started sclang (pid {:?}) with {}", child.id(), script.display());

        let server_pid = Arc::new(OnceLock::new());
        if let Some(stdout) = child.stdout.take() {
            spawn_console_reader(stdout, server_pid.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_console_reader(stderr, server_pid.clone());
        }

        let mut guard = self.handle.lock().await;
        *guard = Some(EngineHandle { child, server_pid });
        Ok(())
    }

    /// Stop sclang, then best-effort kill scsynth by its discovered pid.
    ///
    /// Total and idempotent: every failure is logged and swallowed, and both
    /// the child handle and the pid are cleared on return so `start` can
    /// always be retried.
    pub async fn stop(&self) {
        let handle = self.handle.lock().await.take();
        let Some(mut handle) = handle else {
            debug!("no sclang process to stop");
            return;
        };

        match handle.child.try_wait() {
            Ok(Some(status)) => debug!("sclang already exited: {status}"),
            _ => self.terminate_sclang(&mut handle.child).await,
        }

        // scsynth may never have announced itself; that is not an error
        if let Some(&pid) = handle.server_pid.get() {
            if let Err(e) = kill_by_pid(pid) {
                warn!("could not terminate scsynth (pid {pid}): {e}");
            } else {
                info!("terminated scsynth (pid {pid})");
            }
        }
    }

    /// Route outbound requests to a different engine-side port. Pure bus
    /// configuration, no process interaction.
    pub fn set_feedback_port(&self, port: u16) {
        self.bus.set_port(port);
        info!("engine feedback port set to {port}");
    }

    /// Whether the sclang child is alive right now.
    ///
    /// An exited child is reaped but the handle stays: it may still carry the
    /// discovered scsynth pid, which only `stop` is allowed to forget — the
    /// server can outlive a crashed host and teardown must stay total.
    pub async fn is_running(&self) -> bool {
        let mut guard = self.handle.lock().await;
        match guard.as_mut() {
            Some(handle) => matches!(handle.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// The scsynth pid, once the console announced it.
    pub async fn server_pid(&self) -> Option<u32> {
        let guard = self.handle.lock().await;
        guard.as_ref().and_then(|h| h.server_pid.get().copied())
    }

    pub async fn status(&self) -> EngineStatus {
        let running = self.is_running().await;
        EngineStatus {
            running,
            server_pid: self.server_pid().await,
        }
    }

    /// Graceful terminate, bounded wait, escalate to SIGKILL.
    async fn terminate_sclang(&self, child: &mut Child) {
        let pid = child.id();
        #[cfg(unix)]
        if let Some(pid) = pid {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!("SIGTERM to sclang failed: {e}");
            }
            match tokio::time::timeout(self.config.stop_grace, child.wait()).await {
                Ok(Ok(status)) => {
                    info!("sclang (pid {pid}) exited: {status}");
                    return;
                }
                Ok(Err(e)) => warn!("waiting for sclang failed: {e}"),
                Err(_) => warn!("sclang ignored SIGTERM for {:?}, killing", self.config.stop_grace),
            }
        }
        if let Err(e) = child.kill().await {
            warn!("could not kill sclang (pid {pid:?}): {e}");
        } else {
            info!("killed sclang (pid {pid:?})");
        }
    }
}

/// Forward console lines to the log and watch for the scsynth pid
/// announcement. Ends when the stream closes; never blocks shutdown.
fn spawn_console_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    server_pid: Arc<OnceLock<u32>>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "sclang", "{line}");
            if server_pid.get().is_none() {
                if let Some(pid) = scan_server_pid(&line) {
                    if server_pid.set(pid).is_ok() {
                        info!("scsynth server pid: {pid}");
                    }
                }
            }
        }
    });
}

/// Default sclang install locations per platform, override first.
fn resolve_sclang(override_path: Option<&Path>) -> Result<PathBuf, SupervisorError> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }
    if cfg!(windows) {
        Ok(PathBuf::from(r"C:\Program Files\SuperCollider\sclang.exe"))
    } else if cfg!(target_os = "macos") {
        Ok(PathBuf::from(
            "/Applications/SuperCollider.app/Contents/MacOS/sclang",
        ))
    } else if cfg!(target_os = "linux") {
        // distro packages put sclang on PATH
        Ok(PathBuf::from("sclang"))
    } else {
        Err(SupervisorError::UnsupportedPlatform)
    }
}

/// Prepend the sclang install dir to the child's PATH so sclang can find
/// scsynth next to itself.
#[cfg(windows)]
fn prepend_to_path(cmd: &mut Command, sclang: &Path) {
    let Some(dir) = sclang.parent() else {
        return;
    };
    let mut paths = vec![dir.to_path_buf()];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    if let Ok(joined) = std::env::join_paths(paths) {
        cmd.env("PATH", joined);
    }
}

/// Signal a process we did not spawn. Process-tree kill on Windows (scsynth
/// may have workers), SIGTERM elsewhere.
fn kill_by_pid(pid: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(std::io::Error::from)
    }
    #[cfg(windows)]
    {
        std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .status()
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_path_wins() {
        let path = resolve_sclang(Some(Path::new("/opt/sc/sclang"))).unwrap();
        assert_eq!(path, PathBuf::from("/opt/sc/sclang"));
    }

    #[test]
    fn platform_default_resolves_on_known_platforms() {
        // all three tier-1 families have a mapping; only exotic targets error
        assert!(resolve_sclang(None).is_ok());
    }

    #[tokio::test]
    async fn start_rejects_missing_script() {
        let config = EngineConfig {
            script_path: PathBuf::from("/nonexistent/nowhere.scd"),
            ..Default::default()
        };
        let bus = Arc::new(UdpBus::new("127.0.0.1:57120".parse().unwrap()).unwrap());
        let supervisor = EngineSupervisor::new(config, bus);
        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, SupervisorError::ScriptNotFound(_)));
        assert!(!supervisor.is_running().await);
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let bus = Arc::new(UdpBus::new("127.0.0.1:57120".parse().unwrap()).unwrap());
        let supervisor = EngineSupervisor::new(EngineConfig::default(), bus);
        supervisor.stop().await;
        let status = supervisor.status().await;
        assert!(!status.running);
        assert_eq!(status.server_pid, None);
    }
}
