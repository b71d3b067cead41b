//! Collector Process (4.D): spawn, signal, wait, stdout/stderr capture of
//! the externally-supplied collector binary.
//!
//! Shells out via `tokio::process::Command` and uses `nix` for POSIX signal
//! delivery to the spawned child.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid as NixPid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{SupervisorError, SupervisorResult};

/// Default graceful-stop ceiling before escalating to `SIGKILL` (§5
/// "Timeouts: start/stop default 30 s").
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Named signals the supervisor is allowed to forward (4.D `send_signal`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorSignal {
    Hup,
    Term,
    Int,
    Usr1,
}

impl CollectorSignal {
    fn to_nix(self) -> Signal {
        match self {
            CollectorSignal::Hup => Signal::SIGHUP,
            CollectorSignal::Term => Signal::SIGTERM,
            CollectorSignal::Int => Signal::SIGINT,
            CollectorSignal::Usr1 => Signal::SIGUSR1,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "HUP" => Some(CollectorSignal::Hup),
            "TERM" => Some(CollectorSignal::Term),
            "INT" => Some(CollectorSignal::Int),
            "USR1" => Some(CollectorSignal::Usr1),
            _ => None,
        }
    }
}

/// Spawn parameters for one collector instance. A blue-green reload (4.G)
/// constructs one of these per candidate ("blue" and "green" each get their
/// own, differing at least in `config_path` and `health_port`).
#[derive(Debug, Clone)]
pub struct CollectorSpawnSpec {
    pub binary_path: PathBuf,
    pub config_path: PathBuf,
    pub working_dir: PathBuf,
    pub health_port: u16,
    pub extra_env: Vec<(String, String)>,
}

/// A single managed collector child process (4.D).
pub struct CollectorProcess {
    spec: CollectorSpawnSpec,
    child: Mutex<Option<Child>>,
    pid: AtomicU32,
    last_exit_code: Mutex<Option<i32>>,
}

impl CollectorProcess {
    pub fn new(spec: CollectorSpawnSpec) -> Self {
        Self {
            spec,
            child: Mutex::new(None),
            pid: AtomicU32::new(0),
            last_exit_code: Mutex::new(None),
        }
    }

    pub fn health_port(&self) -> u16 {
        self.spec.health_port
    }

    pub fn config_path(&self) -> &Path {
        &self.spec.config_path
    }

    pub fn pid(&self) -> Option<u32> {
        let pid = self.pid.load(Ordering::SeqCst);
        if pid == 0 { None } else { Some(pid) }
    }

    /// `start(ctx)` — spawns the child bound to `spec.config_path`. Returns
    /// once the process has forked; does not wait for readiness (4.E does
    /// that separately).
    #[instrument(skip(self), fields(config_path = %self.spec.config_path.display(), health_port = self.spec.health_port))]
    pub async fn start(&self) -> SupervisorResult<u32> {
        let mut command = Command::new(&self.spec.binary_path);
        command
            .arg("--config")
            .arg(&self.spec.config_path)
            .current_dir(&self.spec.working_dir)
            .env("SUPERVISOR_HEALTH_PORT", self.spec.health_port.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        for (key, value) in &self.spec.extra_env {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| SupervisorError::Process(format!("spawn failed: {e}")))?;

        let pid = child.id().ok_or_else(|| {
            SupervisorError::Process("child forked but has no pid (already reaped?)".to_string())
        })?;
        self.pid.store(pid, Ordering::SeqCst);

        capture_stream(child.stdout.take(), pid, false);
        capture_stream(child.stderr.take(), pid, true);

        info!(pid, "collector process started");
        *self.child.lock().await = Some(child);
        Ok(pid)
    }

    /// `stop(ctx)` — sends `SIGTERM`; escalates to `SIGKILL` if the process
    /// is still alive after `grace_period`.
    #[instrument(skip(self))]
    pub async fn stop(&self, grace_period: Duration) -> SupervisorResult<()> {
        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            return Ok(());
        };
        let pid = self.pid();

        if let Some(pid) = pid {
            let _ = signal::kill(NixPid::from_raw(pid as i32), Signal::SIGTERM);
        }

        match timeout(grace_period, child.wait()).await {
            Ok(Ok(status)) => {
                info!(pid = ?pid, code = status.code(), "collector exited after SIGTERM");
                *self.last_exit_code.lock().await = status.code();
            }
            Ok(Err(e)) => {
                error!(pid = ?pid, error = %e, "error waiting for collector exit");
            }
            Err(_) => {
                warn!(pid = ?pid, "collector did not exit within grace period, sending SIGKILL");
                if let Some(pid) = pid {
                    let _ = signal::kill(NixPid::from_raw(pid as i32), Signal::SIGKILL);
                }
                let _ = child.wait().await;
            }
        }

        *guard = None;
        self.pid.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// `send_signal(name)` — forward a named signal to the running child
    /// without waiting for any response (4.D).
    #[instrument(skip(self))]
    pub async fn send_signal(&self, sig: CollectorSignal) -> SupervisorResult<()> {
        let pid = self
            .pid()
            .ok_or_else(|| SupervisorError::Process("no running collector to signal".to_string()))?;
        signal::kill(NixPid::from_raw(pid as i32), sig.to_nix())
            .map_err(|e| SupervisorError::Process(format!("kill({pid}) failed: {e}")))?;
        debug!(pid, signal = ?sig, "forwarded signal to collector");
        Ok(())
    }

    /// `is_running() → bool`. Reaps a dead child without blocking; a lost
    /// child (parent notices exit) is reflected here immediately.
    #[instrument(skip(self))]
    pub async fn is_running(&self) -> bool {
        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                warn!(code = status.code(), "collector process exited unexpectedly");
                *self.last_exit_code.lock().await = status.code();
                *guard = None;
                self.pid.store(0, Ordering::SeqCst);
                false
            }
            Ok(None) => true,
            Err(e) => {
                error!(error = %e, "error polling collector liveness");
                false
            }
        }
    }

    pub async fn last_exit_code(&self) -> Option<i32> {
        *self.last_exit_code.lock().await
    }

    /// `check_memory() → (exceeded, rss_bytes, err)` (4.D, §5 resource
    /// limits): reads `VmRSS` from `/proc/<pid>/status` on Linux.
    #[instrument(skip(self))]
    pub async fn check_memory(&self, limit_bytes: u64) -> SupervisorResult<(bool, u64)> {
        let pid = self
            .pid()
            .ok_or_else(|| SupervisorError::Process("no running collector".to_string()))?;
        let rss = read_rss_bytes(pid)?;
        Ok((rss > limit_bytes, rss))
    }
}

/// Reads `VmRSS` (in kB) from `/proc/<pid>/status` and converts to bytes
/// (§5 "on Linux via `/proc/<pid>/status`, `VmRSS` line, kB→bytes").
fn read_rss_bytes(pid: u32) -> SupervisorResult<u64> {
    let contents = std::fs::read_to_string(format!("/proc/{pid}/status"))?;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest
                .trim()
                .trim_end_matches(" kB")
                .trim()
                .parse()
                .map_err(|_| SupervisorError::Process(format!("unparseable VmRSS line: {line}")))?;
            return Ok(kb * 1024);
        }
    }
    Err(SupervisorError::Process(format!("no VmRSS line in /proc/{pid}/status")))
}

/// Drains a captured stdout/stderr stream line-by-line into `tracing`, so
/// the collector's own logs show up attributed to its pid (4.D
/// "stdout/stderr capture").
fn capture_stream<R>(stream: Option<R>, pid: u32, is_stderr: bool)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let Some(stream) = stream else { return };
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if is_stderr {
                        warn!(pid, collector_line = %line, "collector stderr");
                    } else {
                        debug!(pid, collector_line = %line, "collector stdout");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(pid, error = %e, "error reading collector output stream");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(config_path: &str, health_port: u16) -> CollectorSpawnSpec {
        CollectorSpawnSpec {
            binary_path: PathBuf::from("/bin/sleep"),
            config_path: PathBuf::from(config_path),
            working_dir: PathBuf::from("."),
            health_port,
            extra_env: Vec::new(),
        }
    }

    #[test]
    fn parses_known_signal_names() {
        assert_eq!(CollectorSignal::parse("hup"), Some(CollectorSignal::Hup));
        assert_eq!(CollectorSignal::parse("TERM"), Some(CollectorSignal::Term));
        assert_eq!(CollectorSignal::parse("bogus"), None);
    }

    #[tokio::test]
    async fn is_running_false_before_start() {
        let process = CollectorProcess::new(spec("cfg.yaml", 9000));
        assert!(!process.is_running().await);
        assert!(process.pid().is_none());
    }

    #[tokio::test]
    async fn start_fails_cleanly_for_nonexistent_binary() {
        let mut bad_spec = spec("cfg.yaml", 9002);
        bad_spec.binary_path = PathBuf::from("/nonexistent/collector-binary");
        let process = CollectorProcess::new(bad_spec);
        let err = process.start().await.unwrap_err();
        matches!(err, SupervisorError::Process(_));
        assert!(!process.is_running().await);
    }

    #[tokio::test]
    async fn stop_on_never_started_process_is_a_no_op() {
        let process = CollectorProcess::new(spec("cfg.yaml", 9003));
        process.stop(Duration::from_millis(50)).await.unwrap();
        assert!(!process.is_running().await);
    }
}
