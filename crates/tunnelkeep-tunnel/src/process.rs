use crate::TunnelConfig;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use tunnelkeep_types::{TunnelkeepError, TunnelkeepResult};

/// Handle to one spawned tunnel client process.
///
/// The supervisor owns at most one of these at a time. A handle whose
/// process has been terminated is discarded, never reused: every
/// relaunch produces a fresh `TunnelProcess`.
#[derive(Debug)]
pub struct TunnelProcess {
    child: Child,
    pid: u32,
    command_line: String,
    launched_at: DateTime<Utc>,
}

impl TunnelProcess {
    /// Spawn the tunnel client described by `config`.
    pub async fn spawn(config: &TunnelConfig) -> TunnelkeepResult<Self> {
        let binary = find_tunnel_binary(config).await?;
        let args = build_args(config);
        Self::spawn_command(&binary, &args).await
    }

    /// Spawn an arbitrary command under a tunnel-process handle.
    ///
    /// stdout is discarded; stderr is drained into the log so client
    /// diagnostics (auth failures, forward errors) are visible.
    pub async fn spawn_command(binary: &Path, args: &[String]) -> TunnelkeepResult<Self> {
        let command_line = format!("{} {}", binary.display(), args.join(" "));

        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TunnelkeepError::Process(format!("Failed to launch tunnel client: {}", e)))?;

        let pid = child
            .id()
            .ok_or_else(|| TunnelkeepError::Process("Tunnel client exited before spawn returned".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();

                while let Ok(Some(line)) = lines.next_line().await {
                    if line.contains("Permission denied") || line.contains("refused") {
                        warn!("tunnel client: {}", line);
                    } else {
                        debug!("tunnel client: {}", line);
                    }
                }
            });
        }

        info!("Launched tunnel client (pid {}): {}", pid, command_line);

        Ok(Self {
            child,
            pid,
            command_line,
            launched_at: Utc::now(),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn launched_at(&self) -> DateTime<Utc> {
        self.launched_at
    }

    /// Whether the OS process is still running.
    ///
    /// A wait error leaves the answer unknown; the process is then
    /// assumed alive and the next check cycle settles it.
    pub fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("Tunnel process {} exited with status {:?}", self.pid, status);
                false
            }
            Err(e) => {
                warn!("Failed to query tunnel process {}: {}", self.pid, e);
                true
            }
        }
    }

    /// Stop the process: graceful signal first, forceful kill after the
    /// grace period. Returns once the process has been reaped.
    pub async fn terminate(mut self, grace: Duration) -> TunnelkeepResult<()> {
        if !self.is_alive() {
            return Ok(());
        }

        info!("Terminating tunnel process {}", self.pid);
        self.send_term_signal();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Tunnel process {} exited with status {:?}", self.pid, status);
                Ok(())
            }
            Ok(Err(e)) => Err(TunnelkeepError::Termination(format!(
                "Failed to reap tunnel process {}: {}",
                self.pid, e
            ))),
            Err(_) => {
                warn!(
                    "Tunnel process {} ignored termination signal for {:?}, killing",
                    self.pid, grace
                );
                self.child
                    .kill()
                    .await
                    .map_err(|e| TunnelkeepError::Termination(format!(
                        "Failed to kill tunnel process {}: {}",
                        self.pid, e
                    )))?;
                Ok(())
            }
        }
    }

    #[cfg(unix)]
    fn send_term_signal(&self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        // ESRCH means the process is already gone, which is fine here.
        if let Err(e) = kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
            if e != nix::errno::Errno::ESRCH {
                warn!("Failed to signal tunnel process {}: {}", self.pid, e);
            }
        }
    }

    #[cfg(not(unix))]
    fn send_term_signal(&self) {
        // No graceful signal available; terminate() falls through to
        // the kill path once the grace timeout elapses.
    }
}

/// Render the tunnel client argument list for `config`.
///
/// `-N` keeps the client forward-only, `ExitOnForwardFailure` makes a
/// failed bind fatal so the health check sees a dead process instead of
/// a half-working client.
pub fn build_args(config: &TunnelConfig) -> Vec<String> {
    let mut args = vec![
        "-N".to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "ExitOnForwardFailure=yes".to_string(),
        "-o".to_string(),
        format!("ServerAliveInterval={}", config.keepalive_interval_secs),
        "-o".to_string(),
        format!("ServerAliveCountMax={}", config.keepalive_max_missed),
        "-o".to_string(),
        format!("ConnectTimeout={}", config.connect_timeout_secs),
        "-L".to_string(),
        format!(
            "{}:{}:{}:{}",
            config.local_bind_addr, config.local_port, config.forward_host, config.remote_port
        ),
    ];

    if let Some(ref identity) = config.identity_file {
        args.push("-i".to_string());
        args.push(identity.display().to_string());
    }

    if config.remote_ssh_port != 22 {
        args.push("-p".to_string());
        args.push(config.remote_ssh_port.to_string());
    }

    args.push(config.endpoint());
    args
}

/// Locate the tunnel client binary: explicit configuration first, then
/// well-known install paths, then `which`.
pub async fn find_tunnel_binary(config: &TunnelConfig) -> TunnelkeepResult<PathBuf> {
    if let Some(ref binary) = config.tunnel_binary {
        if binary.exists() {
            return Ok(binary.clone());
        }
        return Err(TunnelkeepError::Config(format!(
            "Configured tunnel binary not found: {}",
            binary.display()
        )));
    }

    let candidates = [
        PathBuf::from("/usr/bin/ssh"),
        PathBuf::from("/usr/local/bin/ssh"),
        PathBuf::from("/opt/homebrew/bin/ssh"),
    ];

    for path in candidates {
        if let Ok(metadata) = tokio::fs::metadata(&path).await {
            if metadata.is_file() {
                return Ok(path);
            }
        }
    }

    if let Ok(output) = Command::new("which").arg("ssh").output().await {
        if output.status.success() {
            let path = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
            if path.exists() {
                return Ok(path);
            }
        }
    }

    Err(TunnelkeepError::Config(
        "No tunnel client found. Install an OpenSSH-compatible client or set tunnel_binary".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TunnelConfig {
        TunnelConfig::default()
            .with_remote("gateway.example.net", 5432)
            .with_local_port(15432)
            .with_user("deploy")
    }

    #[test]
    fn test_build_args_forward_argument() {
        let args = build_args(&config());

        assert_eq!(args[0], "-N");
        let l_pos = args.iter().position(|a| a == "-L").unwrap();
        assert_eq!(args[l_pos + 1], "127.0.0.1:15432:localhost:5432");
        assert_eq!(args.last().unwrap(), "deploy@gateway.example.net");
    }

    #[test]
    fn test_build_args_keepalive_options() {
        let args = build_args(&config());
        assert!(args.contains(&"ServerAliveInterval=15".to_string()));
        assert!(args.contains(&"ServerAliveCountMax=3".to_string()));
        assert!(args.contains(&"ExitOnForwardFailure=yes".to_string()));
    }

    #[test]
    fn test_build_args_nonstandard_ssh_port() {
        let mut cfg = config();
        cfg.remote_ssh_port = 2222;
        let args = build_args(&cfg);
        let p_pos = args.iter().position(|a| a == "-p").unwrap();
        assert_eq!(args[p_pos + 1], "2222");

        // Default port stays off the command line.
        assert!(!build_args(&config()).contains(&"-p".to_string()));
    }

    #[test]
    fn test_build_args_identity_file() {
        let cfg = config().with_identity_file("/home/deploy/.ssh/tunnel_ed25519");
        let args = build_args(&cfg);
        let i_pos = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i_pos + 1], "/home/deploy/.ssh/tunnel_ed25519");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_and_liveness() {
        let mut process = TunnelProcess::spawn_command(Path::new("/bin/sleep"), &["30".to_string()])
            .await
            .unwrap();

        assert!(process.is_alive());
        assert!(process.pid() > 0);
        process.terminate(Duration::from_secs(2)).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_process_reports_dead() {
        let mut process = TunnelProcess::spawn_command(Path::new("/bin/sleep"), &["0".to_string()])
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!process.is_alive());

        // Terminating an already-dead process is a no-op.
        process.terminate(Duration::from_secs(1)).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_configured_binary_is_config_error() {
        let mut cfg = config();
        cfg.tunnel_binary = Some(PathBuf::from("/nonexistent/ssh"));
        let err = find_tunnel_binary(&cfg).await.unwrap_err();
        assert!(matches!(err, TunnelkeepError::Config(_)));
    }
}
