use super::utils::daemon_pid_path;
use std::path::Path;
use tunnelkeep_types::{TunnelkeepError, TunnelkeepResult};

/// Signal a daemon started from another terminal through its PID file.
pub async fn stop_daemon(data_dir: &Path, force: bool) -> TunnelkeepResult<()> {
    let pid_file = daemon_pid_path(data_dir);
    if !pid_file.exists() {
        println!("No PID file found. Daemon may not be running.");
        return Ok(());
    }

    let pid_str = std::fs::read_to_string(&pid_file)
        .map_err(|e| TunnelkeepError::Internal(format!("Failed to read PID: {}", e)))?;
    let pid: i32 = pid_str
        .trim()
        .parse()
        .map_err(|e| TunnelkeepError::Internal(format!("Invalid PID: {}", e)))?;

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        match kill(Pid::from_raw(pid), signal) {
            Ok(_) => println!(
                "Sent {} to daemon process {}",
                if force { "SIGKILL" } else { "SIGTERM" },
                pid
            ),
            Err(e) => println!("Failed to signal daemon process {}: {}", pid, e),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (pid, force);
        println!("Stop not supported on this platform. Kill process {} manually.", pid);
    }

    Ok(())
}

/// Wait for a stopping daemon to release its PID file.
pub async fn wait_for_daemon_exit(data_dir: &Path) -> TunnelkeepResult<()> {
    let pid_file = daemon_pid_path(data_dir);

    for _ in 0..50 {
        if !pid_file.exists() {
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    Err(TunnelkeepError::Internal(
        "Daemon did not stop in time".into(),
    ))
}
