use super::commands::OutputFormat;
use super::utils::daemon_pid_path;
use std::path::Path;
use tunnelkeep_daemon::{load_stats, read_pid_record, stats_path, DaemonConfig};
use tunnelkeep_types::TunnelkeepResult;

/// Report the persisted view of the supervised tunnel: daemon liveness,
/// tunnel process liveness, and the session's reconnect counters. Works
/// entirely from the records on disk, so it never blocks on a health
/// check and needs no running daemon.
pub async fn show_status(
    config_path: &Path,
    data_dir: &Path,
    format: &OutputFormat,
) -> TunnelkeepResult<()> {
    let config = DaemonConfig::load(config_path)?;
    let port = config.tunnel.local_port;

    let daemon_pid = std::fs::read_to_string(daemon_pid_path(data_dir))
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok());
    let daemon_running = daemon_pid.is_some_and(pid_alive);

    let tunnel_pid = read_pid_record(data_dir, port);
    let tunnel_running = tunnel_pid.is_some_and(pid_alive);

    let stats = load_stats(&stats_path(data_dir, port));

    match format {
        OutputFormat::Json => {
            let status = serde_json::json!({
                "daemon_running": daemon_running,
                "daemon_pid": daemon_pid,
                "tunnel_running": tunnel_running,
                "tunnel_pid": tunnel_pid,
                "local_port": port,
                "remote_host": config.tunnel.remote_host,
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&status).unwrap_or_default());
        }
        OutputFormat::Text => {
            println!("tunnelkeep status");
            println!("{}", "─".repeat(50));
            println!(
                "Daemon:        {}",
                match daemon_pid {
                    Some(pid) if daemon_running => format!("running (pid {})", pid),
                    Some(_) => "not running (stale PID file)".to_string(),
                    None => "not running".to_string(),
                }
            );
            println!(
                "Tunnel:        {}",
                match tunnel_pid {
                    Some(pid) if tunnel_running => format!("up (pid {})", pid),
                    Some(_) => "down (stale record)".to_string(),
                    None => "down".to_string(),
                }
            );
            println!("Local port:    {}", port);
            if !config.tunnel.remote_host.is_empty() {
                println!("Remote:        {}", config.tunnel.endpoint());
            }

            match stats {
                Some(stats) => {
                    println!("Session start: {}", stats.session_started_at);
                    println!("Reconnects:    {}", stats.reconnect_count);
                    match stats.last_reconnect_at {
                        Some(at) => println!("Last reconnect: {}", at),
                        None => println!("Last reconnect: never"),
                    }
                }
                None => println!("No active supervision session"),
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    false
}
