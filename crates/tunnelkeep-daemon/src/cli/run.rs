use super::utils::daemon_pid_path;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tunnelkeep_daemon::{DaemonConfig, Supervisor};
use tunnelkeep_types::{TunnelkeepError, TunnelkeepResult};

pub async fn run_daemon(
    config_path: &Path,
    data_dir: &Path,
    pid_file: Option<PathBuf>,
) -> TunnelkeepResult<()> {
    info!("Starting tunnelkeep v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", data_dir);

    let mut config = DaemonConfig::load(config_path)?;
    config.data_dir = data_dir.to_path_buf();
    config.validate()?;

    std::fs::create_dir_all(data_dir)
        .map_err(|e| TunnelkeepError::Config(format!("Failed to create data directory: {}", e)))?;

    let pid_path = pid_file.unwrap_or_else(|| daemon_pid_path(data_dir));
    std::fs::write(&pid_path, std::process::id().to_string())
        .map_err(|e| TunnelkeepError::Config(format!("Failed to write PID file: {}", e)))?;
    info!("PID file written: {:?}", pid_path);

    let supervisor = Supervisor::from_config(&config);

    if let Err(e) = supervisor.start().await {
        error!("Tunnel supervision failed to start: {}", e);
        let _ = std::fs::remove_file(&pid_path);
        return Err(e);
    }

    println!(
        "tunnelkeep is supervising {}:{} -> {}:{} (checks every {}s)",
        config.tunnel.local_bind_addr,
        config.tunnel.local_port,
        config.tunnel.forward_host,
        config.tunnel.remote_port,
        config.supervisor.check_interval_secs,
    );
    println!("Press Ctrl+C to stop");

    wait_for_shutdown().await;

    info!("Shutting down...");
    supervisor.stop().await?;

    let _ = std::fs::remove_file(&pid_path);
    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => { info!("Received SIGTERM"); }
            _ = sigint.recv() => { info!("Received SIGINT"); }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C");
    }
}
