mod cli;

use clap::Parser;
use cli::{
    handle_config, init_config, init_logging, run_daemon, show_status, stop_daemon,
    wait_for_daemon_exit, Cli, Commands,
};
use std::path::PathBuf;
use tunnelkeep_types::TunnelkeepResult;

#[tokio::main]
async fn main() -> TunnelkeepResult<()> {
    let cli = Cli::parse();

    init_logging(&cli);

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .map(|h| h.join(".tunnelkeep"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/tunnelkeep"))
    });

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join("config.toml"));

    match cli.command {
        Commands::Run { pid_file } => {
            run_daemon(&config_path, &data_dir, pid_file).await?;
        }
        Commands::Init { force } => {
            init_config(&config_path, &data_dir, force)?;
        }
        Commands::Status => {
            show_status(&config_path, &data_dir, &cli.format).await?;
        }
        Commands::Stop { force } => {
            stop_daemon(&data_dir, force).await?;
        }
        Commands::Restart { force } => {
            stop_daemon(&data_dir, force).await?;
            wait_for_daemon_exit(&data_dir).await?;
            run_daemon(&config_path, &data_dir, None).await?;
        }
        Commands::Config { action } => {
            handle_config(&config_path, action)?;
        }
        Commands::Version => {
            println!("tunnelkeep v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
