use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "tunnelkeep")]
#[command(version = BUILD_VERSION)]
#[command(about = "Keeps an encrypted tunnel alive across network failures and endpoint restarts")]
#[command(long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(short, long, global = true, value_name = "FILE", help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[arg(short = 'd', long, global = true, value_name = "DIR", env = "TUNNELKEEP_DATA_DIR", help = "Data directory path")]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase verbosity (-v, -vv, -vvv)")]
    pub verbose: u8,

    #[arg(short, long, global = true, help = "Suppress non-error output")]
    pub quiet: bool,

    #[arg(long, global = true, value_name = "FILE", help = "Write logs to file")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text", help = "Output format")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Start supervising the tunnel")]
    #[command(long_about = "Start the tunnelkeep daemon in the foreground.\n\nThe daemon launches the tunnel client, verifies it with layered health checks, and relaunches it with exponential backoff when it fails.")]
    Run {
        #[arg(long, value_name = "FILE", help = "Write daemon PID to file")]
        pid_file: Option<PathBuf>,
    },

    #[command(about = "Write a default configuration")]
    Init {
        #[arg(short, long, help = "Overwrite existing configuration")]
        force: bool,
    },

    #[command(about = "Show supervisor state and reconnect statistics")]
    Status,

    #[command(about = "Stop a running daemon")]
    Stop {
        #[arg(short, long, help = "Force stop (SIGKILL)")]
        force: bool,
    },

    #[command(about = "Restart the daemon (stop, then run in the foreground)")]
    Restart {
        #[arg(short, long, help = "Force stop the old daemon")]
        force: bool,
    },

    #[command(about = "Manage configuration")]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    #[command(about = "Show version information")]
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Validate configuration")]
    Validate,
}
