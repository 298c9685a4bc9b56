#![warn(clippy::all)]

//! tunnelkeep daemon: supervises a single long-lived encrypted-tunnel
//! client process, restarting it with bounded exponential backoff when
//! the layered health check fails, and keeping reconnect statistics
//! that survive restarts of the daemon itself.

pub mod config;
pub mod supervisor;

pub use config::{DaemonConfig, LogLevel, LoggingConfig, SupervisorConfig};
pub use supervisor::{
    load_stats, read_pid_record, stats_path, BackoffStrategy, LaunchOptions, Launcher,
    ProcessFactory, ShutdownSignal, StatsTracker, Supervisor, SupervisorTimings,
    TunnelProcessFactory,
};
