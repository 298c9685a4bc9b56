mod backoff;
mod core;
mod launcher;
mod shutdown;
mod stats;

#[cfg(all(test, unix))]
mod tests;

pub use self::backoff::{delay_for_attempt, BackoffStrategy};
pub use self::core::{Supervisor, SupervisorTimings};
pub use self::launcher::{LaunchOptions, Launcher, ProcessFactory, TunnelProcessFactory};
pub use self::shutdown::ShutdownSignal;
pub use self::stats::{
    clear_pid_record, load_stats, pid_record_path, read_pid_record, stats_path, write_pid_record,
    StatsTracker,
};
