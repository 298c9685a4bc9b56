mod daemon;
mod logging;
mod supervisor;
mod types;

pub use daemon::DaemonConfig;
pub use logging::LoggingConfig;
pub use supervisor::SupervisorConfig;
pub use types::LogLevel;
