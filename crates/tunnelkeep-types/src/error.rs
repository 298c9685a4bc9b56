use thiserror::Error;

/// Error taxonomy for the tunnel supervisor.
///
/// `Config` is fatal to any start attempt. `LaunchExhausted` is fatal to
/// the start command that raised it, but recoverable inside a running
/// supervision session. `Storage` failures degrade precision and are
/// never fatal to the supervision loop. An unavailable optional health
/// probe is not an error at all: the layer reports itself skipped and
/// the verdict is marked degraded.
#[derive(Error, Debug)]
pub enum TunnelkeepError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tunnel launch failed after {attempts} attempts")]
    LaunchExhausted { attempts: u32 },

    #[error("Process error: {0}")]
    Process(String),

    #[error("Failed to terminate tunnel process: {0}")]
    Termination(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation cancelled by shutdown")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type TunnelkeepResult<T> = Result<T, TunnelkeepError>;
