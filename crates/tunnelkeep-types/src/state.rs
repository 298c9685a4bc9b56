use serde::{Deserialize, Serialize};

use crate::stats::TunnelStats;

/// Supervisor state machine states.
///
/// `Unhealthy` and `Relaunching` are transient: the supervisor passes
/// through them on its way back to `Running` (or keeps cycling between
/// them while the remote endpoint is down).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupervisorState {
    Stopped,
    Launching,
    Running,
    Unhealthy,
    Relaunching,
    ShuttingDown,
}

impl SupervisorState {
    /// True once a supervision session has been started and not yet
    /// stopped.
    pub fn is_active(&self) -> bool {
        !matches!(self, SupervisorState::Stopped)
    }
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SupervisorState::Stopped => "stopped",
            SupervisorState::Launching => "launching",
            SupervisorState::Running => "running",
            SupervisorState::Unhealthy => "unhealthy",
            SupervisorState::Relaunching => "relaunching",
            SupervisorState::ShuttingDown => "shutting-down",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a supervised tunnel, cheap to produce: reads
/// the last completed health verdict rather than running a fresh check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: SupervisorState,
    pub pid: Option<u32>,
    pub local_port: u16,
    /// Set when an optional health layer was skipped on the last check,
    /// meaning the verdict is weaker than configured.
    pub degraded: bool,
    pub last_check_at: Option<chrono::DateTime<chrono::Utc>>,
    pub stats: TunnelStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(SupervisorState::Running.to_string(), "running");
        assert_eq!(SupervisorState::ShuttingDown.to_string(), "shutting-down");
    }

    #[test]
    fn test_is_active() {
        assert!(!SupervisorState::Stopped.is_active());
        assert!(SupervisorState::Launching.is_active());
        assert!(SupervisorState::Relaunching.is_active());
    }
}
