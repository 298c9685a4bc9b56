use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::supervisor::{LaunchOptions, SupervisorTimings};
use tunnelkeep_types::{
    DEFAULT_BACKOFF_INITIAL_SECS, DEFAULT_BACKOFF_MAX_SECS, DEFAULT_CHECK_INTERVAL_SECS,
    DEFAULT_MAX_LAUNCH_ATTEMPTS, DEFAULT_SETTLE_SECS, DEFAULT_TERMINATE_GRACE_SECS,
    MIN_CHECK_INTERVAL_SECS,
};

/// Supervision timing knobs as they appear in the config file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub check_interval_secs: u64,
    pub settle_secs: u64,
    pub max_launch_attempts: u32,
    pub backoff_initial_secs: u64,
    pub backoff_max_secs: u64,
    pub terminate_grace_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            settle_secs: DEFAULT_SETTLE_SECS,
            max_launch_attempts: DEFAULT_MAX_LAUNCH_ATTEMPTS,
            backoff_initial_secs: DEFAULT_BACKOFF_INITIAL_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            terminate_grace_secs: DEFAULT_TERMINATE_GRACE_SECS,
        }
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.check_interval_secs < MIN_CHECK_INTERVAL_SECS {
            return Err(format!(
                "check_interval_secs must be at least {} (got {})",
                MIN_CHECK_INTERVAL_SECS, self.check_interval_secs
            ));
        }

        if self.max_launch_attempts == 0 {
            return Err("max_launch_attempts must be at least 1".into());
        }

        if self.backoff_initial_secs == 0 {
            return Err("backoff_initial_secs must be at least 1".into());
        }

        if self.backoff_max_secs < self.backoff_initial_secs {
            return Err("backoff_max_secs cannot be below backoff_initial_secs".into());
        }

        Ok(())
    }

    pub fn timings(&self) -> SupervisorTimings {
        SupervisorTimings {
            check_interval: Duration::from_secs(self.check_interval_secs),
            launch: LaunchOptions {
                settle: Duration::from_secs(self.settle_secs),
                max_attempts: self.max_launch_attempts,
                backoff_initial: Duration::from_secs(self.backoff_initial_secs),
                backoff_max: Duration::from_secs(self.backoff_max_secs),
                terminate_grace: Duration::from_secs(self.terminate_grace_secs),
            },
        }
    }
}
