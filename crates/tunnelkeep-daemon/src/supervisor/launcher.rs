use crate::supervisor::backoff::BackoffStrategy;
use crate::supervisor::shutdown::ShutdownSignal;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tunnelkeep_tunnel::{HealthCheck, TunnelConfig, TunnelProcess};
use tunnelkeep_types::{
    TunnelkeepError, TunnelkeepResult, DEFAULT_BACKOFF_INITIAL_SECS, DEFAULT_BACKOFF_MAX_SECS,
    DEFAULT_MAX_LAUNCH_ATTEMPTS, DEFAULT_SETTLE_SECS, DEFAULT_TERMINATE_GRACE_SECS,
};

/// Seam for producing tunnel processes, so launch and supervision logic
/// can be exercised without a real tunnel client.
#[async_trait]
pub trait ProcessFactory: Send + Sync {
    async fn spawn(&self) -> TunnelkeepResult<TunnelProcess>;
}

/// The real factory: spawns the configured tunnel client.
pub struct TunnelProcessFactory {
    config: TunnelConfig,
}

impl TunnelProcessFactory {
    pub fn new(config: TunnelConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ProcessFactory for TunnelProcessFactory {
    async fn spawn(&self) -> TunnelkeepResult<TunnelProcess> {
        TunnelProcess::spawn(&self.config).await
    }
}

/// Timing knobs for one launch sequence.
#[derive(Clone, Debug)]
pub struct LaunchOptions {
    /// Time a fresh process gets to establish its connection before the
    /// first health check.
    pub settle: Duration,
    pub max_attempts: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub terminate_grace: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(DEFAULT_SETTLE_SECS),
            max_attempts: DEFAULT_MAX_LAUNCH_ATTEMPTS,
            backoff_initial: Duration::from_secs(DEFAULT_BACKOFF_INITIAL_SECS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
            terminate_grace: Duration::from_secs(DEFAULT_TERMINATE_GRACE_SECS),
        }
    }
}

/// Brings the tunnel up and verifies it is healthy, retrying with
/// exponential backoff up to a bounded attempt count.
///
/// Every attempt gets a fresh retry budget: the attempt counter is not
/// shared across launch sequences. No spawned process outlives a failed
/// attempt — unhealthy processes are terminated before the next attempt
/// or the final error, including on the cancellation path.
pub struct Launcher {
    factory: Arc<dyn ProcessFactory>,
    checker: Arc<dyn HealthCheck>,
    options: LaunchOptions,
    shutdown: ShutdownSignal,
}

impl Launcher {
    pub fn new(
        factory: Arc<dyn ProcessFactory>,
        checker: Arc<dyn HealthCheck>,
        options: LaunchOptions,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            factory,
            checker,
            options,
            shutdown,
        }
    }

    /// Run one bounded launch sequence.
    pub async fn launch(&mut self) -> TunnelkeepResult<TunnelProcess> {
        let mut backoff = BackoffStrategy::exponential(
            self.options.backoff_initial,
            self.options.backoff_max,
        );

        for attempt in 1..=self.options.max_attempts {
            if self.shutdown.triggered() {
                return Err(TunnelkeepError::Cancelled);
            }

            if let Some(process) = self.try_attempt(attempt).await? {
                return Ok(process);
            }

            // No sleep after the final failed attempt.
            if attempt < self.options.max_attempts {
                if let Some(delay) = backoff.next_delay() {
                    debug!(
                        "Backing off {:?} before launch attempt {}/{}",
                        delay,
                        attempt + 1,
                        self.options.max_attempts
                    );
                    if !self.shutdown.sleep(delay).await {
                        return Err(TunnelkeepError::Cancelled);
                    }
                }
            }
        }

        Err(TunnelkeepError::LaunchExhausted {
            attempts: self.options.max_attempts,
        })
    }

    /// One spawn-settle-check round. `Ok(None)` is a failed attempt the
    /// caller may retry; `Err` ends the sequence (bad configuration or
    /// shutdown).
    async fn try_attempt(&mut self, attempt: u32) -> TunnelkeepResult<Option<TunnelProcess>> {
        let mut process = match self.factory.spawn().await {
            Ok(process) => process,
            Err(e @ TunnelkeepError::Config(_)) => return Err(e),
            Err(e) => {
                warn!(
                    "Launch attempt {}/{} failed to spawn: {}",
                    attempt, self.options.max_attempts, e
                );
                return Ok(None);
            }
        };

        if !self.shutdown.sleep(self.options.settle).await {
            self.discard(process).await;
            return Err(TunnelkeepError::Cancelled);
        }

        let verdict = self.checker.check(&mut process).await;
        if verdict.healthy() {
            if verdict.degraded() {
                debug!("Tunnel healthy with skipped check layers");
            }
            info!(
                "Tunnel up after launch attempt {}/{} (pid {})",
                attempt,
                self.options.max_attempts,
                process.pid()
            );
            return Ok(Some(process));
        }

        warn!(
            "Launch attempt {}/{} unhealthy (failed layer: {})",
            attempt,
            self.options.max_attempts,
            verdict.failed_layer().unwrap_or("unknown")
        );
        self.discard(process).await;
        Ok(None)
    }

    async fn discard(&self, process: TunnelProcess) {
        let pid = process.pid();
        if let Err(e) = process.terminate(self.options.terminate_grace).await {
            warn!("Failed to clean up unhealthy tunnel process {}: {}", pid, e);
        }
    }
}
