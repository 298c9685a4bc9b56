use crate::supervisor::launcher::{LaunchOptions, Launcher, ProcessFactory};
use crate::supervisor::shutdown::ShutdownSignal;
use crate::supervisor::stats::{clear_pid_record, write_pid_record, StatsTracker};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tunnelkeep_tunnel::{HealthCheck, HealthVerdict, TunnelProcess};
use tunnelkeep_types::{
    StatusSnapshot, SupervisorState, TunnelkeepError, TunnelkeepResult,
    DEFAULT_CHECK_INTERVAL_SECS,
};

/// Timing parameters of the supervision loop.
#[derive(Clone, Debug)]
pub struct SupervisorTimings {
    /// Interval between periodic health checks; also the cadence of
    /// supervisor-level relaunch retries during a persistent outage.
    pub check_interval: Duration,
    pub launch: LaunchOptions,
}

impl Default for SupervisorTimings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            launch: LaunchOptions::default(),
        }
    }
}

struct Shared {
    timings: SupervisorTimings,
    factory: Arc<dyn ProcessFactory>,
    checker: Arc<dyn HealthCheck>,
    stats: StatsTracker,
    data_dir: PathBuf,
    local_port: u16,
    state: RwLock<SupervisorState>,
    last_check: RwLock<Option<(DateTime<Utc>, HealthVerdict)>>,
    active_pid: RwLock<Option<u32>>,
}

impl Shared {
    fn set_state(&self, next: SupervisorState) {
        let mut state = self.state.write();
        if *state != next {
            debug!("Supervisor state: {} -> {}", *state, next);
            *state = next;
        }
    }

    fn record_active(&self, process: &TunnelProcess) {
        *self.active_pid.write() = Some(process.pid());
        if let Err(e) = write_pid_record(&self.data_dir, self.local_port, process.pid()) {
            warn!("Failed to record tunnel PID: {}", e);
        }
    }

    fn clear_active(&self) {
        *self.active_pid.write() = None;
        clear_pid_record(&self.data_dir, self.local_port);
    }

    /// Terminate the active process and drop its handle. A handle never
    /// survives this call; relaunching always creates a new one.
    async fn drop_active(&self, process: TunnelProcess) {
        let pid = process.pid();
        if let Err(e) = process.terminate(self.timings.launch.terminate_grace).await {
            warn!("Failed to terminate tunnel process {}: {}", pid, e);
        }
        self.clear_active();
    }
}

enum RelaunchOutcome {
    Running(TunnelProcess),
    RetryLater,
    Shutdown,
}

/// Keeps one tunnel process alive: periodic layered health checks,
/// terminate-and-relaunch on failure, reconnect accounting.
///
/// The monitor task is the sole owner of the active process handle;
/// nothing else terminates or replaces it. Launch-level retries are
/// bounded with exponential backoff, while supervisor-level retries
/// during a persistent outage continue indefinitely at the check
/// interval, on the presumption the outage is transient.
pub struct Supervisor {
    shared: Arc<Shared>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    monitor: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    /// Wire up the real tunnel factory and health checker from the
    /// daemon configuration.
    pub fn from_config(config: &crate::config::DaemonConfig) -> Self {
        use crate::supervisor::launcher::TunnelProcessFactory;
        use tunnelkeep_tunnel::HealthChecker;

        let factory = Arc::new(TunnelProcessFactory::new(config.tunnel.clone()));
        let checker = Arc::new(HealthChecker::new(&config.tunnel));

        Self::new(
            config.supervisor.timings(),
            factory,
            checker,
            config.data_dir.clone(),
            config.tunnel.local_port,
        )
    }

    pub fn new(
        timings: SupervisorTimings,
        factory: Arc<dyn ProcessFactory>,
        checker: Arc<dyn HealthCheck>,
        data_dir: PathBuf,
        local_port: u16,
    ) -> Self {
        let stats = StatsTracker::new(&data_dir, local_port);

        Self {
            shared: Arc::new(Shared {
                timings,
                factory,
                checker,
                stats,
                data_dir,
                local_port,
                state: RwLock::new(SupervisorState::Stopped),
                last_check: RwLock::new(None),
                active_pid: RwLock::new(None),
            }),
            shutdown_tx: Mutex::new(None),
            monitor: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.shared.state.read()
    }

    /// Begin supervising. Idempotent while a session is active. Fails
    /// with `LaunchExhausted` if the tunnel cannot be brought up within
    /// the bounded attempt budget; the supervisor is then back in
    /// `Stopped` and takes no further action.
    pub async fn start(&self) -> TunnelkeepResult<()> {
        {
            let mut state = self.shared.state.write();
            if state.is_active() {
                info!("Supervisor already active ({})", *state);
                return Ok(());
            }
            *state = SupervisorState::Launching;
        }

        info!(
            "Starting tunnel supervision on local port {}",
            self.shared.local_port
        );
        self.shared.stats.init_or_resume()?;

        let (tx, signal) = ShutdownSignal::new();
        *self.shutdown_tx.lock() = Some(tx);

        let mut launcher = Launcher::new(
            self.shared.factory.clone(),
            self.shared.checker.clone(),
            self.shared.timings.launch.clone(),
            signal.clone(),
        );

        match launcher.launch().await {
            Ok(process) => {
                self.shared.record_active(&process);
                self.shared.set_state(SupervisorState::Running);

                let shared = self.shared.clone();
                let handle = tokio::spawn(monitor_loop(shared, signal, launcher, process));
                *self.monitor.lock().await = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!("Tunnel failed to start: {}", e);
                let _ = self.shared.stats.clear();
                *self.shutdown_tx.lock() = None;
                self.shared.set_state(SupervisorState::Stopped);
                Err(e)
            }
        }
    }

    /// Stop supervising: interrupt any in-progress wait, terminate the
    /// active tunnel process, clear persisted stats, exit the check
    /// loop. Idempotent when already stopped.
    pub async fn stop(&self) -> TunnelkeepResult<()> {
        let tx = self.shutdown_tx.lock().take();
        let mut handle = match self.monitor.lock().await.take() {
            Some(handle) => handle,
            None => {
                debug!("Stop requested but no supervision session is running");
                self.shared.set_state(SupervisorState::Stopped);
                return Ok(());
            }
        };

        info!("Stopping tunnel supervision");
        if let Some(tx) = tx {
            let _ = tx.send(true);
        }

        // The monitor's own cleanup is bounded by the terminate grace
        // period; give it that plus headroom before pulling the plug.
        let deadline = self.shared.timings.launch.terminate_grace + Duration::from_secs(10);
        if tokio::time::timeout(deadline, &mut handle).await.is_err() {
            warn!("Monitor task did not stop within {:?}, aborting", deadline);
            handle.abort();

            // The aborted task cannot run its cleanup; the spawned
            // process dies with its handle (kill-on-drop), the records
            // are cleared here.
            if let Err(e) = self.shared.stats.clear() {
                warn!("Failed to clear stats on shutdown: {}", e);
            }
            self.shared.clear_active();
            self.shared.set_state(SupervisorState::Stopped);
        }

        Ok(())
    }

    /// Stop followed by start.
    pub async fn restart(&self) -> TunnelkeepResult<()> {
        self.stop().await?;
        self.start().await
    }

    /// Current state and counters without running a fresh health check.
    pub fn status(&self) -> StatusSnapshot {
        let (last_check_at, degraded) = match *self.shared.last_check.read() {
            Some((at, verdict)) => (Some(at), verdict.degraded()),
            None => (None, false),
        };

        StatusSnapshot {
            state: *self.shared.state.read(),
            pid: *self.shared.active_pid.read(),
            local_port: self.shared.local_port,
            degraded,
            last_check_at,
            stats: self.shared.stats.read(),
        }
    }
}

async fn monitor_loop(
    shared: Arc<Shared>,
    mut signal: ShutdownSignal,
    mut launcher: Launcher,
    process: TunnelProcess,
) {
    let mut current = Some(process);

    loop {
        if !signal.sleep(shared.timings.check_interval).await {
            break;
        }

        if let Some(mut process) = current.take() {
            let verdict = shared.checker.check(&mut process).await;
            *shared.last_check.write() = Some((Utc::now(), verdict));

            if verdict.healthy() {
                debug!(
                    "Health check passed for tunnel process {}{}",
                    process.pid(),
                    if verdict.degraded() { " (degraded: layers skipped)" } else { "" }
                );
                current = Some(process);
                continue;
            }

            warn!(
                "Tunnel process {} unhealthy (failed layer: {}), reconnecting",
                process.pid(),
                verdict.failed_layer().unwrap_or("unknown")
            );
            shared.set_state(SupervisorState::Unhealthy);
            shared.drop_active(process).await;

            if let Err(e) = shared.stats.record_reconnect() {
                warn!("Failed to persist reconnect counter: {}", e);
            }
        }

        match relaunch(&shared, &mut launcher).await {
            RelaunchOutcome::Running(process) => current = Some(process),
            RelaunchOutcome::RetryLater => {}
            RelaunchOutcome::Shutdown => break,
        }
    }

    shared.set_state(SupervisorState::ShuttingDown);
    if let Some(process) = current.take() {
        shared.drop_active(process).await;
    }
    if let Err(e) = shared.stats.clear() {
        warn!("Failed to clear stats on shutdown: {}", e);
    }
    shared.clear_active();
    shared.set_state(SupervisorState::Stopped);
    debug!("Supervision loop ended");
}

/// One supervisor-level relaunch step. Launch-level exhaustion is not
/// fatal here: the caller waits out the next check interval and retries,
/// indefinitely.
async fn relaunch(shared: &Arc<Shared>, launcher: &mut Launcher) -> RelaunchOutcome {
    shared.set_state(SupervisorState::Relaunching);

    match launcher.launch().await {
        Ok(process) => {
            let stats = shared.stats.read();
            info!(
                "Tunnel reconnected (pid {}, reconnect #{} this session)",
                process.pid(),
                stats.reconnect_count
            );
            shared.record_active(&process);
            shared.set_state(SupervisorState::Running);
            RelaunchOutcome::Running(process)
        }
        Err(TunnelkeepError::Cancelled) => RelaunchOutcome::Shutdown,
        Err(e) => {
            error!(
                "Relaunch failed ({}); retrying after the next check interval",
                e
            );
            shared.set_state(SupervisorState::Unhealthy);
            RelaunchOutcome::RetryLater
        }
    }
}
