//! Launch and supervision tests against stand-in processes (`sleep`)
//! and scripted health verdicts, so no tunnel client is required.

use super::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tunnelkeep_tunnel::{HealthCheck, HealthVerdict, LayerResult, TunnelProcess};
use tunnelkeep_types::{SupervisorState, TunnelkeepError, TunnelkeepResult};

static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

fn temp_data_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "tunnelkeep-supervisor-test-{}-{}",
        std::process::id(),
        DIR_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Spawns `sleep` processes in place of the tunnel client and records
/// every PID it handed out.
struct SleepFactory {
    pids: Mutex<Vec<u32>>,
}

impl SleepFactory {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pids: Mutex::new(Vec::new()),
        })
    }

    fn spawned(&self) -> usize {
        self.pids.lock().len()
    }

    fn pids(&self) -> Vec<u32> {
        self.pids.lock().clone()
    }
}

#[async_trait]
impl ProcessFactory for SleepFactory {
    async fn spawn(&self) -> TunnelkeepResult<TunnelProcess> {
        let process =
            TunnelProcess::spawn_command(Path::new("/bin/sleep"), &["30".to_string()]).await?;
        self.pids.lock().push(process.pid());
        Ok(process)
    }
}

/// Replays a scripted sequence of verdicts, then repeats a default.
struct ScriptedHealth {
    script: Mutex<VecDeque<bool>>,
    default: bool,
}

impl ScriptedHealth {
    fn new(script: &[bool], default: bool) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            default,
        })
    }

    fn always(healthy: bool) -> Arc<Self> {
        Self::new(&[], healthy)
    }
}

#[async_trait]
impl HealthCheck for ScriptedHealth {
    async fn check(&self, _process: &mut TunnelProcess) -> HealthVerdict {
        let healthy = self.script.lock().pop_front().unwrap_or(self.default);
        if healthy {
            HealthVerdict {
                process_alive: true,
                port_listening: LayerResult::Passed,
                probe: LayerResult::Passed,
            }
        } else {
            HealthVerdict {
                process_alive: true,
                port_listening: LayerResult::Failed,
                probe: LayerResult::Skipped,
            }
        }
    }
}

fn fast_launch_options(max_attempts: u32) -> LaunchOptions {
    LaunchOptions {
        settle: Duration::from_millis(10),
        max_attempts,
        backoff_initial: Duration::from_millis(20),
        backoff_max: Duration::from_millis(100),
        terminate_grace: Duration::from_secs(1),
    }
}

fn launcher(
    factory: Arc<SleepFactory>,
    checker: Arc<ScriptedHealth>,
    max_attempts: u32,
) -> (tokio::sync::watch::Sender<bool>, Launcher) {
    let (tx, signal) = ShutdownSignal::new();
    let launcher = Launcher::new(factory, checker, fast_launch_options(max_attempts), signal);
    (tx, launcher)
}

#[tokio::test]
async fn test_launcher_exhausts_and_leaks_nothing() {
    let factory = SleepFactory::new();
    let (_tx, mut launcher) = launcher(factory.clone(), ScriptedHealth::always(false), 3);

    let err = launcher.launch().await.unwrap_err();
    assert!(matches!(err, TunnelkeepError::LaunchExhausted { attempts: 3 }));

    // Exactly max_attempts processes were spawned, and every one of
    // them was terminated before the error surfaced.
    let pids = factory.pids();
    assert_eq!(pids.len(), 3);
    for pid in pids {
        assert!(!pid_alive(pid), "leaked process {}", pid);
    }
}

#[tokio::test]
async fn test_launcher_succeeds_after_failed_attempt() {
    let factory = SleepFactory::new();
    let (_tx, mut launcher) = launcher(factory.clone(), ScriptedHealth::new(&[false], true), 5);

    let process = launcher.launch().await.unwrap();

    let pids = factory.pids();
    assert_eq!(pids.len(), 2);
    assert!(!pid_alive(pids[0]));
    assert_eq!(process.pid(), pids[1]);
    assert!(pid_alive(pids[1]));

    process.terminate(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_launcher_cancelled_before_first_spawn() {
    let factory = SleepFactory::new();
    let (tx, mut launcher) = launcher(factory.clone(), ScriptedHealth::always(true), 5);

    tx.send(true).unwrap();
    let err = launcher.launch().await.unwrap_err();
    assert!(matches!(err, TunnelkeepError::Cancelled));
    assert_eq!(factory.spawned(), 0);
}

#[tokio::test]
async fn test_launcher_cancelled_mid_settle_terminates_spawn() {
    let factory = SleepFactory::new();
    let (tx, signal) = ShutdownSignal::new();
    let options = LaunchOptions {
        settle: Duration::from_secs(30),
        ..fast_launch_options(5)
    };
    let mut launcher = Launcher::new(
        factory.clone(),
        ScriptedHealth::always(true),
        options,
        signal,
    );

    let task = tokio::spawn(async move { launcher.launch().await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(true).unwrap();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, TunnelkeepError::Cancelled));

    let pids = factory.pids();
    assert_eq!(pids.len(), 1);
    assert!(!pid_alive(pids[0]), "cancelled launch leaked its process");
}

fn fast_supervisor(
    factory: Arc<SleepFactory>,
    checker: Arc<ScriptedHealth>,
    data_dir: &Path,
) -> Supervisor {
    let timings = SupervisorTimings {
        check_interval: Duration::from_millis(100),
        launch: fast_launch_options(2),
    };
    Supervisor::new(timings, factory, checker, data_dir.to_path_buf(), 8022)
}

#[tokio::test]
async fn test_supervisor_detects_failure_and_relaunches() {
    let dir = temp_data_dir();
    let factory = SleepFactory::new();

    // Launch check passes, first periodic check fails, everything after
    // passes: exactly one reconnect cycle.
    let checker = ScriptedHealth::new(&[true, false], true);
    let supervisor = fast_supervisor(factory.clone(), checker, &dir);

    supervisor.start().await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Running);
    assert_eq!(factory.spawned(), 1);

    tokio::time::sleep(Duration::from_millis(600)).await;

    let status = supervisor.status();
    assert_eq!(status.state, SupervisorState::Running);
    assert_eq!(status.stats.reconnect_count, 1);

    // The unhealthy handle was replaced, never reused: old process
    // dead, exactly one new process active.
    let pids = factory.pids();
    assert_eq!(pids.len(), 2);
    assert!(!pid_alive(pids[0]));
    assert!(pid_alive(pids[1]));
    assert_eq!(status.pid, Some(pids[1]));
    assert_eq!(read_pid_record(&dir, 8022), Some(pids[1]));

    supervisor.stop().await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    assert!(!pid_alive(pids[1]));
    assert!(!stats_path(&dir, 8022).exists());
    assert_eq!(read_pid_record(&dir, 8022), None);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_supervisor_start_is_idempotent() {
    let dir = temp_data_dir();
    let factory = SleepFactory::new();
    let supervisor = fast_supervisor(factory.clone(), ScriptedHealth::always(true), &dir);

    supervisor.start().await.unwrap();
    supervisor.start().await.unwrap();
    assert_eq!(factory.spawned(), 1);

    supervisor.stop().await.unwrap();
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_supervisor_stop_is_idempotent() {
    let dir = temp_data_dir();
    let factory = SleepFactory::new();
    let supervisor = fast_supervisor(factory.clone(), ScriptedHealth::always(true), &dir);

    // Stopping a never-started supervisor is a no-op.
    supervisor.stop().await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Stopped);

    supervisor.start().await.unwrap();
    supervisor.stop().await.unwrap();
    supervisor.stop().await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Stopped);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_supervisor_start_fails_when_launch_exhausts() {
    let dir = temp_data_dir();
    let factory = SleepFactory::new();
    let supervisor = fast_supervisor(factory.clone(), ScriptedHealth::always(false), &dir);

    let err = supervisor.start().await.unwrap_err();
    assert!(matches!(err, TunnelkeepError::LaunchExhausted { attempts: 2 }));
    assert_eq!(supervisor.state(), SupervisorState::Stopped);

    for pid in factory.pids() {
        assert!(!pid_alive(pid));
    }
    assert!(!stats_path(&dir, 8022).exists());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_supervisor_restart_begins_fresh_session() {
    let dir = temp_data_dir();
    let factory = SleepFactory::new();
    let supervisor = fast_supervisor(factory.clone(), ScriptedHealth::always(true), &dir);

    supervisor.start().await.unwrap();
    supervisor.restart().await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Running);
    assert_eq!(supervisor.status().stats.reconnect_count, 0);
    assert_eq!(factory.spawned(), 2);

    supervisor.stop().await.unwrap();
    std::fs::remove_dir_all(&dir).unwrap();
}
