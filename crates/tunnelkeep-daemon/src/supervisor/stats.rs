use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tunnelkeep_types::{TunnelStats, TunnelkeepError, TunnelkeepResult};

/// Reconnect statistics for one supervised tunnel, persisted under the
/// data directory keyed by the local port.
///
/// The in-memory record is the source of truth while the supervisor is
/// live; the file is its serialization, for crash recovery and status
/// queries from other processes. Writes publish atomically (write the
/// new version, then rename), so a reader never sees a partial record.
pub struct StatsTracker {
    path: PathBuf,
    current: RwLock<TunnelStats>,
}

impl StatsTracker {
    pub fn new(data_dir: &Path, local_port: u16) -> Self {
        Self {
            path: stats_path(data_dir, local_port),
            current: RwLock::new(TunnelStats::fresh()),
        }
    }

    /// Begin a fresh session, overwriting any prior counters.
    pub fn init(&self) -> TunnelkeepResult<()> {
        *self.current.write() = TunnelStats::fresh();
        self.persist()
    }

    /// Resume the persisted session if one survives from a supervisor
    /// that went down uncleanly, otherwise start fresh. An unreadable
    /// record is recovered by re-initializing, never by failing.
    pub fn init_or_resume(&self) -> TunnelkeepResult<()> {
        match load_stats(&self.path) {
            Some(stats) => {
                info!(
                    "Resuming session stats: {} reconnects since {}",
                    stats.reconnect_count, stats.session_started_at
                );
                *self.current.write() = stats;
                Ok(())
            }
            None => self.init(),
        }
    }

    /// Count one completed reconnect and stamp its time.
    pub fn record_reconnect(&self) -> TunnelkeepResult<()> {
        self.current.write().record_reconnect();
        self.persist()
    }

    /// Counters as of the most recent completed write.
    pub fn read(&self) -> TunnelStats {
        self.current.read().clone()
    }

    /// Remove the persisted record; the session is over.
    pub fn clear(&self) -> TunnelkeepResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TunnelkeepError::Storage(format!(
                "Failed to remove stats record {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn persist(&self) -> TunnelkeepResult<()> {
        let stats = self.current.read().clone();
        let contents = serde_json::to_string_pretty(&stats)
            .map_err(|e| TunnelkeepError::Storage(format!("Failed to serialize stats: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TunnelkeepError::Storage(format!("Failed to create data dir: {}", e))
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)
            .map_err(|e| TunnelkeepError::Storage(format!("Failed to write stats: {}", e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| TunnelkeepError::Storage(format!("Failed to publish stats: {}", e)))?;

        debug!("Persisted stats to {}", self.path.display());
        Ok(())
    }
}

pub fn stats_path(data_dir: &Path, local_port: u16) -> PathBuf {
    data_dir.join(format!("stats-{}.json", local_port))
}

pub fn pid_record_path(data_dir: &Path, local_port: u16) -> PathBuf {
    data_dir.join(format!("tunnel-{}.pid", local_port))
}

/// Read a persisted stats record. Missing or corrupt records return
/// `None`; corruption is logged since the recovery is otherwise silent.
pub fn load_stats(path: &Path) -> Option<TunnelStats> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Stats record {} unreadable, starting fresh: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str(&contents) {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!("Stats record {} corrupt, starting fresh: {}", path.display(), e);
            None
        }
    }
}

/// Record the PID of the active tunnel process for status queries.
pub fn write_pid_record(data_dir: &Path, local_port: u16, pid: u32) -> TunnelkeepResult<()> {
    let path = pid_record_path(data_dir, local_port);
    std::fs::create_dir_all(data_dir)
        .map_err(|e| TunnelkeepError::Storage(format!("Failed to create data dir: {}", e)))?;
    std::fs::write(&path, pid.to_string())
        .map_err(|e| TunnelkeepError::Storage(format!("Failed to write PID record: {}", e)))
}

pub fn read_pid_record(data_dir: &Path, local_port: u16) -> Option<u32> {
    let contents = std::fs::read_to_string(pid_record_path(data_dir, local_port)).ok()?;
    contents.trim().parse().ok()
}

pub fn clear_pid_record(data_dir: &Path, local_port: u16) {
    let _ = std::fs::remove_file(pid_record_path(data_dir, local_port));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_data_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tunnelkeep-stats-test-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_record_reconnect_counts() {
        let dir = temp_data_dir();
        let tracker = StatsTracker::new(&dir, 8022);
        tracker.init().unwrap();

        for k in 1..=4u64 {
            tracker.record_reconnect().unwrap();
            assert_eq!(tracker.read().reconnect_count, k);
        }

        // The persisted copy matches the last completed write.
        let on_disk = load_stats(&stats_path(&dir, 8022)).unwrap();
        assert_eq!(on_disk.reconnect_count, 4);
        assert!(on_disk.last_reconnect_at.is_some());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_init_overwrites_prior_session() {
        let dir = temp_data_dir();
        let tracker = StatsTracker::new(&dir, 8022);
        tracker.init().unwrap();
        tracker.record_reconnect().unwrap();

        tracker.init().unwrap();
        assert_eq!(tracker.read().reconnect_count, 0);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_resume_survives_supervisor_restart() {
        let dir = temp_data_dir();
        {
            let tracker = StatsTracker::new(&dir, 8022);
            tracker.init().unwrap();
            tracker.record_reconnect().unwrap();
            tracker.record_reconnect().unwrap();
        }

        let tracker = StatsTracker::new(&dir, 8022);
        tracker.init_or_resume().unwrap();
        assert_eq!(tracker.read().reconnect_count, 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_corrupt_record_recovers_fresh() {
        let dir = temp_data_dir();
        let path = stats_path(&dir, 8022);
        std::fs::write(&path, "{ not json").unwrap();

        assert!(load_stats(&path).is_none());

        let tracker = StatsTracker::new(&dir, 8022);
        tracker.init_or_resume().unwrap();
        assert_eq!(tracker.read().reconnect_count, 0);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = temp_data_dir();
        let tracker = StatsTracker::new(&dir, 8022);
        tracker.init().unwrap();

        tracker.clear().unwrap();
        assert!(!stats_path(&dir, 8022).exists());
        tracker.clear().unwrap();

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_pid_record_roundtrip() {
        let dir = temp_data_dir();
        write_pid_record(&dir, 8022, 4242).unwrap();
        assert_eq!(read_pid_record(&dir, 8022), Some(4242));

        clear_pid_record(&dir, 8022);
        assert_eq!(read_pid_record(&dir, 8022), None);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
