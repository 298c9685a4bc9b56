use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cumulative counters for one supervision session.
///
/// Persisted across restarts of the supervisor process itself; reset
/// when the operator stops the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelStats {
    pub session_started_at: DateTime<Utc>,
    pub reconnect_count: u64,
    pub last_reconnect_at: Option<DateTime<Utc>>,
}

impl TunnelStats {
    /// A fresh record stamped with the current time.
    pub fn fresh() -> Self {
        Self {
            session_started_at: Utc::now(),
            reconnect_count: 0,
            last_reconnect_at: None,
        }
    }

    /// Record one completed reconnect. Monotonic, never decremented.
    pub fn record_reconnect(&mut self) {
        self.reconnect_count += 1;
        self.last_reconnect_at = Some(Utc::now());
    }

    /// Seconds since the session started.
    pub fn session_uptime_secs(&self) -> i64 {
        (Utc::now() - self.session_started_at).num_seconds()
    }
}

impl Default for TunnelStats {
    fn default() -> Self {
        Self::fresh()
    }
}
