use crate::{TunnelConfig, TunnelProcess};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Outcome of one health-check layer.
///
/// `Skipped` means the layer could not be evaluated (missing probe
/// capability, or short-circuited by a dead process); it never fails
/// the verdict, but a skipped optional layer marks it degraded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerResult {
    Passed,
    Failed,
    Skipped,
}

impl LayerResult {
    pub fn passed_or_skipped(&self) -> bool {
        !matches!(self, LayerResult::Failed)
    }
}

/// Combined result of the layered liveness test. Computed fresh each
/// check cycle, never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub process_alive: bool,
    pub port_listening: LayerResult,
    pub probe: LayerResult,
}

impl HealthVerdict {
    /// Verdict for a process that is no longer running. The remaining
    /// layers are not evaluated.
    pub fn dead_process() -> Self {
        Self {
            process_alive: false,
            port_listening: LayerResult::Skipped,
            probe: LayerResult::Skipped,
        }
    }

    pub fn healthy(&self) -> bool {
        self.process_alive
            && self.port_listening.passed_or_skipped()
            && self.probe.passed_or_skipped()
    }

    /// A healthy verdict reached with one or more layers skipped is
    /// weaker than configured; status output surfaces this explicitly.
    pub fn degraded(&self) -> bool {
        self.healthy()
            && (self.port_listening == LayerResult::Skipped || self.probe == LayerResult::Skipped)
    }

    /// Name of the first failing layer, for diagnostics.
    pub fn failed_layer(&self) -> Option<&'static str> {
        if !self.process_alive {
            return Some("process");
        }
        if self.port_listening == LayerResult::Failed {
            return Some("port");
        }
        if self.probe == LayerResult::Failed {
            return Some("probe");
        }
        None
    }
}

/// Seam between the supervisor and the real health checks, so the
/// supervision loop is testable without a tunnel client binary.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self, process: &mut TunnelProcess) -> HealthVerdict;
}

/// Layered health check against a running tunnel process:
/// OS-level liveness, listening-socket presence, and an end-to-end
/// HTTP probe through the forwarded port.
pub struct HealthChecker {
    local_addr: SocketAddr,
    port_timeout: Duration,
    probe_timeout: Duration,
    probe_url: Option<String>,
    http: Option<reqwest::Client>,
}

impl HealthChecker {
    pub fn new(config: &TunnelConfig) -> Self {
        let probe_timeout = Duration::from_secs(config.probe_timeout_secs);

        // A client that cannot be built degrades the probe layer to
        // skipped rather than failing every check.
        let http = if config.probe_url.is_some() {
            match reqwest::Client::builder().timeout(probe_timeout).build() {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!("Functional probe unavailable, HTTP client failed to build: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            local_addr: SocketAddr::new(config.local_bind_addr, config.local_port),
            port_timeout: Duration::from_secs(config.port_check_timeout_secs),
            probe_timeout,
            probe_url: config.probe_url.clone(),
            http,
        }
    }

    /// Listening-socket presence: a bounded-timeout connect to the
    /// local forward address. A timeout counts as failed, not skipped.
    async fn check_port(&self) -> LayerResult {
        match tokio::time::timeout(self.port_timeout, TcpStream::connect(self.local_addr)).await {
            Ok(Ok(_)) => LayerResult::Passed,
            Ok(Err(e)) => {
                debug!("Port check failed for {}: {}", self.local_addr, e);
                LayerResult::Failed
            }
            Err(_) => {
                debug!("Port check timed out for {}", self.local_addr);
                LayerResult::Failed
            }
        }
    }

    /// End-to-end round trip through the forwarded port. Any completed
    /// HTTP exchange passes; the layer verifies the forward works, not
    /// the application behind it.
    async fn check_probe(&self) -> LayerResult {
        let (url, client) = match (&self.probe_url, &self.http) {
            (Some(url), Some(client)) => (url, client),
            _ => return LayerResult::Skipped,
        };

        match tokio::time::timeout(self.probe_timeout, client.get(url).send()).await {
            Ok(Ok(response)) => {
                debug!("Probe round trip completed: {} -> {}", url, response.status());
                LayerResult::Passed
            }
            Ok(Err(e)) => {
                debug!("Probe failed for {}: {}", url, e);
                LayerResult::Failed
            }
            Err(_) => {
                debug!("Probe timed out for {}", url);
                LayerResult::Failed
            }
        }
    }
}

#[async_trait]
impl HealthCheck for HealthChecker {
    async fn check(&self, process: &mut TunnelProcess) -> HealthVerdict {
        if !process.is_alive() {
            return HealthVerdict::dead_process();
        }

        let port_listening = self.check_port().await;

        // Without a listener the probe cannot succeed; the verdict is
        // already unhealthy, so skip the wait.
        let probe = if port_listening == LayerResult::Failed {
            LayerResult::Skipped
        } else {
            self.check_probe().await
        };

        HealthVerdict {
            process_alive: true,
            port_listening,
            probe,
        }
    }
}
