use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use tunnelkeep_types::{DEFAULT_PORT_CHECK_TIMEOUT_SECS, DEFAULT_PROBE_TIMEOUT_SECS};

/// Connection parameters for the supervised tunnel.
///
/// Describes one local-port forward through an `ssh`-compatible client:
/// `local_bind_addr:local_port` is forwarded to
/// `forward_host:remote_port` as seen from `remote_host`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Explicit path to the tunnel client binary. When unset the binary
    /// is discovered on well-known paths.
    pub tunnel_binary: Option<PathBuf>,

    pub local_bind_addr: IpAddr,

    pub local_port: u16,

    /// Host running the tunnel endpoint, `[user@]host` semantics split
    /// across `remote_user`/`remote_host`.
    pub remote_host: String,

    pub remote_user: Option<String>,

    /// Port the tunnel client connects to on `remote_host`.
    pub remote_ssh_port: u16,

    /// Destination host of the forward, resolved on the remote side.
    pub forward_host: String,

    /// Destination port of the forward.
    pub remote_port: u16,

    pub identity_file: Option<PathBuf>,

    /// Keep-alive ping interval passed to the tunnel client.
    pub keepalive_interval_secs: u64,

    /// Missed keep-alives before the client gives up on the connection.
    pub keepalive_max_missed: u32,

    pub connect_timeout_secs: u64,

    /// URL fetched through the forwarded port as the end-to-end
    /// functional probe. Unset disables the probe layer (the health
    /// verdict is then reported as degraded).
    pub probe_url: Option<String>,

    pub probe_timeout_secs: u64,

    pub port_check_timeout_secs: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            tunnel_binary: None,
            local_bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            local_port: 8022,
            remote_host: String::new(),
            remote_user: None,
            remote_ssh_port: 22,
            forward_host: "localhost".to_string(),
            remote_port: 80,
            identity_file: None,
            keepalive_interval_secs: 15,
            keepalive_max_missed: 3,
            connect_timeout_secs: 10,
            probe_url: None,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            port_check_timeout_secs: DEFAULT_PORT_CHECK_TIMEOUT_SECS,
        }
    }
}

impl TunnelConfig {
    pub fn with_remote(mut self, host: impl Into<String>, port: u16) -> Self {
        self.remote_host = host.into();
        self.remote_port = port;
        self
    }

    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.remote_user = Some(user.into());
        self
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    pub fn with_probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = Some(url.into());
        self
    }

    /// The `user@host` endpoint handed to the tunnel client.
    pub fn endpoint(&self) -> String {
        match &self.remote_user {
            Some(user) => format!("{}@{}", user, self.remote_host),
            None => self.remote_host.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.remote_host.trim().is_empty() {
            return Err("remote_host is required".into());
        }

        if self.local_port == 0 {
            return Err("local_port cannot be 0".into());
        }

        if self.remote_port == 0 || self.remote_ssh_port == 0 {
            return Err("remote ports cannot be 0".into());
        }

        if self.forward_host.trim().is_empty() {
            return Err("forward_host is required".into());
        }

        if self.keepalive_interval_secs == 0 {
            return Err("keepalive_interval_secs must be at least 1".into());
        }

        if let Some(ref url) = self.probe_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("probe_url must be an http(s) URL, got '{}'", url));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> TunnelConfig {
        TunnelConfig::default().with_remote("gateway.example.net", 5432)
    }

    #[test]
    fn test_default_config_requires_remote_host() {
        assert!(TunnelConfig::default().validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_zero_ports_rejected() {
        let mut config = valid_config();
        config.local_port = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.remote_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_probe_url_scheme_checked() {
        let mut config = valid_config();
        config.probe_url = Some("ftp://example.net".into());
        assert!(config.validate().is_err());

        config.probe_url = Some("http://127.0.0.1:8022/healthz".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_formatting() {
        let config = valid_config();
        assert_eq!(config.endpoint(), "gateway.example.net");
        assert_eq!(config.with_user("deploy").endpoint(), "deploy@gateway.example.net");
    }
}
