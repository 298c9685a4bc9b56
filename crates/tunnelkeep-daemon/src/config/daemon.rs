use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;
use tunnelkeep_tunnel::TunnelConfig;
use tunnelkeep_types::{TunnelkeepError, TunnelkeepResult};

use super::logging::LoggingConfig;
use super::supervisor::SupervisorConfig;
use super::types::LogLevel;

/// Top-level daemon configuration, loaded from TOML with environment
/// overrides applied on top.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub tunnel: TunnelConfig,
    pub supervisor: SupervisorConfig,
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/var/lib/tunnelkeep"));

        Self {
            data_dir: home.join(".tunnelkeep"),
            tunnel: TunnelConfig::default(),
            supervisor: SupervisorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Parse the config file (defaults when absent) and apply env
    /// overrides. Validation is separate: commands that only read
    /// persisted state can work with an incomplete config.
    pub fn load(path: impl AsRef<std::path::Path>) -> TunnelkeepResult<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| TunnelkeepError::Config(format!("Failed to read config: {}", e)))?;

            toml::from_str(&contents)
                .map_err(|e| TunnelkeepError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            info!("Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<std::path::Path>) -> TunnelkeepResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| TunnelkeepError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TunnelkeepError::Config(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path.as_ref(), contents)
            .map_err(|e| TunnelkeepError::Config(format!("Failed to write config: {}", e)))?;

        info!("Configuration saved to {:?}", path.as_ref());
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("TUNNELKEEP_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(host) = std::env::var("TUNNELKEEP_REMOTE_HOST") {
            self.tunnel.remote_host = host;
        }

        if let Ok(port) = std::env::var("TUNNELKEEP_LOCAL_PORT") {
            if let Ok(p) = port.parse() {
                self.tunnel.local_port = p;
            }
        }

        if let Ok(port) = std::env::var("TUNNELKEEP_REMOTE_PORT") {
            if let Ok(p) = port.parse() {
                self.tunnel.remote_port = p;
            }
        }

        if let Ok(url) = std::env::var("TUNNELKEEP_PROBE_URL") {
            self.tunnel.probe_url = Some(url);
        }

        if let Ok(level) = std::env::var("TUNNELKEEP_LOG_LEVEL") {
            self.logging.level = LogLevel::from_str_or_default(&level);
        }
    }

    /// Required before starting supervision; all failures here are
    /// fatal to the start attempt and never retried.
    pub fn validate(&self) -> TunnelkeepResult<()> {
        self.tunnel
            .validate()
            .map_err(TunnelkeepError::Config)?;
        self.supervisor
            .validate()
            .map_err(TunnelkeepError::Config)?;
        Ok(())
    }
}
