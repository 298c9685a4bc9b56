use super::commands::ConfigAction;
use std::path::Path;
use tunnelkeep_daemon::DaemonConfig;
use tunnelkeep_types::{TunnelkeepError, TunnelkeepResult};

pub fn init_config(config_path: &Path, data_dir: &Path, force: bool) -> TunnelkeepResult<()> {
    if config_path.exists() && !force {
        return Err(TunnelkeepError::Config(format!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        )));
    }

    std::fs::create_dir_all(data_dir)
        .map_err(|e| TunnelkeepError::Config(format!("Failed to create data directory: {}", e)))?;

    let mut config = DaemonConfig::default();
    config.data_dir = data_dir.to_path_buf();
    config.save(config_path)?;

    println!("Wrote default configuration to {}", config_path.display());
    println!();
    println!("Before running, set the connection target:");
    println!("  [tunnel]");
    println!("  remote_host = \"gateway.example.net\"");
    println!("  remote_port = 5432");
    println!("  local_port  = 15432");
    Ok(())
}

pub fn handle_config(config_path: &Path, action: Option<ConfigAction>) -> TunnelkeepResult<()> {
    let config = DaemonConfig::load(config_path)?;

    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let contents = toml::to_string_pretty(&config)
                .map_err(|e| TunnelkeepError::Config(format!("Failed to render config: {}", e)))?;
            println!("# {}", config_path.display());
            print!("{}", contents);
        }
        ConfigAction::Validate => match config.validate() {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => {
                println!("Configuration is invalid: {}", e);
                return Err(e);
            }
        },
    }

    Ok(())
}
