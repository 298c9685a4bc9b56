mod commands;
mod control;
mod init;
mod run;
mod status;
mod utils;

pub use commands::{Cli, Commands, ConfigAction, OutputFormat};
pub use control::{stop_daemon, wait_for_daemon_exit};
pub use init::{handle_config, init_config};
pub use run::run_daemon;
pub use status::show_status;
pub use utils::init_logging;
