mod config;
mod probe;
mod providers;
mod resolve;

pub use config::{handle_config_command, ConfigCommands};
pub use probe::probe;
pub use providers::providers;
pub use resolve::{resolve, ResolveOptions};
