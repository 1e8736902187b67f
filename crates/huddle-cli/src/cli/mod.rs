pub mod commands;
pub mod config;
pub mod output;

pub use commands::{run_command, CliCommand};
pub use config::{default_config_path, load_config};
