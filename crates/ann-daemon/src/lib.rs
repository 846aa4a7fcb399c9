//! ANN agent daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (start, stop, status, index, config)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, IndexCommands, StartArgs};
pub use commands::{handle_index, show_config, show_status, start_daemon, stop_daemon};
