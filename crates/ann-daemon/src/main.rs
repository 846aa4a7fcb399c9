//! ANN Agent Daemon
//!
//! Serves one vector index over gRPC and keeps it committed and saved in
//! the background.
//!
//! # Usage
//!
//! ```bash
//! ann-daemon start [--foreground] [--port PORT] [--index-path PATH] [--in-memory]
//! ann-daemon stop
//! ann-daemon status
//! ann-daemon index info|commit|save|flush|jobs
//! ann-daemon config
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/ann-agent/config.toml)
//! 3. Environment variables (ANN_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use ann_daemon::{
    handle_index, show_config, show_status, start_daemon, stop_daemon, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => {
            start_daemon(cli.config.as_deref(), args, cli.log_level.as_deref()).await?;
        }
        Commands::Stop => {
            stop_daemon()?;
        }
        Commands::Status => {
            show_status()?;
        }
        Commands::Index { endpoint, command } => {
            handle_index(&endpoint, command).await?;
        }
        Commands::Config => {
            show_config(cli.config.as_deref())?;
        }
    }

    Ok(())
}
