//! CLI argument parsing for the ANN agent daemon.
//!
//! CLI flags override every other config source.

use clap::{Args, Parser, Subcommand};

/// ANN Agent Daemon
///
/// Serves a locally-persisted approximate nearest neighbor index.
#[derive(Parser, Debug)]
#[command(name = "ann-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/ann-agent/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides accepted by `start`.
#[derive(Args, Debug, Clone, Default)]
pub struct StartArgs {
    /// Run in foreground (don't daemonize)
    #[arg(short, long)]
    pub foreground: bool,

    /// Override gRPC port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override snapshot directory
    #[arg(long)]
    pub index_path: Option<String>,

    /// Keep the index in memory only
    #[arg(long)]
    pub in_memory: bool,

    /// Override vector dimension
    #[arg(long)]
    pub dimension: Option<usize>,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the agent daemon
    Start(StartArgs),

    /// Stop the running daemon
    Stop,

    /// Show daemon status
    Status,

    /// Inspect or drive the index of a running agent
    Index {
        /// gRPC endpoint (default: http://[::1]:8081)
        #[arg(short, long, default_value = "http://[::1]:8081")]
        endpoint: String,

        #[command(subcommand)]
        command: IndexCommands,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Index subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum IndexCommands {
    /// Show stored and uncommitted counts
    Info,

    /// Commit queued operations into the index
    Commit {
        /// Operations per store batch, 0 for the agent default
        #[arg(long, default_value = "0")]
        pool_size: u32,
    },

    /// Write a snapshot
    Save,

    /// Commit, then write a snapshot
    CommitAndSave {
        #[arg(long, default_value = "0")]
        pool_size: u32,
    },

    /// Drop every record and queued operation
    Flush,

    /// Show background job status
    Jobs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_start_foreground() {
        let cli = Cli::parse_from(["ann-daemon", "start", "--foreground"]);
        match cli.command {
            Commands::Start(args) => assert!(args.foreground),
            _ => panic!("Expected Start command"),
        }
    }

    #[test]
    fn test_cli_start_overrides() {
        let cli = Cli::parse_from([
            "ann-daemon",
            "start",
            "-p",
            "9999",
            "--index-path",
            "/custom/index",
            "--in-memory",
            "--dimension",
            "128",
        ]);
        match cli.command {
            Commands::Start(args) => {
                assert_eq!(args.port, Some(9999));
                assert_eq!(args.index_path, Some("/custom/index".to_string()));
                assert!(args.in_memory);
                assert_eq!(args.dimension, Some(128));
            }
            _ => panic!("Expected Start command"),
        }
    }

    #[test]
    fn test_cli_with_config_and_log_level() {
        let cli = Cli::parse_from([
            "ann-daemon",
            "--config",
            "/path/to/config.toml",
            "--log-level",
            "debug",
            "start",
        ]);
        assert_eq!(cli.config, Some("/path/to/config.toml".to_string()));
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_status_and_stop() {
        let cli = Cli::parse_from(["ann-daemon", "status"]);
        assert!(matches!(cli.command, Commands::Status));
        let cli = Cli::parse_from(["ann-daemon", "stop"]);
        assert!(matches!(cli.command, Commands::Stop));
    }

    #[test]
    fn test_cli_index_commit() {
        let cli = Cli::parse_from([
            "ann-daemon",
            "index",
            "-e",
            "http://localhost:9999",
            "commit",
            "--pool-size",
            "64",
        ]);
        match cli.command {
            Commands::Index { endpoint, command } => {
                assert_eq!(endpoint, "http://localhost:9999");
                assert!(matches!(command, IndexCommands::Commit { pool_size: 64 }));
            }
            _ => panic!("Expected Index command"),
        }
    }

    #[test]
    fn test_cli_index_default_endpoint() {
        let cli = Cli::parse_from(["ann-daemon", "index", "jobs"]);
        match cli.command {
            Commands::Index { endpoint, command } => {
                assert_eq!(endpoint, "http://[::1]:8081");
                assert!(matches!(command, IndexCommands::Jobs));
            }
            _ => panic!("Expected Index command"),
        }
    }
}
