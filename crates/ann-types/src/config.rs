//! Configuration loading for the ANN agent.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/ann-agent/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::AgentError;

/// Distance function used by the vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceType {
    /// Squared euclidean distance
    L2,
    /// 1 - inner product
    Ip,
    /// 1 - cosine similarity
    #[default]
    Cos,
}

/// Main agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Agent name reported in locations
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// Addresses reported in locations
    #[serde(default)]
    pub agent_ips: Vec<String>,

    /// Vector dimension accepted by this agent
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default)]
    pub distance_type: DistanceType,

    /// Base directory of the persisted snapshot
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Keep everything in memory and never write a snapshot
    #[serde(default)]
    pub in_memory: bool,

    /// Persist through a staging directory and swap it into place
    #[serde(default)]
    pub enable_copy_on_write: bool,

    /// Number of quarantined broken snapshots to keep
    #[serde(default = "default_broken_index_history_limit")]
    pub broken_index_history_limit: usize,

    /// Searches returning fewer results than this fail with NotFound
    #[serde(default)]
    pub min_search_results: u32,

    /// Commit batch size used when the caller passes a pool size of 0
    #[serde(default = "default_pool_size")]
    pub default_pool_size: u32,

    /// HNSW connections per layer
    #[serde(default = "default_connectivity")]
    pub connectivity: usize,

    /// HNSW build-time search depth
    #[serde(default = "default_expansion_add")]
    pub expansion_add: usize,

    /// HNSW query-time search depth
    #[serde(default = "default_expansion_search")]
    pub expansion_search: usize,

    /// Initial store reservation, grown on demand
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// gRPC server port
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,

    /// gRPC server host
    #[serde(default = "default_grpc_host")]
    pub grpc_host: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Period of the auto-commit queue check
    #[serde(default = "default_auto_index_check_interval")]
    pub auto_index_check_interval_secs: u64,

    /// Queue length that triggers an auto-commit
    #[serde(default = "default_auto_index_length")]
    pub auto_index_length: usize,

    /// Period of the auto-save job
    #[serde(default = "default_auto_save_interval")]
    pub auto_save_interval_secs: u64,

    /// Period of the forced commit-and-save job
    #[serde(default = "default_auto_index_limit")]
    pub auto_index_limit_secs: u64,

    /// Delay before background jobs first run
    #[serde(default)]
    pub initial_delay_secs: u64,
}

fn default_agent_name() -> String {
    "ann-agent".to_string()
}

fn default_dimension() -> usize {
    3
}

fn default_index_path() -> String {
    ProjectDirs::from("", "", "ann-agent")
        .map(|p| p.data_local_dir().join("index"))
        .unwrap_or_else(|| PathBuf::from("./index"))
        .to_string_lossy()
        .to_string()
}

fn default_broken_index_history_limit() -> usize {
    3
}

fn default_pool_size() -> u32 {
    10_000
}

fn default_connectivity() -> usize {
    16
}

fn default_expansion_add() -> usize {
    128
}

fn default_expansion_search() -> usize {
    64
}

fn default_initial_capacity() -> usize {
    10_000
}

fn default_grpc_port() -> u16 {
    8081
}

fn default_grpc_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_auto_index_check_interval() -> u64 {
    1
}

fn default_auto_index_length() -> usize {
    100
}

fn default_auto_save_interval() -> u64 {
    60
}

fn default_auto_index_limit() -> u64 {
    3600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            agent_ips: Vec::new(),
            dimension: default_dimension(),
            distance_type: DistanceType::default(),
            index_path: default_index_path(),
            in_memory: false,
            enable_copy_on_write: false,
            broken_index_history_limit: default_broken_index_history_limit(),
            min_search_results: 0,
            default_pool_size: default_pool_size(),
            connectivity: default_connectivity(),
            expansion_add: default_expansion_add(),
            expansion_search: default_expansion_search(),
            initial_capacity: default_initial_capacity(),
            grpc_port: default_grpc_port(),
            grpc_host: default_grpc_host(),
            log_level: default_log_level(),
            auto_index_check_interval_secs: default_auto_index_check_interval(),
            auto_index_length: default_auto_index_length(),
            auto_save_interval_secs: default_auto_save_interval(),
            auto_index_limit_secs: default_auto_index_limit(),
            initial_delay_secs: 0,
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/ann-agent/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (ANN_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, AgentError> {
        let config_dir = ProjectDirs::from("", "", "ann-agent")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("dimension", default_dimension() as i64)
            .map_err(|e| AgentError::Config(e.to_string()))?
            .set_default("index_path", default_index_path())
            .map_err(|e| AgentError::Config(e.to_string()))?
            .set_default("grpc_port", default_grpc_port() as i64)
            .map_err(|e| AgentError::Config(e.to_string()))?
            .set_default("grpc_host", default_grpc_host())
            .map_err(|e| AgentError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| AgentError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // ANN_INDEX_PATH, ANN_GRPC_PORT, ANN_ENABLE_COPY_ON_WRITE, ...
        builder = builder.add_source(
            Environment::with_prefix("ANN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AgentError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| AgentError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the agent cannot run with.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.dimension == 0 {
            return Err(AgentError::Config("dimension must be > 0".to_string()));
        }
        if !self.in_memory && self.index_path.trim().is_empty() {
            return Err(AgentError::Config(
                "index_path is required unless in_memory is set".to_string(),
            ));
        }
        if self.auto_index_check_interval_secs == 0
            || self.auto_save_interval_secs == 0
            || self.auto_index_limit_secs == 0
        {
            return Err(AgentError::Config(
                "background job intervals must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the socket address for the gRPC server
    pub fn grpc_addr(&self) -> String {
        format!("{}:{}", self.grpc_host, self.grpc_port)
    }

    /// Expand ~ in index_path to the home directory
    pub fn expanded_index_path(&self) -> PathBuf {
        if let Some(rest) = self.index_path.strip_prefix("~/") {
            if let Some(home) = directories::BaseDirs::new().map(|b| b.home_dir().to_path_buf()) {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.index_path)
    }
}
