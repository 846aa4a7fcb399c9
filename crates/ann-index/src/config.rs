//! Agent configuration.

use std::path::PathBuf;

use ann_types::{AgentError, DistanceType, Settings};
use ann_vector::HnswConfig;

/// Settings the index lifecycle manager runs with.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub ips: Vec<String>,
    pub dimension: usize,
    pub distance: DistanceType,
    /// Snapshot base directory, ignored in memory mode
    pub index_path: PathBuf,
    pub in_memory: bool,
    pub copy_on_write: bool,
    pub broken_index_history_limit: usize,
    pub min_search_results: u32,
    /// Commit batch size used when the caller passes 0
    pub default_pool_size: u32,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
    pub initial_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl AgentConfig {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            name: settings.agent_name.clone(),
            ips: settings.agent_ips.clone(),
            dimension: settings.dimension,
            distance: settings.distance_type,
            index_path: settings.expanded_index_path(),
            in_memory: settings.in_memory,
            copy_on_write: settings.enable_copy_on_write,
            broken_index_history_limit: settings.broken_index_history_limit,
            min_search_results: settings.min_search_results,
            default_pool_size: settings.default_pool_size,
            connectivity: settings.connectivity,
            expansion_add: settings.expansion_add,
            expansion_search: settings.expansion_search,
            initial_capacity: settings.initial_capacity,
        }
    }

    pub fn with_index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = path.into();
        self
    }

    pub fn with_in_memory(mut self, in_memory: bool) -> Self {
        self.in_memory = in_memory;
        self
    }

    pub fn with_copy_on_write(mut self, copy_on_write: bool) -> Self {
        self.copy_on_write = copy_on_write;
        self
    }

    pub fn with_distance(mut self, distance: DistanceType) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_min_search_results(mut self, min: u32) -> Self {
        self.min_search_results = min;
        self
    }

    pub fn with_broken_index_history_limit(mut self, limit: usize) -> Self {
        self.broken_index_history_limit = limit;
        self
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.dimension == 0 {
            return Err(AgentError::Config("dimension must be > 0".to_string()));
        }
        if !self.in_memory && self.index_path.as_os_str().is_empty() {
            return Err(AgentError::Config(
                "index_path is required unless in_memory is set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn hnsw_config(&self) -> HnswConfig {
        HnswConfig::new(self.dimension)
            .with_distance(self.distance)
            .with_connectivity(self.connectivity)
            .with_expansion(self.expansion_add, self.expansion_search)
            .with_capacity(self.initial_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings() {
        let settings = Settings {
            dimension: 64,
            enable_copy_on_write: true,
            index_path: "/tmp/ann".to_string(),
            ..Default::default()
        };
        let config = AgentConfig::from_settings(&settings);
        assert_eq!(config.dimension, 64);
        assert!(config.copy_on_write);
        assert_eq!(config.index_path, PathBuf::from("/tmp/ann"));
        assert_eq!(config.hnsw_config().dimension, 64);
    }

    #[test]
    fn test_validate() {
        assert!(AgentConfig::new(0).validate().is_err());
        let config = AgentConfig::new(3).with_index_path("");
        assert!(config.validate().is_err());
        assert!(config.with_in_memory(true).validate().is_ok());
    }
}
