//! The agent facade.
//!
//! One [`Agent`] owns the pending queue, the committed store with its id map,
//! the lifecycle coordinator and the snapshot layout. Operations are split
//! across `committer`, `persister`, `mutation` and `read_path`, each adding
//! an `impl Agent` block.

use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};

use ann_types::{AgentError, IndexInfo, Location};
use ann_vector::{HnswStore, IdMap, VectorQueue, VectorStore};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AgentConfig;
use crate::coordinator::LifecycleCoordinator;
use crate::snapshot::SnapshotLayout;

/// Committed state. The store and the id map only ever change together.
pub(crate) struct IndexState {
    pub(crate) store: Box<dyn VectorStore>,
    pub(crate) idmap: IdMap,
}

/// Per-node vector index lifecycle manager.
pub struct Agent {
    pub(crate) config: AgentConfig,
    pub(crate) queue: VectorQueue,
    pub(crate) state: RwLock<IndexState>,
    pub(crate) coordinator: LifecycleCoordinator,
    /// `None` in memory mode
    pub(crate) layout: Option<SnapshotLayout>,
    pub(crate) commit_count: AtomicU64,
    pub(crate) save_count: AtomicU64,
    /// Bumped under the state write lock whenever the committed state changes
    pub(crate) generation: AtomicU64,
    /// `generation` captured by the last completed save
    pub(crate) last_saved_generation: AtomicU64,
}

impl Agent {
    /// Open an agent backed by the usearch HNSW store, loading the newest
    /// usable snapshot from `config.index_path` unless in memory mode.
    pub fn open(config: AgentConfig) -> Result<Self, AgentError> {
        config.validate()?;
        let store = HnswStore::new(config.hnsw_config()).map_err(AgentError::internal)?;
        Self::open_with_store(config, Box::new(store))
    }

    /// Open an agent over a caller-supplied store.
    pub fn open_with_store(
        config: AgentConfig,
        mut store: Box<dyn VectorStore>,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        if store.dimension() != config.dimension {
            return Err(AgentError::Config(format!(
                "store dimension {} does not match configured dimension {}",
                store.dimension(),
                config.dimension
            )));
        }

        let (layout, idmap) = if config.in_memory {
            (None, IdMap::new())
        } else {
            let layout = SnapshotLayout::new(&config.index_path);
            fs::create_dir_all(layout.base()).map_err(AgentError::internal)?;
            layout.clean_staging().map_err(AgentError::internal)?;
            let idmap = layout
                .load_into(store.as_mut(), config.broken_index_history_limit)
                .map_err(AgentError::internal)?
                .unwrap_or_default();
            (Some(layout), idmap)
        };

        info!(
            name = %config.name,
            dimension = config.dimension,
            in_memory = config.in_memory,
            copy_on_write = config.copy_on_write,
            stored = idmap.len(),
            "Agent opened"
        );

        Ok(Self {
            config,
            queue: VectorQueue::new(),
            state: RwLock::new(IndexState { store, idmap }),
            coordinator: LifecycleCoordinator::new(),
            layout,
            commit_count: AtomicU64::new(0),
            save_count: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            // Whatever is on disk matches the state just loaded
            last_saved_generation: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &LifecycleCoordinator {
        &self.coordinator
    }

    /// Number of pending operations.
    pub fn uncommitted(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn location(&self, id: &str) -> Location {
        Location {
            name: self.config.name.clone(),
            uuid: id.to_string(),
            ips: self.config.ips.clone(),
        }
    }

    pub fn index_info(&self) -> IndexInfo {
        let lifecycle = self.coordinator.snapshot();
        let stored = self.state.read().idmap.len();
        IndexInfo {
            stored,
            uncommitted: self.queue.len(),
            indexing: lifecycle.indexing,
            saving: lifecycle.saving,
            commit_count: self.commit_count.load(Ordering::SeqCst),
            save_count: self.save_count.load(Ordering::SeqCst),
            dimension: self.config.dimension,
            in_memory: self.config.in_memory,
        }
    }

    /// Discard every pending operation and every committed record.
    ///
    /// Waits for a running commit or save, then blocks all other activity
    /// until done. Outside memory mode an empty snapshot is written so a
    /// restart does not resurrect the old data.
    pub fn flush(&self, cancel: &CancellationToken) -> Result<IndexInfo, AgentError> {
        let _flush = self.coordinator.try_begin_flush(cancel)?;
        let discarded = self.queue.drain().len();

        let mut state = self.state.write();
        let removed = state.idmap.len();
        state.store.clear().map_err(AgentError::internal)?;
        state.idmap.clear();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(layout) = &self.layout {
            layout
                .write(state.store.as_ref(), &state.idmap, self.config.copy_on_write)
                .map_err(AgentError::internal)?;
            self.last_saved_generation.store(generation, Ordering::SeqCst);
        }
        drop(state);

        info!(removed, discarded, "Index flushed");
        Ok(IndexInfo {
            stored: 0,
            uncommitted: 0,
            dimension: self.config.dimension,
            in_memory: self.config.in_memory,
            commit_count: self.commit_count.load(Ordering::SeqCst),
            save_count: self.save_count.load(Ordering::SeqCst),
            ..Default::default()
        })
    }
}
