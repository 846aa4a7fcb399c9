//! Point lookups, similarity search, listing and timestamp-based removal.
//!
//! Point lookups see pending operations first so a caller reads its own
//! writes. Similarity search only sees committed records.

use ann_types::{
    AgentError, Location, Neighbor, ObjectMeta, RemoveConfig, SearchConfig, TimestampPredicate,
    VectorRecord,
};
use ann_vector::{StoreHit, VectorStore};
use tracing::{debug, info};

use crate::agent::{Agent, IndexState};

impl Agent {
    /// True if the id is pending (not as a delete) or committed without a
    /// pending delete.
    pub fn exists(&self, id: &str) -> bool {
        !id.is_empty() && self.exists_inner(id)
    }

    pub(crate) fn exists_inner(&self, id: &str) -> bool {
        match self.queue.peek(id) {
            Some(op) => !op.is_delete(),
            None => self.state.read().idmap.contains(id),
        }
    }

    /// Latest value for `id`, pending or committed.
    pub fn get_object(&self, id: &str) -> Result<VectorRecord, AgentError> {
        if id.is_empty() {
            return Err(AgentError::EmptyId);
        }
        if let Some(op) = self.queue.peek(id) {
            return op
                .to_record()
                .ok_or_else(|| AgentError::ObjectNotFound { id: id.to_string() });
        }

        let state = self.state.read();
        let entry = state
            .idmap
            .get(id)
            .ok_or_else(|| AgentError::ObjectNotFound { id: id.to_string() })?;
        let vector = state
            .store
            .get(entry.handle)
            .map_err(AgentError::internal)?
            .ok_or_else(|| AgentError::ObjectNotFound { id: id.to_string() })?;
        Ok(VectorRecord {
            id: id.to_string(),
            vector,
            timestamp: entry.timestamp,
        })
    }

    /// Id and timestamp of the latest value for `id`.
    pub fn get_object_meta(&self, id: &str) -> Result<ObjectMeta, AgentError> {
        if id.is_empty() {
            return Err(AgentError::EmptyId);
        }
        if let Some(op) = self.queue.peek(id) {
            if op.is_delete() {
                return Err(AgentError::ObjectNotFound { id: id.to_string() });
            }
            return Ok(ObjectMeta {
                id: op.id,
                timestamp: op.timestamp,
            });
        }
        self.state
            .read()
            .idmap
            .get(id)
            .map(|entry| ObjectMeta {
                id: id.to_string(),
                timestamp: entry.timestamp,
            })
            .ok_or_else(|| AgentError::ObjectNotFound { id: id.to_string() })
    }

    /// Approximate k-NN over committed records.
    pub fn search(
        &self,
        query: &[f32],
        config: &SearchConfig,
    ) -> Result<Vec<Neighbor>, AgentError> {
        self.run_search(query, config, |store, q, k| store.search(q, k))
    }

    /// Exact k-NN over committed records.
    pub fn linear_search(
        &self,
        query: &[f32],
        config: &SearchConfig,
    ) -> Result<Vec<Neighbor>, AgentError> {
        self.run_search(query, config, |store, q, k| store.linear_search(q, k))
    }

    /// Approximate k-NN using the stored vector of `id` as the query.
    pub fn search_by_id(
        &self,
        id: &str,
        config: &SearchConfig,
    ) -> Result<Vec<Neighbor>, AgentError> {
        let record = self.get_object(id)?;
        self.search(&record.vector, config)
    }

    pub fn linear_search_by_id(
        &self,
        id: &str,
        config: &SearchConfig,
    ) -> Result<Vec<Neighbor>, AgentError> {
        let record = self.get_object(id)?;
        self.linear_search(&record.vector, config)
    }

    fn run_search<F>(
        &self,
        query: &[f32],
        config: &SearchConfig,
        search: F,
    ) -> Result<Vec<Neighbor>, AgentError>
    where
        F: FnOnce(&dyn VectorStore, &[f32], usize) -> Result<Vec<StoreHit>, ann_vector::VectorError>,
    {
        if query.len() != self.config.dimension {
            return Err(AgentError::InvalidDimension {
                id: config.request_id.clone(),
                expected: self.config.dimension,
                actual: query.len(),
            });
        }
        if config.num == 0 {
            return Err(AgentError::InvalidArgument(
                "search result size must be greater than 0".to_string(),
            ));
        }

        let lifecycle = self.coordinator.snapshot();
        if lifecycle.flushing {
            return Err(AgentError::FlushingInProgress);
        }
        if lifecycle.indexing {
            return Err(AgentError::CommitInProgress);
        }

        let neighbors = {
            let state = self.state.read();
            let hits = search(state.store.as_ref(), query, config.num as usize)
                .map_err(AgentError::internal)?;
            to_neighbors(&state, hits, config.radius)
        };

        let required = config.min_num.max(self.config.min_search_results) as usize;
        if neighbors.is_empty() {
            return Err(AgentError::EmptySearchResult);
        }
        if neighbors.len() < required {
            return Err(AgentError::InsufficientSearchResult {
                got: neighbors.len(),
                required,
            });
        }
        debug!(request_id = %config.request_id, results = neighbors.len(), "Search finished");
        Ok(neighbors)
    }

    /// Every committed record in id order. Ids with a pending delete are
    /// left out; pending inserts and updates appear once committed.
    pub fn list_objects(&self) -> Result<Vec<VectorRecord>, AgentError> {
        let state = self.state.read();
        let mut records = Vec::with_capacity(state.idmap.len());
        for (id, entry) in state.idmap.entries() {
            if self.queue.peek(&id).is_some_and(|op| op.is_delete()) {
                continue;
            }
            let Some(vector) = state.store.get(entry.handle).map_err(AgentError::internal)? else {
                continue;
            };
            records.push(VectorRecord {
                id,
                vector,
                timestamp: entry.timestamp,
            });
        }
        Ok(records)
    }

    /// Remove every committed record whose timestamp satisfies all
    /// `predicates`.
    ///
    /// Fails with `NotFound` if nothing matched. If some removals fail, the
    /// joined error is returned.
    pub fn remove_by_timestamp(
        &self,
        predicates: &[TimestampPredicate],
    ) -> Result<Vec<Location>, AgentError> {
        let targets: Vec<String> = self
            .state
            .read()
            .idmap
            .entries()
            .into_iter()
            .filter(|(_, entry)| TimestampPredicate::all_match(predicates, entry.timestamp))
            .map(|(id, _)| id)
            .filter(|id| !self.queue.peek(id).is_some_and(|op| op.is_delete()))
            .collect();

        let mut locations = Vec::with_capacity(targets.len());
        let mut errors = Vec::new();
        for id in &targets {
            match self.remove(id, &RemoveConfig::default()) {
                Ok(location) => locations.push(location),
                Err(e) => errors.push(e),
            }
        }

        if let Some(err) = AgentError::join(errors) {
            return Err(err);
        }
        if locations.is_empty() {
            return Err(AgentError::RemoveTargetNotFound);
        }
        info!(removed = locations.len(), "Removed records by timestamp");
        Ok(locations)
    }
}

fn to_neighbors(state: &IndexState, hits: Vec<StoreHit>, radius: f32) -> Vec<Neighbor> {
    hits.into_iter()
        .filter(|hit| radius <= 0.0 || hit.distance <= radius)
        .filter_map(|hit| {
            state.idmap.id_of(hit.handle).map(|id| Neighbor {
                id: id.to_string(),
                distance: hit.distance,
            })
        })
        .collect()
}
