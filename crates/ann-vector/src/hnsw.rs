//! HNSW vector store using usearch.
//!
//! Defaults favor recall over build speed:
//! - M = 16 (connections per layer)
//! - ef_construction = 128
//! - ef_search = 64

use std::collections::BTreeSet;
use std::path::Path;

use ann_types::DistanceType;
use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::VectorError;
use crate::store::{StoreHit, VectorStore};

/// File name of the serialized graph inside a snapshot directory.
pub const INDEX_FILE_NAME: &str = "index.usearch";

/// HNSW store configuration
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Vector dimension
    pub dimension: usize,
    pub distance: DistanceType,
    /// Number of connections per layer (M parameter)
    pub connectivity: usize,
    /// Build-time search depth (ef_construction)
    pub expansion_add: usize,
    /// Query-time search depth (ef_search)
    pub expansion_search: usize,
    /// Initial reservation; the store grows past it on demand
    pub capacity: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            dimension: 3,
            distance: DistanceType::Cos,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            capacity: 10_000,
        }
    }
}

impl HnswConfig {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    pub fn with_distance(mut self, distance: DistanceType) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_connectivity(mut self, m: usize) -> Self {
        self.connectivity = m;
        self
    }

    pub fn with_expansion(mut self, ef_add: usize, ef_search: usize) -> Self {
        self.expansion_add = ef_add;
        self.expansion_search = ef_search;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    fn metric(&self) -> MetricKind {
        match self.distance {
            DistanceType::L2 => MetricKind::L2sq,
            DistanceType::Ip => MetricKind::IP,
            DistanceType::Cos => MetricKind::Cos,
        }
    }

    fn index_options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimension,
            metric: self.metric(),
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false, // Single vector per handle
        }
    }

    fn new_index(&self) -> Result<Index, VectorError> {
        let index = Index::new(&self.index_options()).map_err(|e| VectorError::Index(e.to_string()))?;
        index
            .reserve(self.capacity.max(1))
            .map_err(|e| VectorError::Index(e.to_string()))?;
        Ok(index)
    }

    /// Distance between two vectors under the configured metric, matching
    /// what the graph reports.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.distance {
            DistanceType::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            DistanceType::Ip => 1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
            DistanceType::Cos => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if na == 0.0 || nb == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (na * nb)
                }
            }
        }
    }
}

/// HNSW store wrapper around usearch.
pub struct HnswStore {
    index: Index,
    config: HnswConfig,
    handles: BTreeSet<u64>,
}

impl HnswStore {
    /// Create an empty store.
    pub fn new(config: HnswConfig) -> Result<Self, VectorError> {
        info!(dim = config.dimension, distance = ?config.distance, "Creating vector store");
        let index = config.new_index()?;
        Ok(Self {
            index,
            config,
            handles: BTreeSet::new(),
        })
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn ensure_capacity(&self, additional: usize) -> Result<(), VectorError> {
        let needed = self.index.size() + additional;
        let capacity = self.index.capacity();
        if needed > capacity {
            let target = needed.max(capacity * 2);
            debug!(capacity, target, "Growing vector store");
            self.index
                .reserve(target)
                .map_err(|e| VectorError::Index(e.to_string()))?;
        }
        Ok(())
    }
}

fn path_str(path: &Path) -> Result<&str, VectorError> {
    path.to_str()
        .ok_or_else(|| VectorError::Index("Invalid path encoding".to_string()))
}

impl VectorStore for HnswStore {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn len(&self) -> usize {
        self.handles.len()
    }

    fn add_batch(&mut self, vectors: &[(u64, &[f32])]) -> Result<(), VectorError> {
        for (_, vector) in vectors {
            self.check_dimension(vector)?;
        }
        self.ensure_capacity(vectors.len())?;

        for (handle, vector) in vectors {
            if self.handles.remove(handle) {
                self.index
                    .remove(*handle)
                    .map_err(|e| VectorError::Index(e.to_string()))?;
            }
            self.index
                .add(*handle, *vector)
                .map_err(|e| VectorError::Index(e.to_string()))?;
            self.handles.insert(*handle);
        }

        debug!(count = vectors.len(), "Added vectors");
        Ok(())
    }

    fn remove(&mut self, handle: u64) -> Result<bool, VectorError> {
        if !self.handles.remove(&handle) {
            return Ok(false);
        }
        let removed = self
            .index
            .remove(handle)
            .map_err(|e| VectorError::Index(e.to_string()))?;
        Ok(removed > 0)
    }

    fn contains(&self, handle: u64) -> bool {
        self.handles.contains(&handle)
    }

    fn get(&self, handle: u64) -> Result<Option<Vec<f32>>, VectorError> {
        if !self.handles.contains(&handle) {
            return Ok(None);
        }
        let mut buffer = vec![0f32; self.config.dimension];
        let found = self
            .index
            .get(handle, &mut buffer)
            .map_err(|e| VectorError::Index(e.to_string()))?;
        Ok((found > 0).then_some(buffer))
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<StoreHit>, VectorError> {
        self.check_dimension(query)?;
        if self.handles.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let results = self
            .index
            .search(query, k)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        let hits: Vec<StoreHit> = results
            .keys
            .iter()
            .zip(results.distances.iter())
            .map(|(&handle, &distance)| StoreHit::new(handle, distance))
            .collect();

        debug!(k, found = hits.len(), "Search complete");
        Ok(hits)
    }

    fn linear_search(&self, query: &[f32], k: usize) -> Result<Vec<StoreHit>, VectorError> {
        self.check_dimension(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits = Vec::with_capacity(self.handles.len());
        for &handle in &self.handles {
            if let Some(vector) = self.get(handle)? {
                hits.push(StoreHit::new(handle, self.config.distance(query, &vector)));
            }
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);

        debug!(k, found = hits.len(), "Linear search complete");
        Ok(hits)
    }

    fn handles(&self) -> Vec<u64> {
        self.handles.iter().copied().collect()
    }

    fn save(&self, dir: &Path) -> Result<(), VectorError> {
        let path = dir.join(INDEX_FILE_NAME);
        self.index
            .save(path_str(&path)?)
            .map_err(|e| VectorError::Index(format!("Failed to save: {}", e)))?;

        debug!(path = ?path, vectors = self.handles.len(), "Saved vector store");
        Ok(())
    }

    fn load(&mut self, dir: &Path, expected: &[u64]) -> Result<(), VectorError> {
        let path = dir.join(INDEX_FILE_NAME);
        let index =
            Index::new(&self.config.index_options()).map_err(|e| VectorError::Index(e.to_string()))?;
        index
            .load(path_str(&path)?)
            .map_err(|e| VectorError::Index(format!("Failed to load: {}", e)))?;

        if index.dimensions() != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual: index.dimensions(),
            });
        }
        if index.size() != expected.len() {
            return Err(VectorError::Corrupted(format!(
                "graph holds {} vectors, id map expects {}",
                index.size(),
                expected.len()
            )));
        }
        if let Some(missing) = expected.iter().find(|h| !index.contains(**h)) {
            return Err(VectorError::Corrupted(format!(
                "handle {} missing from graph",
                missing
            )));
        }

        self.index = index;
        self.handles = expected.iter().copied().collect();
        info!(path = ?path, vectors = self.handles.len(), "Loaded vector store");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), VectorError> {
        self.index = self.config.new_index()?;
        self.handles.clear();
        info!("Cleared vector store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn random_vector(dim: usize) -> Vec<f32> {
        use rand::Rng;
        let mut rng = rand::rng();
        (0..dim).map(|_| rng.random()).collect()
    }

    #[test]
    fn test_create_store() {
        let store = HnswStore::new(HnswConfig::new(8)).unwrap();
        assert_eq!(store.dimension(), 8);
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_get_and_search() {
        let config = HnswConfig::new(4)
            .with_distance(DistanceType::L2)
            .with_capacity(2);
        let mut store = HnswStore::new(config).unwrap();
        let vectors: Vec<Vec<f32>> = (0..10).map(|_| random_vector(4)).collect();
        let batch: Vec<(u64, &[f32])> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i as u64, v.as_slice()))
            .collect();

        // Grows past the initial reservation
        store.add_batch(&batch).unwrap();
        assert_eq!(store.len(), 10);
        assert_eq!(store.get(3).unwrap(), Some(vectors[3].clone()));
        assert_eq!(store.get(99).unwrap(), None);

        let hits = store.search(&vectors[0], 5).unwrap();
        assert_eq!(hits.len(), 5);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_linear_search_is_exact() {
        let mut store =
            HnswStore::new(HnswConfig::new(2).with_distance(DistanceType::L2)).unwrap();
        let a = [0.0f32, 0.0];
        let b = [1.0f32, 0.0];
        let c = [5.0f32, 5.0];
        store
            .add_batch(&[(1, &a[..]), (2, &b[..]), (3, &c[..])])
            .unwrap();

        let hits = store.linear_search(&[0.9, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].handle, 2);
        assert_eq!(hits[1].handle, 1);
        assert!((hits[0].distance - 0.01).abs() < 1e-5);
    }

    #[test]
    fn test_replace_existing_handle() {
        let mut store =
            HnswStore::new(HnswConfig::new(2).with_distance(DistanceType::L2)).unwrap();
        store.add_batch(&[(7, &[1.0, 0.0][..])]).unwrap();
        store.add_batch(&[(7, &[0.0, 1.0][..])]).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(7).unwrap(), Some(vec![0.0, 1.0]));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut store = HnswStore::new(HnswConfig::new(4)).unwrap();
        let short = random_vector(3);
        let result = store.add_batch(&[(0, short.as_slice())]);
        assert!(matches!(result, Err(VectorError::DimensionMismatch { .. })));
        assert!(store.is_empty());

        let result = store.search(&short, 1);
        assert!(matches!(result, Err(VectorError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_remove() {
        let mut store = HnswStore::new(HnswConfig::new(4)).unwrap();
        let v = random_vector(4);
        store.add_batch(&[(42, v.as_slice())]).unwrap();
        assert!(store.contains(42));

        assert!(store.remove(42).unwrap());
        assert!(!store.contains(42));
        assert!(!store.remove(42).unwrap());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let config = HnswConfig::new(4).with_distance(DistanceType::L2);
        let vectors: Vec<Vec<f32>> = (0..5).map(|_| random_vector(4)).collect();

        {
            let mut store = HnswStore::new(config.clone()).unwrap();
            let batch: Vec<(u64, &[f32])> = vectors
                .iter()
                .enumerate()
                .map(|(i, v)| (i as u64 + 10, v.as_slice()))
                .collect();
            store.add_batch(&batch).unwrap();
            store.save(temp.path()).unwrap();
        }

        let mut store = HnswStore::new(config).unwrap();
        store.load(temp.path(), &[10, 11, 12, 13, 14]).unwrap();
        assert_eq!(store.len(), 5);
        assert_eq!(store.get(12).unwrap(), Some(vectors[2].clone()));
        assert_eq!(store.handles(), vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn test_load_rejects_mismatched_handles() {
        let temp = TempDir::new().unwrap();
        let config = HnswConfig::new(4);
        let mut store = HnswStore::new(config.clone()).unwrap();
        let v = random_vector(4);
        store.add_batch(&[(1, v.as_slice())]).unwrap();
        store.save(temp.path()).unwrap();

        let mut other = HnswStore::new(config).unwrap();
        let result = other.load(temp.path(), &[2]);
        assert!(matches!(result, Err(VectorError::Corrupted(_))));
        assert!(other.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut store = HnswStore::new(HnswConfig::new(4)).unwrap();
        let v = random_vector(4);
        store.add_batch(&[(1, v.as_slice())]).unwrap();
        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(!store.contains(1));
    }
}
