//! Vector store trait and types.
//!
//! A store holds committed vectors under numeric handles. It knows nothing
//! about external ids; that is the [`crate::IdMap`]'s job.

use std::path::Path;

use crate::error::VectorError;

/// One nearest-neighbor hit from a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreHit {
    pub handle: u64,
    /// Smaller is nearer
    pub distance: f32,
}

impl StoreHit {
    pub fn new(handle: u64, distance: f32) -> Self {
        Self { handle, distance }
    }
}

/// Trait for committed vector stores.
///
/// Implementations must be thread-safe for concurrent read access. Callers
/// serialize mutation through `&mut self`.
pub trait VectorStore: Send + Sync {
    /// Get the configured dimension
    fn dimension(&self) -> usize;

    /// Get the number of stored vectors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add vectors in one bulk operation. Existing handles are replaced.
    fn add_batch(&mut self, vectors: &[(u64, &[f32])]) -> Result<(), VectorError>;

    /// Remove a vector by handle. Returns false if it was absent.
    fn remove(&mut self, handle: u64) -> Result<bool, VectorError>;

    fn contains(&self, handle: u64) -> bool;

    /// Read back a stored vector.
    fn get(&self, handle: u64) -> Result<Option<Vec<f32>>, VectorError>;

    /// Approximate k nearest neighbors, nearest first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<StoreHit>, VectorError>;

    /// Exact k nearest neighbors by scanning every stored vector.
    fn linear_search(&self, query: &[f32], k: usize) -> Result<Vec<StoreHit>, VectorError>;

    /// Stored handles in ascending order.
    fn handles(&self) -> Vec<u64>;

    /// Write the graph into `dir`.
    fn save(&self, dir: &Path) -> Result<(), VectorError>;

    /// Replace the contents with the graph saved in `dir`.
    ///
    /// `expected` lists the handles the caller's id map refers to; every
    /// one of them must be present in the loaded graph.
    fn load(&mut self, dir: &Path, expected: &[u64]) -> Result<(), VectorError>;

    /// Drop every vector.
    fn clear(&mut self) -> Result<(), VectorError>;
}
