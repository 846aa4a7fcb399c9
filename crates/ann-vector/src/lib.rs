//! # ann-vector
//!
//! Storage primitives under the ANN agent's index lifecycle.
//!
//! - [`VectorStore`]: the committed ANN graph (usearch HNSW via [`HnswStore`])
//! - [`IdMap`]: bidirectional mapping between external ids and store handles
//! - [`VectorQueue`]: not-yet-committed operations, one per id

pub mod error;
pub mod hnsw;
pub mod idmap;
pub mod queue;
pub mod store;

pub use error::VectorError;
pub use hnsw::{HnswConfig, HnswStore, INDEX_FILE_NAME};
pub use idmap::{IdEntry, IdMap, IDMAP_FILE_NAME};
pub use queue::{QueuedOperation, VectorQueue};
pub use store::{StoreHit, VectorStore};
