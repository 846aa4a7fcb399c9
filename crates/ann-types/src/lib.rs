//! # ann-types
//!
//! Shared domain types for the ANN agent.
//!
//! This crate defines the data structures passed between the index
//! lifecycle manager, the gRPC surface and the daemon:
//! - Records: committed vectors and pending queue operations
//! - Request configs: per-call existence-check and timestamp options
//! - Errors: the closed [`AgentError`] enum and its [`ErrorKind`]
//! - Settings: layered agent configuration

pub mod config;
pub mod error;
pub mod record;
pub mod request;

pub use config::{DistanceType, Settings};
pub use error::{AgentError, ErrorKind};
pub use record::{
    now_nanos, resolve_timestamp, ExistenceCheck, IndexInfo, Location, Neighbor, ObjectMeta,
    OpKind, PendingOperation, VectorRecord,
};
pub use request::{
    InsertConfig, InsertRequest, RemoveConfig, RemoveRequest, SearchConfig, TimestampOp,
    TimestampPredicate, UpdateConfig, UpdateRequest, UpsertConfig, UpsertRequest,
};
