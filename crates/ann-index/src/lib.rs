//! Vector index lifecycle manager for the ANN agent.
//!
//! This crate buffers mutations, merges them into the committed store,
//! snapshots the store to disk and arbitrates between those activities while
//! reads and further writes keep arriving.
//!
//! ## Key Components
//!
//! - [`Agent`]: facade owning the queue, the committed state and the coordinator
//! - [`LifecycleCoordinator`]: flush, commit and save exclusion plus status flags
//! - [`SnapshotLayout`]: on-disk snapshot directories and metadata
//! - [`AgentConfig`]: per-agent settings derived from [`ann_types::Settings`]
//!
//! ## Flow
//!
//! 1. Insert/Update/Upsert/Remove validate and push into the queue
//! 2. `commit` applies queued operations to the store and id map in batches
//! 3. `save` writes the committed state, in place or copy-on-write
//! 4. `flush` resets everything while other activity fails fast
//!
//! ```ignore
//! use ann_index::{Agent, AgentConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let agent = Agent::open(AgentConfig::new(3).with_index_path("/var/lib/ann"))?;
//! agent.insert("a", vec![1.0, 2.0, 3.0], &Default::default())?;
//! agent.commit_and_save(&CancellationToken::new(), 0)?;
//! ```

mod agent;
mod committer;
pub mod config;
pub mod coordinator;
mod mutation;
mod persister;
mod read_path;
pub mod snapshot;

pub use agent::Agent;
pub use committer::CommitStats;
pub use config::AgentConfig;
pub use coordinator::{LifecycleCoordinator, LifecycleSnapshot};
pub use mutation::BatchOutcome;
pub use snapshot::{SnapshotLayout, SnapshotMetadata};
