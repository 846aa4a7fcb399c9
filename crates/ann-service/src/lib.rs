//! gRPC service for the ANN agent.
//!
//! Provides:
//! - Mutation, lookup and search RPCs backed by one [`ann_index::Agent`]
//! - Index lifecycle RPCs: CreateIndex, SaveIndex, CreateAndSaveIndex, Flush
//! - Scheduler status for the background index jobs
//! - Health check and reflection endpoints

mod convert;
pub mod handler;
pub mod server;
pub mod status;

pub mod pb {
    tonic::include_proto!("ann");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("agent_descriptor");
}

pub use handler::AgentServiceImpl;
pub use server::{run_server, run_server_with_shutdown};
pub use status::to_status;
