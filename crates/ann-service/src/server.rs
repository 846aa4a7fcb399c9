//! gRPC server setup with health check and reflection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use ann_index::Agent;
use ann_scheduler::JobRegistry;
use tonic::transport::Server;
use tonic_health::server::health_reporter;
use tonic_reflection::server::Builder as ReflectionBuilder;
use tracing::info;

use crate::handler::AgentServiceImpl;
use crate::pb::{agent_server::AgentServer, FILE_DESCRIPTOR_SET};

/// Serve `agent` on `addr` until the process exits.
pub async fn run_server(
    addr: SocketAddr,
    agent: Arc<Agent>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    run_server_with_shutdown(addr, agent, None, std::future::pending()).await
}

/// Serve `agent` on `addr` until `shutdown_signal` resolves.
///
/// When `registry` is given, GetSchedulerStatus reports its jobs.
pub async fn run_server_with_shutdown<F>(
    addr: SocketAddr,
    agent: Arc<Agent>,
    registry: Option<Arc<JobRegistry>>,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Starting gRPC server on {}", addr);

    let (mut health_reporter, health_service) = health_reporter();
    health_reporter
        .set_serving::<AgentServer<AgentServiceImpl>>()
        .await;

    let reflection_service = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let service = match registry {
        Some(registry) => AgentServiceImpl::with_registry(agent, registry),
        None => AgentServiceImpl::new(agent),
    };

    info!("gRPC server ready on {}", addr);

    Server::builder()
        .add_service(health_service)
        .add_service(reflection_service)
        .add_service(AgentServer::new(service))
        .serve_with_shutdown(addr, shutdown_signal)
        .await?;

    info!("gRPC server shutdown complete");
    Ok(())
}
