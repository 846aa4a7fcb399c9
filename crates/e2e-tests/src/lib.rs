//! End-to-end test infrastructure for the ANN agent.
//!
//! Provides a shared TestHarness that owns a snapshot directory and an
//! agent opened on it, a gRPC harness serving that agent, and helpers for
//! generating and loading vectors.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tonic::transport::Channel;

use ann_index::{Agent, AgentConfig};
use ann_service::pb::agent_client::AgentClient;
use ann_service::run_server_with_shutdown;
use ann_types::{DistanceType, InsertConfig};

/// Shared test harness for E2E tests.
///
/// The agent uses L2 distance so stored vectors read back exactly.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Snapshot directory of the agent
    pub index_path: PathBuf,
    pub dimension: usize,
    pub agent: Arc<Agent>,
}

impl TestHarness {
    /// Persistent agent with in-place saves.
    pub fn new(dimension: usize) -> Self {
        Self::with_config(dimension, |config| config)
    }

    /// Persistent agent whose config is adjusted by `tweak`.
    pub fn with_config<F>(dimension: usize, tweak: F) -> Self
    where
        F: FnOnce(AgentConfig) -> AgentConfig,
    {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let index_path = temp_dir.path().join("index");
        let config = tweak(Self::base_config(dimension, index_path.clone()));
        let agent = Arc::new(Agent::open(config).expect("Failed to open agent"));

        Self {
            _temp_dir: temp_dir,
            index_path,
            dimension,
            agent,
        }
    }

    fn base_config(dimension: usize, index_path: PathBuf) -> AgentConfig {
        AgentConfig::new(dimension)
            .with_index_path(index_path)
            .with_distance(DistanceType::L2)
    }

    /// Open a second agent on the same directory, as a restart would.
    ///
    /// The caller should drop or stop using the first agent.
    pub fn reopen<F>(&self, tweak: F) -> Agent
    where
        F: FnOnce(AgentConfig) -> AgentConfig,
    {
        let config = tweak(Self::base_config(self.dimension, self.index_path.clone()));
        Agent::open(config).expect("Failed to reopen agent")
    }

    /// Insert `count` seeded random vectors with ids `{prefix}-{i}`.
    pub fn insert_random(&self, prefix: &str, count: usize, seed: u64) -> Vec<(String, Vec<f32>)> {
        let records: Vec<(String, Vec<f32>)> = random_vectors(count, self.dimension, seed)
            .into_iter()
            .enumerate()
            .map(|(i, v)| (format!("{}-{}", prefix, i), v))
            .collect();
        for (id, vector) in &records {
            self.agent
                .insert(id, vector.clone(), &InsertConfig::default())
                .expect("Failed to insert");
        }
        records
    }
}

/// `count` vectors of `dimension` floats in [0, 1), reproducible from `seed`.
pub fn random_vectors(count: usize, dimension: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dimension).map(|_| rng.random::<f32>()).collect())
        .collect()
}

/// A gRPC server serving one agent, shut down on drop.
pub struct GrpcHarness {
    pub harness: TestHarness,
    pub endpoint: String,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl GrpcHarness {
    /// Serve `harness.agent` on 127.0.0.1:`port`.
    pub async fn start(harness: TestHarness, port: u16) -> Self {
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let agent = harness.agent.clone();
        tokio::spawn(async move {
            run_server_with_shutdown(addr, agent, None, async {
                shutdown_rx.await.ok();
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        Self {
            harness,
            endpoint: format!("http://127.0.0.1:{}", port),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Connect a client, retrying while the server comes up.
    pub async fn client(&self) -> AgentClient<Channel> {
        for _ in 0..5 {
            match AgentClient::connect(self.endpoint.clone()).await {
                Ok(client) => return client,
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
        panic!("Failed to connect to server at {}", self.endpoint);
    }
}

impl Drop for GrpcHarness {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
