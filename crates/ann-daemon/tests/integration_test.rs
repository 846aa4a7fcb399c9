//! Integration tests for the daemon's index commands against a live server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::sleep;

use ann_daemon::{handle_index, IndexCommands};
use ann_index::{Agent, AgentConfig};
use ann_scheduler::JobRegistry;
use ann_service::run_server_with_shutdown;
use ann_types::InsertConfig;

/// Test harness that manages a server for one agent.
struct TestHarness {
    temp_dir: TempDir,
    agent: Arc<Agent>,
    endpoint: String,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestHarness {
    async fn new(port: u16) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let agent = Arc::new(
            Agent::open(AgentConfig::new(4).with_index_path(temp_dir.path()))
                .expect("Failed to open agent"),
        );
        let registry = Arc::new(JobRegistry::new());
        registry.register("auto-save", "every 60s");

        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let server_agent = agent.clone();
        tokio::spawn(async move {
            run_server_with_shutdown(addr, server_agent, Some(registry), async {
                shutdown_rx.await.ok();
            })
            .await
        });

        sleep(Duration::from_millis(200)).await;

        Self {
            temp_dir,
            agent,
            endpoint: format!("http://127.0.0.1:{}", port),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    fn fill(&self, n: usize) {
        for i in 0..n {
            self.agent
                .insert(
                    &format!("vec-{}", i),
                    vec![i as f32, 0.5, 0.25, 1.0],
                    &InsertConfig::default(),
                )
                .unwrap();
        }
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_index_commit_and_save_commands() {
    let harness = TestHarness::new(50210).await;
    harness.fill(6);

    handle_index(&harness.endpoint, IndexCommands::Commit { pool_size: 2 })
        .await
        .unwrap();
    assert_eq!(harness.agent.uncommitted(), 0);
    assert_eq!(harness.agent.index_info().stored, 6);

    handle_index(&harness.endpoint, IndexCommands::Save)
        .await
        .unwrap();
    assert!(harness
        .temp_dir
        .path()
        .join("origin")
        .join("metadata.json")
        .exists());

    handle_index(&harness.endpoint, IndexCommands::Info)
        .await
        .unwrap();
    handle_index(&harness.endpoint, IndexCommands::Jobs)
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_index_commit_with_empty_queue_fails() {
    let harness = TestHarness::new(50211).await;
    let result = handle_index(&harness.endpoint, IndexCommands::Commit { pool_size: 0 }).await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_index_flush_command() {
    let harness = TestHarness::new(50212).await;
    harness.fill(3);
    handle_index(&harness.endpoint, IndexCommands::CommitAndSave { pool_size: 0 })
        .await
        .unwrap();
    assert_eq!(harness.agent.index_info().stored, 3);

    handle_index(&harness.endpoint, IndexCommands::Flush)
        .await
        .unwrap();
    let info = harness.agent.index_info();
    assert_eq!(info.stored, 0);
    assert_eq!(info.uncommitted, 0);
}

#[tokio::test]
async fn test_index_command_unreachable_endpoint() {
    let result = handle_index("http://127.0.0.1:1", IndexCommands::Info).await;
    assert!(result.is_err());
}
