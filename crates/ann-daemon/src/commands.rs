//! Command implementations for the ANN agent daemon.
//!
//! Handles:
//! - start: load config, open the agent, schedule index jobs, serve gRPC
//! - stop: signal the running daemon via its PID file
//! - status: check whether the daemon is running
//! - index: drive a running agent through its gRPC client
//! - config: print the effective settings

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ann_index::{Agent, AgentConfig};
use ann_scheduler::jobs::{create_index_jobs, IndexJobsConfig};
use ann_scheduler::{SchedulerConfig, SchedulerService};
use ann_service::pb::{self, agent_client::AgentClient};
use ann_service::run_server_with_shutdown;
use ann_types::{ErrorKind, Settings};

use crate::cli::{IndexCommands, StartArgs};

/// Get the PID file path
fn pid_file_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| {
            #[cfg(unix)]
            {
                dirs.runtime_dir()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| dirs.cache_dir().to_path_buf())
            }
            #[cfg(not(unix))]
            {
                dirs.cache_dir().to_path_buf()
            }
        })
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("ann-agent")
        .join("daemon.pid")
}

fn write_pid_file() -> Result<()> {
    let pid_path = pid_file_path();
    if let Some(parent) = pid_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&pid_path, std::process::id().to_string())?;
    info!("Wrote PID file: {:?}", pid_path);
    Ok(())
}

fn remove_pid_file() {
    let pid_path = pid_file_path();
    if pid_path.exists() {
        if let Err(e) = fs::remove_file(&pid_path) {
            warn!("Failed to remove PID file: {}", e);
        } else {
            info!("Removed PID file");
        }
    }
}

fn read_pid_file() -> Option<u32> {
    fs::read_to_string(pid_file_path())
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    // Signal 0 only checks that the process exists
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}

/// Load settings and apply `start` overrides on top.
fn load_settings(
    config_path: Option<&str>,
    args: &StartArgs,
    log_level_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        settings.grpc_port = port;
    }
    if let Some(index_path) = &args.index_path {
        settings.index_path = index_path.clone();
    }
    if args.in_memory {
        settings.in_memory = true;
    }
    if let Some(dimension) = args.dimension {
        settings.dimension = dimension;
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Commit whatever is still queued and write a final snapshot.
async fn final_commit_and_save(agent: Arc<Agent>, pool_size: u32) {
    let result = tokio::task::spawn_blocking(move || {
        agent.commit_and_save(&CancellationToken::new(), pool_size)
    })
    .await;
    match result {
        Ok(Ok(())) => info!("Final snapshot written"),
        Ok(Err(e)) if e.kind() == ErrorKind::Aborted => {
            warn!("Final snapshot skipped: {}", e)
        }
        Ok(Err(e)) => warn!("Final snapshot failed: {}", e),
        Err(e) => warn!("Final snapshot task failed: {}", e),
    }
}

/// Start the agent daemon.
///
/// 1. Load configuration (defaults -> file -> env -> CLI)
/// 2. Open the agent, loading the last snapshot
/// 3. Schedule auto-commit, auto-save and commit-and-save
/// 4. Serve gRPC until SIGINT/SIGTERM
/// 5. Stop the jobs and write a final snapshot
pub async fn start_daemon(
    config_path: Option<&str>,
    args: StartArgs,
    log_level_override: Option<&str>,
) -> Result<()> {
    let settings = load_settings(config_path, &args, log_level_override)?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("ANN agent starting...");
    info!("Configuration:");
    info!("  Index path: {}", settings.index_path);
    info!("  In memory: {}", settings.in_memory);
    info!("  Dimension: {}", settings.dimension);
    info!("  gRPC address: {}", settings.grpc_addr());
    info!("  Log level: {}", settings.log_level);

    if !args.foreground {
        warn!("Background mode not implemented, running in foreground");
        warn!("Use a process manager (systemd, launchd) for background operation");
    }

    let agent_config = AgentConfig::from_settings(&settings);
    let agent = tokio::task::spawn_blocking(move || Agent::open(agent_config))
        .await
        .context("Agent open task failed")?
        .context("Failed to open agent")?;
    let agent = Arc::new(agent);

    let scheduler_config = SchedulerConfig {
        initial_delay_secs: settings.initial_delay_secs,
        ..Default::default()
    };
    let mut scheduler = SchedulerService::new(scheduler_config)
        .await
        .context("Failed to create scheduler")?;
    let jobs_config = IndexJobsConfig::from_settings(&settings);
    create_index_jobs(&scheduler, agent.clone(), &jobs_config)
        .await
        .context("Failed to register index jobs")?;
    scheduler.start().await.context("Failed to start scheduler")?;

    write_pid_file()?;

    let addr: SocketAddr = settings
        .grpc_addr()
        .parse()
        .context("Invalid gRPC address")?;

    let result =
        run_server_with_shutdown(addr, agent.clone(), Some(scheduler.registry()), shutdown_signal())
            .await;

    if let Err(e) = scheduler.shutdown().await {
        warn!("Scheduler shutdown failed: {}", e);
    }
    if !settings.in_memory {
        final_commit_and_save(agent, jobs_config.pool_size).await;
    }
    remove_pid_file();

    result.map_err(|e| anyhow::anyhow!("Server error: {}", e))
}

/// Stop the running daemon by sending SIGTERM.
pub fn stop_daemon() -> Result<()> {
    let pid = read_pid_file().context("No PID file found - daemon may not be running")?;

    if !is_process_running(pid) {
        remove_pid_file();
        anyhow::bail!("Daemon not running (stale PID file removed)");
    }

    info!("Stopping daemon (PID {})", pid);

    #[cfg(unix)]
    {
        unsafe {
            if libc::kill(pid as i32, libc::SIGTERM) != 0 {
                anyhow::bail!("Failed to send SIGTERM to daemon");
            }
        }
        println!("Sent SIGTERM to daemon (PID {})", pid);
    }

    #[cfg(not(unix))]
    {
        anyhow::bail!("Stop command not implemented on this platform");
    }

    Ok(())
}

/// Show daemon status.
pub fn show_status() -> Result<()> {
    let pid_path = pid_file_path();

    match read_pid_file() {
        Some(pid) if is_process_running(pid) => {
            println!("ANN agent is running (PID {})", pid);
            println!("PID file: {:?}", pid_path);
        }
        Some(pid) => {
            println!(
                "ANN agent is NOT running (stale PID {} in {:?})",
                pid, pid_path
            );
        }
        None => {
            println!("ANN agent is NOT running (no PID file)");
        }
    }
    Ok(())
}

/// Print the settings the daemon would start with.
pub fn show_config(config_path: Option<&str>) -> Result<()> {
    let settings = Settings::load(config_path).context("Failed to load configuration")?;
    print!("{}", render_settings(&settings)?);
    Ok(())
}

fn render_settings(settings: &Settings) -> Result<String> {
    toml::to_string_pretty(settings).context("Failed to render configuration")
}

fn print_index_count(count: &pb::IndexCount) {
    println!("Stored:        {}", count.stored);
    println!("Uncommitted:   {}", count.uncommitted);
    println!("Indexing:      {}", count.indexing);
    println!("Saving:        {}", count.saving);
    println!("Commits:       {}", count.commit_count);
    println!("Saves:         {}", count.save_count);
    println!("Dimension:     {}", count.dimension);
    println!("In memory:     {}", count.is_in_memory);
}

fn print_jobs(status: &pb::SchedulerStatus) {
    if !status.enabled {
        println!("Scheduler is not enabled on this agent");
        return;
    }
    println!(
        "{:<18} {:<14} {:>6} {:>6} {:>6}  LAST",
        "JOB", "SCHEDULE", "RUNS", "ERRS", "SKIPS"
    );
    for job in &status.jobs {
        let last = match pb::JobResultStatus::try_from(job.last_result) {
            Ok(pb::JobResultStatus::Success) => "success".to_string(),
            Ok(pb::JobResultStatus::Failed) => format!("failed: {}", job.last_message),
            Ok(pb::JobResultStatus::Skipped) => format!("skipped: {}", job.last_message),
            _ => "-".to_string(),
        };
        println!(
            "{:<18} {:<14} {:>6} {:>6} {:>6}  {}",
            job.job_name, job.schedule, job.run_count, job.error_count, job.skip_count, last
        );
    }
}

/// Run an index subcommand against the agent at `endpoint`.
pub async fn handle_index(endpoint: &str, command: IndexCommands) -> Result<()> {
    let mut client = AgentClient::connect(endpoint.to_string())
        .await
        .with_context(|| format!("Failed to connect to {}", endpoint))?;

    match command {
        IndexCommands::Info => {
            let count = client.index_info(pb::Empty {}).await?.into_inner();
            print_index_count(&count);
        }
        IndexCommands::Commit { pool_size } => {
            client
                .create_index(pb::CreateIndexRequest { pool_size })
                .await?;
            println!("Index committed");
        }
        IndexCommands::Save => {
            client.save_index(pb::Empty {}).await?;
            println!("Index saved");
        }
        IndexCommands::CommitAndSave { pool_size } => {
            client
                .create_and_save_index(pb::CreateIndexRequest { pool_size })
                .await?;
            println!("Index committed and saved");
        }
        IndexCommands::Flush => {
            let count = client.flush(pb::Empty {}).await?.into_inner();
            println!("Index flushed");
            print_index_count(&count);
        }
        IndexCommands::Jobs => {
            let status = client
                .get_scheduler_status(pb::Empty {})
                .await?
                .into_inner();
            print_jobs(&status);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_file_path() {
        let path = pid_file_path();
        assert!(path.ends_with("daemon.pid"));
        assert!(path
            .parent()
            .unwrap()
            .to_string_lossy()
            .contains("ann-agent"));
    }

    #[test]
    fn test_status_no_daemon() {
        assert!(show_status().is_ok());
    }

    #[test]
    fn test_render_settings_round_trips() {
        let settings = Settings {
            dimension: 64,
            in_memory: true,
            ..Default::default()
        };
        let rendered = render_settings(&settings).unwrap();
        assert!(rendered.contains("dimension = 64"));
        assert!(rendered.contains("in_memory = true"));

        let parsed: Settings = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.dimension, 64);
        assert!(parsed.in_memory);
    }

    #[test]
    fn test_start_overrides_applied() {
        let args = StartArgs {
            port: Some(9911),
            in_memory: true,
            dimension: Some(16),
            ..Default::default()
        };
        let settings = load_settings(None, &args, Some("debug")).unwrap();
        assert_eq!(settings.grpc_port, 9911);
        assert!(settings.in_memory);
        assert_eq!(settings.dimension, 16);
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_zero_dimension_override_rejected() {
        let args = StartArgs {
            dimension: Some(0),
            ..Default::default()
        };
        assert!(load_settings(None, &args, None).is_err());
    }
}
