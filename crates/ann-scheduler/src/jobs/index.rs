//! Index maintenance jobs.
//!
//! Commit and save block on the agent's lifecycle locks, so each run hops
//! onto the blocking pool. A commit that finds nothing to do, or that loses
//! a race with a flush or another commit, is recorded as skipped.

use std::sync::Arc;
use std::time::Duration;

use ann_index::Agent;
use ann_types::{AgentError, ErrorKind, Settings};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{JobOutput, SchedulerError, SchedulerService};

pub const AUTO_COMMIT_JOB: &str = "auto-commit";
pub const AUTO_SAVE_JOB: &str = "auto-save";
pub const COMMIT_AND_SAVE_JOB: &str = "commit-and-save";

/// Schedule and thresholds for the index jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexJobsConfig {
    /// How often the queue length is checked (default: 1s)
    pub auto_index_check_interval_secs: u64,
    /// Queue length that triggers a commit (default: 100)
    pub auto_index_length: usize,
    /// Auto-save period (default: 60s)
    pub auto_save_interval_secs: u64,
    /// Forced commit-and-save period (default: 3600s)
    pub auto_index_limit_secs: u64,
    /// Commit batch size, 0 for the agent default
    pub pool_size: u32,
}

impl Default for IndexJobsConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl IndexJobsConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            auto_index_check_interval_secs: settings.auto_index_check_interval_secs,
            auto_index_length: settings.auto_index_length,
            auto_save_interval_secs: settings.auto_save_interval_secs,
            auto_index_limit_secs: settings.auto_index_limit_secs,
            pool_size: 0,
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, String>
where
    F: FnOnce() -> Result<T, AgentError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| format!("job task panicked: {}", e))?
        .map_err(|e| e.to_string())
}

fn is_skippable(err: &AgentError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::FailedPrecondition | ErrorKind::Aborted
    )
}

/// Commit if at least `threshold` operations are pending.
pub async fn run_auto_commit(
    agent: Arc<Agent>,
    threshold: usize,
    pool_size: u32,
    cancel: CancellationToken,
) -> Result<JobOutput, String> {
    let pending = agent.uncommitted();
    if pending == 0 || pending < threshold {
        return Ok(JobOutput::skipped(format!(
            "{} pending, threshold {}",
            pending, threshold
        )));
    }

    let outcome = tokio::task::spawn_blocking(move || agent.commit(&cancel, pool_size))
        .await
        .map_err(|e| format!("job task panicked: {}", e))?;
    match outcome {
        Ok(stats) => {
            info!(inserted = stats.inserted, deleted = stats.deleted, "Auto-commit finished");
            Ok(JobOutput::new()
                .with_metadata("inserted", stats.inserted)
                .with_metadata("deleted", stats.deleted)
                .with_metadata("dropped", stats.dropped))
        }
        Err(e) if is_skippable(&e) => {
            debug!(error = %e, "Auto-commit skipped");
            Ok(JobOutput::skipped(e.to_string()))
        }
        Err(e) => Err(e.to_string()),
    }
}

pub async fn run_auto_save(
    agent: Arc<Agent>,
    cancel: CancellationToken,
) -> Result<JobOutput, String> {
    let stored = agent.index_info().stored;
    blocking(move || agent.save(&cancel)).await?;
    Ok(JobOutput::new().with_metadata("stored", stored))
}

pub async fn run_commit_and_save(
    agent: Arc<Agent>,
    pool_size: u32,
    cancel: CancellationToken,
) -> Result<JobOutput, String> {
    let worker = agent.clone();
    blocking(move || worker.commit_and_save(&cancel, pool_size)).await?;
    Ok(JobOutput::new().with_metadata("stored", agent.index_info().stored))
}

pub async fn create_auto_commit_job(
    scheduler: &SchedulerService,
    agent: Arc<Agent>,
    config: &IndexJobsConfig,
) -> Result<(), SchedulerError> {
    let threshold = config.auto_index_length;
    let pool_size = config.pool_size;
    scheduler
        .register_interval_job(
            AUTO_COMMIT_JOB,
            Duration::from_secs(config.auto_index_check_interval_secs),
            move |cancel| run_auto_commit(agent.clone(), threshold, pool_size, cancel),
        )
        .await?;
    Ok(())
}

pub async fn create_auto_save_job(
    scheduler: &SchedulerService,
    agent: Arc<Agent>,
    config: &IndexJobsConfig,
) -> Result<(), SchedulerError> {
    scheduler
        .register_interval_job(
            AUTO_SAVE_JOB,
            Duration::from_secs(config.auto_save_interval_secs),
            move |cancel| run_auto_save(agent.clone(), cancel),
        )
        .await?;
    Ok(())
}

pub async fn create_commit_and_save_job(
    scheduler: &SchedulerService,
    agent: Arc<Agent>,
    config: &IndexJobsConfig,
) -> Result<(), SchedulerError> {
    let pool_size = config.pool_size;
    scheduler
        .register_interval_job(
            COMMIT_AND_SAVE_JOB,
            Duration::from_secs(config.auto_index_limit_secs),
            move |cancel| run_commit_and_save(agent.clone(), pool_size, cancel),
        )
        .await?;
    Ok(())
}

/// Register all three index jobs.
pub async fn create_index_jobs(
    scheduler: &SchedulerService,
    agent: Arc<Agent>,
    config: &IndexJobsConfig,
) -> Result<(), SchedulerError> {
    create_auto_commit_job(scheduler, agent.clone(), config).await?;
    create_auto_save_job(scheduler, agent.clone(), config).await?;
    create_commit_and_save_job(scheduler, agent, config).await?;
    Ok(())
}
