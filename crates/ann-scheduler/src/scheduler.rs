//! Scheduler service wrapper around tokio-cron-scheduler.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::overlap::OverlapGuard;
use crate::registry::{JobOutput, JobRegistry, JobResult};
use crate::{SchedulerConfig, SchedulerError};

/// How often shutdown polls for running jobs.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Owns the job scheduler, its registry and the shutdown token handed to
/// every job.
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    shutdown_token: CancellationToken,
    is_running: AtomicBool,
}

impl SchedulerService {
    /// Create the scheduler. Jobs do not run until [`Self::start`].
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler,
            config,
            registry: Arc::new(JobRegistry::new()),
            shutdown_token: CancellationToken::new(),
            is_running: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.scheduler.start().await?;
        info!(jobs = self.registry.job_count(), "Scheduler started");
        Ok(())
    }

    /// Cancel the shutdown token, wait up to the configured timeout for
    /// running jobs, then stop the scheduler.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();

        let deadline = Instant::now() + self.config.shutdown_timeout();
        while self.registry.get_all_status().iter().any(|s| s.is_running) {
            if Instant::now() >= deadline {
                warn!("Jobs still running at shutdown timeout");
                break;
            }
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!("Error during scheduler shutdown: {}", e);
        }
        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler shutdown complete");
        Ok(())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a job that runs every `every`.
    ///
    /// The job receives the shutdown token. Its output is recorded in the
    /// registry: `Ok` with a skip reason as `Skipped`, other `Ok` as
    /// `Success`, `Err` as `Failed`. Ticks before the configured initial
    /// delay, and ticks after shutdown began, do nothing.
    pub async fn register_interval_job<F, Fut>(
        &self,
        name: &str,
        every: Duration,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, String>> + Send + 'static,
    {
        if every.is_zero() {
            return Err(SchedulerError::InvalidInterval(name.to_string()));
        }

        let schedule = format!("every {}s", every.as_secs_f64());
        self.registry.register(name, &schedule);

        let job_name = name.to_string();
        let registry = self.registry.clone();
        let token = self.shutdown_token.clone();
        let guard = Arc::new(OverlapGuard::new());
        let not_before = Instant::now() + self.config.initial_delay();

        let job = Job::new_repeated_async(every, move |_uuid, _lock| {
            let name = job_name.clone();
            let registry = registry.clone();
            let token = token.clone();
            let guard = guard.clone();
            let job_fn = job_fn.clone();

            Box::pin(async move {
                if token.is_cancelled() || Instant::now() < not_before {
                    return;
                }
                let Some(_run) = guard.try_acquire() else {
                    debug!(job = %name, "Previous run still active, skipping");
                    registry.record_complete(
                        &name,
                        JobResult::Skipped("previous run still active".to_string()),
                        0,
                    );
                    return;
                };

                registry.record_start(&name);
                let start = Instant::now();
                let outcome = job_fn(token).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match outcome {
                    Ok(output) => {
                        let (result, metadata) = output.into_result();
                        debug!(job = %name, ?result, duration_ms, "Job completed");
                        registry.record_complete_with_metadata(&name, result, duration_ms, metadata);
                    }
                    Err(e) => {
                        warn!(job = %name, error = %e, "Job failed");
                        registry.record_complete(&name, JobResult::Failed(e), duration_ms);
                    }
                }
            })
        })?;

        let uuid = self.scheduler.add(job).await?;
        info!(job = %name, uuid = %uuid, schedule = %schedule, "Job registered");
        Ok(uuid)
    }
}
