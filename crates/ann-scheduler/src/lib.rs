//! Background job scheduler for the ann-agent daemon.
//!
//! Wraps `tokio-cron-scheduler` with fixed-interval jobs, graceful shutdown
//! and per-job status tracking.
//!
//! # Features
//!
//! - Interval scheduling with an optional initial delay
//! - Graceful shutdown via CancellationToken
//! - Job status observability via [`JobRegistry`]
//! - Overlapping ticks are skipped while a run is active
//! - Index maintenance jobs: auto-commit, auto-save, commit-and-save
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use ann_scheduler::{JobOutput, SchedulerConfig, SchedulerService};
//!
//! let scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//!
//! scheduler.register_interval_job(
//!     "auto-save",
//!     Duration::from_secs(60),
//!     |_cancel| async { Ok(JobOutput::new()) },
//! ).await?;
//!
//! let status = scheduler.registry().get_status("auto-save");
//! scheduler.start().await?;
//! ```

mod config;
mod error;
mod overlap;
mod registry;
mod scheduler;

#[cfg(feature = "jobs")]
pub mod jobs;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use overlap::{OverlapGuard, RunGuard};
pub use registry::{JobOutput, JobRegistry, JobResult, JobStatus};
pub use scheduler::SchedulerService;
