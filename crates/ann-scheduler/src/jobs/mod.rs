//! Predefined jobs for index maintenance.
//!
//! - **auto-commit**: commit once enough operations are pending
//! - **auto-save**: periodic snapshot
//! - **commit-and-save**: forced commit and snapshot on a longer period

pub mod index;

pub use index::{
    create_auto_commit_job, create_auto_save_job, create_commit_and_save_job, create_index_jobs,
    run_auto_commit, run_auto_save, run_commit_and_save, IndexJobsConfig,
};
