//! Job registry: last run, result and counters per job.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Result of one job run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResult {
    Success,
    Failed(String),
    /// Did not do any work, with the reason
    Skipped(String),
}

/// What a job reports back after a run.
#[derive(Debug, Clone, Default)]
pub struct JobOutput {
    pub metadata: HashMap<String, String>,
    /// Set when the job decided there was nothing to do
    pub skip_reason: Option<String>,
}

impl JobOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skip_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub(crate) fn into_result(self) -> (JobResult, HashMap<String, String>) {
        let result = match self.skip_reason {
            Some(reason) => JobResult::Skipped(reason),
            None => JobResult::Success,
        };
        (result, self.metadata)
    }
}

/// Status of a registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_name: String,
    /// Human-readable schedule, e.g. "every 60s"
    pub schedule: String,
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<JobResult>,
    pub run_count: u64,
    pub error_count: u64,
    pub skip_count: u64,
    pub is_running: bool,
    #[serde(default)]
    pub last_run_metadata: HashMap<String, String>,
}

impl JobStatus {
    pub fn new(job_name: String, schedule: String) -> Self {
        Self {
            job_name,
            schedule,
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            run_count: 0,
            error_count: 0,
            skip_count: 0,
            is_running: false,
            last_run_metadata: HashMap::new(),
        }
    }
}

/// Thread-safe table of job statuses.
///
/// ```
/// use ann_scheduler::{JobRegistry, JobResult};
///
/// let registry = JobRegistry::new();
/// registry.register("auto-save", "every 60s");
///
/// registry.record_start("auto-save");
/// assert!(registry.is_running("auto-save"));
///
/// registry.record_complete("auto-save", JobResult::Success, 12);
/// assert!(!registry.is_running("auto-save"));
/// ```
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job, replacing any previous entry with the same name.
    pub fn register(&self, job_name: &str, schedule: &str) {
        self.jobs.write().insert(
            job_name.to_string(),
            JobStatus::new(job_name.to_string(), schedule.to_string()),
        );
    }

    pub fn record_start(&self, job_name: &str) {
        if let Some(status) = self.jobs.write().get_mut(job_name) {
            status.is_running = true;
        }
    }

    pub fn record_complete(&self, job_name: &str, result: JobResult, duration_ms: u64) {
        self.record_complete_with_metadata(job_name, result, duration_ms, HashMap::new());
    }

    pub fn record_complete_with_metadata(
        &self,
        job_name: &str,
        result: JobResult,
        duration_ms: u64,
        metadata: HashMap<String, String>,
    ) {
        let mut jobs = self.jobs.write();
        let Some(status) = jobs.get_mut(job_name) else {
            return;
        };
        status.is_running = false;
        status.last_run = Some(Utc::now());
        status.last_duration_ms = Some(duration_ms);
        status.run_count += 1;
        match &result {
            JobResult::Failed(_) => status.error_count += 1,
            JobResult::Skipped(_) => status.skip_count += 1,
            JobResult::Success => {}
        }
        status.last_result = Some(result);
        status.last_run_metadata = metadata;
    }

    pub fn get_status(&self, job_name: &str) -> Option<JobStatus> {
        self.jobs.read().get(job_name).cloned()
    }

    /// All statuses ordered by job name.
    pub fn get_all_status(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self.jobs.read().values().cloned().collect();
        all.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        all
    }

    pub fn is_running(&self, job_name: &str) -> bool {
        self.jobs
            .read()
            .get(job_name)
            .is_some_and(|status| status.is_running)
    }

    pub fn is_registered(&self, job_name: &str) -> bool {
        self.jobs.read().contains_key(job_name)
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = JobRegistry::new();
        registry.register("auto-commit", "every 1s");
        assert!(registry.is_registered("auto-commit"));
        assert!(!registry.is_registered("other"));

        let status = registry.get_status("auto-commit").unwrap();
        assert_eq!(status.schedule, "every 1s");
        assert_eq!(status.run_count, 0);
        assert!(status.last_result.is_none());
    }

    #[test]
    fn test_counters() {
        let registry = JobRegistry::new();
        registry.register("auto-commit", "every 1s");

        registry.record_complete("auto-commit", JobResult::Success, 5);
        registry.record_complete("auto-commit", JobResult::Failed("disk".into()), 5);
        registry.record_complete("auto-commit", JobResult::Skipped("empty".into()), 0);

        let status = registry.get_status("auto-commit").unwrap();
        assert_eq!(status.run_count, 3);
        assert_eq!(status.error_count, 1);
        assert_eq!(status.skip_count, 1);
        assert_eq!(status.last_result, Some(JobResult::Skipped("empty".into())));
    }

    #[test]
    fn test_metadata_recorded() {
        let registry = JobRegistry::new();
        registry.register("auto-save", "every 60s");
        let (result, metadata) = JobOutput::new().with_metadata("stored", 42).into_result();
        registry.record_complete_with_metadata("auto-save", result, 3, metadata);

        let status = registry.get_status("auto-save").unwrap();
        assert_eq!(status.last_result, Some(JobResult::Success));
        assert_eq!(status.last_run_metadata.get("stored").unwrap(), "42");
    }

    #[test]
    fn test_unknown_job_is_ignored() {
        let registry = JobRegistry::new();
        registry.record_start("ghost");
        registry.record_complete("ghost", JobResult::Success, 1);
        assert_eq!(registry.job_count(), 0);
        assert!(!registry.is_running("ghost"));
    }

    #[test]
    fn test_all_status_sorted() {
        let registry = JobRegistry::new();
        for name in ["c", "a", "b"] {
            registry.register(name, "every 1s");
        }
        let names: Vec<String> = registry
            .get_all_status()
            .into_iter()
            .map(|s| s.job_name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
