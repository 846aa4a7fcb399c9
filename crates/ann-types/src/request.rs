//! Per-request options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertConfig {
    pub skip_strict_exist_check: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub skip_strict_exist_check: bool,
    pub timestamp: i64,
    /// An identical vector with a newer timestamp only refreshes the timestamp
    pub update_timestamp_if_exists: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertConfig {
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveConfig {
    pub skip_strict_exist_check: bool,
    pub timestamp: i64,
}

/// One element of a MultiInsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRequest {
    pub id: String,
    pub vector: Vec<f32>,
    pub config: InsertConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub id: String,
    pub vector: Vec<f32>,
    pub config: UpdateConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertRequest {
    pub id: String,
    pub vector: Vec<f32>,
    pub config: UpsertConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub id: String,
    pub config: RemoveConfig,
}

/// Parameters shared by every similarity search variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub request_id: String,
    /// Number of neighbors to return
    pub num: u32,
    /// Minimum number of neighbors; fewer is NotFound
    pub min_num: u32,
    /// Maximum distance, non-positive means unbounded
    pub radius: f32,
    pub epsilon: f32,
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            request_id: String::new(),
            num: 10,
            min_num: 0,
            radius: -1.0,
            epsilon: 0.1,
            timeout: None,
        }
    }
}

impl SearchConfig {
    pub fn with_num(mut self, num: u32) -> Self {
        self.num = num;
        self
    }

    pub fn with_min_num(mut self, min_num: u32) -> Self {
        self.min_num = min_num;
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// Comparison applied by [`TimestampPredicate`].
///
/// Each operator compares the predicate's threshold on the left against the
/// record's timestamp on the right, so `Ge` selects records whose timestamp
/// is at most the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampOp {
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampPredicate {
    pub timestamp: i64,
    pub op: TimestampOp,
}

impl TimestampPredicate {
    pub fn new(timestamp: i64, op: TimestampOp) -> Self {
        Self { timestamp, op }
    }

    /// Evaluate `threshold OP record_timestamp`.
    pub fn matches(&self, record_timestamp: i64) -> bool {
        let threshold = self.timestamp;
        match self.op {
            TimestampOp::Eq => threshold == record_timestamp,
            TimestampOp::Ne => threshold != record_timestamp,
            TimestampOp::Ge => threshold >= record_timestamp,
            TimestampOp::Gt => threshold > record_timestamp,
            TimestampOp::Le => threshold <= record_timestamp,
            TimestampOp::Lt => threshold < record_timestamp,
        }
    }

    /// Conjunction over all predicates. An empty list matches everything.
    pub fn all_match(predicates: &[TimestampPredicate], record_timestamp: i64) -> bool {
        predicates.iter().all(|p| p.matches(record_timestamp))
    }
}
