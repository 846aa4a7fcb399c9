//! Vector records, queued operations and index status.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall clock in nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// A caller timestamp of zero or below means "now".
pub fn resolve_timestamp(timestamp: i64) -> i64 {
    if timestamp > 0 {
        timestamp
    } else {
        now_nanos()
    }
}

/// A vector addressed by its external id.
///
/// Ids are opaque to the agent but must be valid UTF-8, since they travel
/// as protobuf `string` fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub timestamp: i64,
}

/// Timestamp-only view of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    Insert,
    Update,
    Delete,
}

/// Whether an operation was accepted under the strict existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExistenceCheck {
    #[default]
    Strict,
    Skip,
}

impl ExistenceCheck {
    pub fn from_skip_flag(skip: bool) -> Self {
        if skip {
            ExistenceCheck::Skip
        } else {
            ExistenceCheck::Strict
        }
    }
}

/// A mutation accepted but not yet merged into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: String,
    pub kind: OpKind,
    /// Absent for deletes
    pub vector: Option<Vec<f32>>,
    pub timestamp: i64,
    pub check: ExistenceCheck,
}

impl PendingOperation {
    pub fn insert(id: impl Into<String>, vector: Vec<f32>, timestamp: i64, check: ExistenceCheck) -> Self {
        Self {
            id: id.into(),
            kind: OpKind::Insert,
            vector: Some(vector),
            timestamp,
            check,
        }
    }

    pub fn update(id: impl Into<String>, vector: Vec<f32>, timestamp: i64, check: ExistenceCheck) -> Self {
        Self {
            id: id.into(),
            kind: OpKind::Update,
            vector: Some(vector),
            timestamp,
            check,
        }
    }

    pub fn delete(id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            kind: OpKind::Delete,
            vector: None,
            timestamp,
            check: ExistenceCheck::Strict,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.kind == OpKind::Delete
    }

    /// The record this operation will leave behind once committed.
    pub fn to_record(&self) -> Option<VectorRecord> {
        self.vector.as_ref().map(|vector| VectorRecord {
            id: self.id.clone(),
            vector: vector.clone(),
            timestamp: self.timestamp,
        })
    }
}

/// Where an accepted object lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Agent name
    pub name: String,
    /// Object id, UTF-8 like [`VectorRecord::id`]
    pub uuid: String,
    pub ips: Vec<String>,
}

/// One ranked search hit. Smaller distance is nearer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: String,
    pub distance: f32,
}

/// Index counters and lifecycle flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub stored: usize,
    pub uncommitted: usize,
    pub indexing: bool,
    pub saving: bool,
    /// Completed commits since start
    pub commit_count: u64,
    /// Completed saves since start
    pub save_count: u64,
    pub dimension: usize,
    pub in_memory: bool,
}
