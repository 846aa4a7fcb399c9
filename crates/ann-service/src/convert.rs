//! Conversions between protobuf messages and domain types.

use std::time::Duration;

use ann_scheduler::{JobResult, JobStatus};
use ann_types::{
    AgentError, IndexInfo, InsertConfig, InsertRequest, Location, Neighbor, ObjectMeta,
    RemoveConfig, RemoveRequest, SearchConfig, TimestampOp, TimestampPredicate, UpdateConfig,
    UpdateRequest, UpsertConfig, UpsertRequest, VectorRecord,
};

use crate::pb;

fn required<T>(field: Option<T>, name: &str) -> Result<T, AgentError> {
    field.ok_or_else(|| AgentError::InvalidArgument(format!("{} is required", name)))
}

pub(crate) fn insert_request(req: pb::InsertRequest) -> Result<InsertRequest, AgentError> {
    let vector = required(req.vector, "vector")?;
    let config = req.config.unwrap_or_default();
    Ok(InsertRequest {
        id: vector.id,
        vector: vector.vector,
        config: InsertConfig {
            skip_strict_exist_check: config.skip_strict_exist_check,
            timestamp: config.timestamp,
        },
    })
}

pub(crate) fn update_request(req: pb::UpdateRequest) -> Result<UpdateRequest, AgentError> {
    let vector = required(req.vector, "vector")?;
    let config = req.config.unwrap_or_default();
    Ok(UpdateRequest {
        id: vector.id,
        vector: vector.vector,
        config: UpdateConfig {
            skip_strict_exist_check: config.skip_strict_exist_check,
            timestamp: config.timestamp,
            update_timestamp_if_exists: config.update_timestamp_if_exists,
        },
    })
}

pub(crate) fn upsert_request(req: pb::UpsertRequest) -> Result<UpsertRequest, AgentError> {
    let vector = required(req.vector, "vector")?;
    let config = req.config.unwrap_or_default();
    Ok(UpsertRequest {
        id: vector.id,
        vector: vector.vector,
        config: UpsertConfig {
            timestamp: config.timestamp,
        },
    })
}

pub(crate) fn remove_request(req: pb::RemoveRequest) -> Result<RemoveRequest, AgentError> {
    let id = required(req.id, "id")?;
    let config = req.config.unwrap_or_default();
    Ok(RemoveRequest {
        id: id.id,
        config: RemoveConfig {
            skip_strict_exist_check: config.skip_strict_exist_check,
            timestamp: config.timestamp,
        },
    })
}

/// Decode a batch, failing on the first malformed element.
pub(crate) fn batch<P, D>(
    requests: Vec<P>,
    decode: fn(P) -> Result<D, AgentError>,
) -> Result<Vec<D>, AgentError> {
    requests.into_iter().map(decode).collect()
}

pub(crate) fn timestamp_predicate(ts: &pb::Timestamp) -> Result<TimestampPredicate, AgentError> {
    use pb::timestamp::Operator;

    let operator = Operator::try_from(ts.operator).map_err(|_| {
        AgentError::InvalidArgument(format!("unknown timestamp operator {}", ts.operator))
    })?;
    let op = match operator {
        Operator::Eq => TimestampOp::Eq,
        Operator::Ne => TimestampOp::Ne,
        Operator::Ge => TimestampOp::Ge,
        Operator::Gt => TimestampOp::Gt,
        Operator::Le => TimestampOp::Le,
        Operator::Lt => TimestampOp::Lt,
    };
    Ok(TimestampPredicate::new(ts.timestamp, op))
}

/// A missing config falls back to the defaults (10 neighbors, unbounded
/// radius, no deadline).
pub(crate) fn search_config(config: Option<pb::SearchConfig>) -> SearchConfig {
    let Some(config) = config else {
        return SearchConfig::default();
    };
    SearchConfig {
        request_id: config.request_id,
        num: config.num,
        min_num: config.min_num,
        radius: config.radius,
        epsilon: config.epsilon,
        timeout: (config.timeout_ms > 0).then(|| Duration::from_millis(config.timeout_ms as u64)),
    }
}

pub(crate) fn search_response(request_id: String, hits: Vec<Neighbor>) -> pb::SearchResponse {
    pb::SearchResponse {
        request_id,
        results: hits
            .into_iter()
            .map(|hit| pb::Distance {
                id: hit.id,
                distance: hit.distance,
            })
            .collect(),
    }
}

impl From<Location> for pb::Location {
    fn from(location: Location) -> Self {
        Self {
            name: location.name,
            uuid: location.uuid,
            ips: location.ips,
        }
    }
}

pub(crate) fn locations(locations: Vec<Location>) -> pb::Locations {
    pb::Locations {
        locations: locations.into_iter().map(Into::into).collect(),
    }
}

impl From<VectorRecord> for pb::ObjectVector {
    fn from(record: VectorRecord) -> Self {
        Self {
            id: record.id,
            vector: record.vector,
            timestamp: record.timestamp,
        }
    }
}

impl From<ObjectMeta> for pb::ObjectMeta {
    fn from(meta: ObjectMeta) -> Self {
        Self {
            id: meta.id,
            timestamp: meta.timestamp,
        }
    }
}

impl From<IndexInfo> for pb::IndexCount {
    fn from(info: IndexInfo) -> Self {
        Self {
            stored: info.stored as u64,
            uncommitted: info.uncommitted as u64,
            indexing: info.indexing,
            saving: info.saving,
            commit_count: info.commit_count,
            save_count: info.save_count,
            dimension: info.dimension as u32,
            is_in_memory: info.in_memory,
        }
    }
}

impl From<JobStatus> for pb::JobStatus {
    fn from(status: JobStatus) -> Self {
        let (last_result, last_message) = match status.last_result {
            None => (pb::JobResultStatus::Unspecified, String::new()),
            Some(JobResult::Success) => (pb::JobResultStatus::Success, String::new()),
            Some(JobResult::Failed(msg)) => (pb::JobResultStatus::Failed, msg),
            Some(JobResult::Skipped(msg)) => (pb::JobResultStatus::Skipped, msg),
        };
        Self {
            job_name: status.job_name,
            schedule: status.schedule,
            last_run_ms: status.last_run.map(|t| t.timestamp_millis()).unwrap_or(0),
            last_duration_ms: status.last_duration_ms.unwrap_or(0),
            last_result: last_result as i32,
            last_message,
            run_count: status.run_count,
            error_count: status.error_count,
            skip_count: status.skip_count,
            is_running: status.is_running,
            metadata: status.last_run_metadata,
        }
    }
}
