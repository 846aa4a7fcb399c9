//! Error types for the ANN agent.
//!
//! Every public operation returns an [`AgentError`]. Variants are built at the
//! point of failure and each one maps to exactly one [`ErrorKind`], which is
//! what callers branch on.

use std::fmt;

use thiserror::Error;

/// Classification of a failure as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    Aborted,
    Internal,
    Canceled,
    DeadlineExceeded,
}

impl ErrorKind {
    /// Rank used when several failures are joined into one batch error.
    /// Lower wins.
    fn batch_rank(self) -> u8 {
        match self {
            ErrorKind::AlreadyExists => 0,
            ErrorKind::NotFound => 1,
            ErrorKind::InvalidArgument => 2,
            ErrorKind::FailedPrecondition => 3,
            ErrorKind::Aborted => 4,
            ErrorKind::Canceled => 5,
            ErrorKind::DeadlineExceeded => 6,
            ErrorKind::Internal => 7,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::FailedPrecondition => "failed_precondition",
            ErrorKind::Aborted => "aborted",
            ErrorKind::Internal => "internal",
            ErrorKind::Canceled => "canceled",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
        };
        f.write_str(name)
    }
}

/// Unified error type for agent operations.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// Empty object id
    #[error("invalid uuid: object id must not be empty")]
    EmptyId,

    /// Vector length differs from the configured dimension
    #[error("invalid dimension for {id}: expected {expected}, got {actual}")]
    InvalidDimension {
        id: String,
        expected: usize,
        actual: usize,
    },

    /// Malformed request field
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Timestamp-only update would move a record backwards
    #[error("object {id} already has timestamp {current}, refusing {requested}")]
    NewerTimestampExists {
        id: String,
        current: i64,
        requested: i64,
    },

    #[error("object {id} not found")]
    ObjectNotFound { id: String },

    #[error("object {id} already exists")]
    AlreadyExists { id: String },

    /// Commit requested with nothing queued
    #[error("uncommitted index not found")]
    UncommittedIndexNotFound,

    #[error("flushing is in progress")]
    FlushingInProgress,

    #[error("create index is in progress")]
    CommitInProgress,

    #[error("search result is empty")]
    EmptySearchResult,

    #[error("insufficient search results: got {got}, required {required}")]
    InsufficientSearchResult { got: usize, required: usize },

    /// RemoveByTimestamp matched nothing
    #[error("remove target not found")]
    RemoveTargetNotFound,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Unexpected failure in the store or on disk
    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation canceled")]
    Canceled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Several per-record failures from one batch request
    #[error("{}", join_messages(.0))]
    Batch(Vec<AgentError>),
}

fn join_messages(errors: &[AgentError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl AgentError {
    /// The single kind this error is classified as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::EmptyId
            | AgentError::InvalidDimension { .. }
            | AgentError::InvalidArgument(_)
            | AgentError::NewerTimestampExists { .. }
            | AgentError::Config(_) => ErrorKind::InvalidArgument,
            AgentError::ObjectNotFound { .. }
            | AgentError::EmptySearchResult
            | AgentError::InsufficientSearchResult { .. }
            | AgentError::RemoveTargetNotFound => ErrorKind::NotFound,
            AgentError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            AgentError::UncommittedIndexNotFound => ErrorKind::FailedPrecondition,
            AgentError::FlushingInProgress | AgentError::CommitInProgress => ErrorKind::Aborted,
            AgentError::Internal(_) => ErrorKind::Internal,
            AgentError::Canceled => ErrorKind::Canceled,
            AgentError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            AgentError::Batch(errors) => errors
                .iter()
                .map(AgentError::kind)
                .min_by_key(|k| k.batch_rank())
                .unwrap_or(ErrorKind::Internal),
        }
    }

    /// Object ids named by this error, in order of appearance.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            AgentError::InvalidDimension { id, .. }
            | AgentError::NewerTimestampExists { id, .. }
            | AgentError::ObjectNotFound { id }
            | AgentError::AlreadyExists { id } => vec![id.as_str()],
            AgentError::Batch(errors) => errors.iter().flat_map(|e| e.ids()).collect(),
            _ => Vec::new(),
        }
    }

    /// Resource the failure concerns, for structured error details.
    pub fn resource(&self) -> &'static str {
        match self {
            AgentError::EmptyId
            | AgentError::InvalidDimension { .. }
            | AgentError::NewerTimestampExists { .. }
            | AgentError::ObjectNotFound { .. }
            | AgentError::AlreadyExists { .. } => "object",
            AgentError::UncommittedIndexNotFound
            | AgentError::FlushingInProgress
            | AgentError::CommitInProgress => "index",
            AgentError::EmptySearchResult | AgentError::InsufficientSearchResult { .. } => "search",
            AgentError::RemoveTargetNotFound => "timestamp",
            AgentError::Config(_) => "config",
            AgentError::InvalidArgument(_)
            | AgentError::Internal(_)
            | AgentError::Canceled
            | AgentError::DeadlineExceeded => "request",
            AgentError::Batch(_) => "batch",
        }
    }

    /// Join per-record failures into one error.
    ///
    /// Returns `None` for an empty list and the error itself for a single
    /// failure. Nested batches are flattened.
    pub fn join(errors: Vec<AgentError>) -> Option<AgentError> {
        let mut flat = Vec::with_capacity(errors.len());
        for err in errors {
            match err {
                AgentError::Batch(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(AgentError::Batch(flat)),
        }
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        AgentError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(AgentError::EmptyId.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            AgentError::ObjectNotFound { id: "a".into() }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            AgentError::UncommittedIndexNotFound.kind(),
            ErrorKind::FailedPrecondition
        );
        assert_eq!(AgentError::CommitInProgress.kind(), ErrorKind::Aborted);
        assert_eq!(AgentError::FlushingInProgress.kind(), ErrorKind::Aborted);
        assert_eq!(AgentError::EmptySearchResult.kind(), ErrorKind::NotFound);
        assert_eq!(
            AgentError::NewerTimestampExists {
                id: "a".into(),
                current: 2,
                requested: 1
            }
            .kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_join_empty_and_single() {
        assert!(AgentError::join(vec![]).is_none());
        let single = AgentError::join(vec![AgentError::AlreadyExists { id: "x".into() }]).unwrap();
        assert!(matches!(single, AgentError::AlreadyExists { .. }));
    }

    #[test]
    fn test_batch_kind_precedence() {
        let err = AgentError::join(vec![
            AgentError::Internal("boom".into()),
            AgentError::ObjectNotFound { id: "b".into() },
            AgentError::AlreadyExists { id: "c".into() },
        ])
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err = AgentError::join(vec![
            AgentError::Internal("boom".into()),
            AgentError::EmptyId,
        ])
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_batch_ids_and_message() {
        let err = AgentError::join(vec![
            AgentError::ObjectNotFound { id: "b".into() },
            AgentError::join(vec![
                AgentError::AlreadyExists { id: "c".into() },
                AgentError::InvalidDimension {
                    id: "d".into(),
                    expected: 3,
                    actual: 2,
                },
            ])
            .unwrap(),
        ])
        .unwrap();

        assert_eq!(err.ids(), vec!["b", "c", "d"]);
        let msg = err.to_string();
        assert!(msg.contains("object b not found"));
        assert!(msg.contains("object c already exists"));
        assert!(msg.contains("expected 3, got 2"));
        assert_eq!(err.resource(), "batch");
    }
}
