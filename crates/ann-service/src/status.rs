//! Mapping from agent errors to gRPC status codes.

use ann_types::{AgentError, ErrorKind};
use tonic::{Code, Status};

fn code_for(kind: ErrorKind) -> Code {
    match kind {
        ErrorKind::InvalidArgument => Code::InvalidArgument,
        ErrorKind::NotFound => Code::NotFound,
        ErrorKind::AlreadyExists => Code::AlreadyExists,
        ErrorKind::FailedPrecondition => Code::FailedPrecondition,
        ErrorKind::Aborted => Code::Aborted,
        ErrorKind::Internal => Code::Internal,
        ErrorKind::Canceled => Code::Cancelled,
        ErrorKind::DeadlineExceeded => Code::DeadlineExceeded,
    }
}

/// Convert an [`AgentError`] into a [`Status`].
///
/// The message is prefixed with the resource and, when the error names
/// objects, their ids: `object [a,b]: object a already exists; ...`.
pub fn to_status(err: AgentError) -> Status {
    let code = code_for(err.kind());
    let ids = err.ids();
    let message = if ids.is_empty() {
        format!("{}: {}", err.resource(), err)
    } else {
        format!("{} [{}]: {}", err.resource(), ids.join(","), err)
    };
    Status::new(code, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_error_codes() {
        let status = to_status(AgentError::AlreadyExists { id: "a".into() });
        assert_eq!(status.code(), Code::AlreadyExists);
        assert_eq!(status.message(), "object [a]: object a already exists");

        assert_eq!(
            to_status(AgentError::UncommittedIndexNotFound).code(),
            Code::FailedPrecondition
        );
        assert_eq!(to_status(AgentError::CommitInProgress).code(), Code::Aborted);
        assert_eq!(to_status(AgentError::Canceled).code(), Code::Cancelled);
        assert_eq!(
            to_status(AgentError::DeadlineExceeded).code(),
            Code::DeadlineExceeded
        );
        assert_eq!(to_status(AgentError::EmptySearchResult).code(), Code::NotFound);
    }

    #[test]
    fn test_batch_error_names_all_ids() {
        let err = AgentError::join(vec![
            AgentError::ObjectNotFound { id: "x".into() },
            AgentError::AlreadyExists { id: "y".into() },
        ])
        .unwrap();
        let status = to_status(err);
        assert_eq!(status.code(), Code::AlreadyExists);
        assert!(status.message().starts_with("batch [x,y]:"));
    }
}
