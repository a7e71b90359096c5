//! Error handlers
//!
//! Logs boundary failures and maps them onto HTTP status codes.

use axum::http::StatusCode;
use log::{error, warn};

use crate::error::types::{ErrorKind, ServerError};

/// Handle a server error at a request boundary.
///
/// Unclassified failures are logged with full context; expected rejections only warn.
pub fn handle_error(context: &str, err: &ServerError) {
    match err.kind() {
        ErrorKind::IoFailure => error!("{}: {} ({:?})", context, err, err),
        _ => warn!("{}: {}", context, err),
    }
}

/// Convert an error kind to an HTTP status code
pub fn kind_to_status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::MalformedRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::PathViolation | ErrorKind::AdmissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Timeout => StatusCode::OK,
        ErrorKind::IoFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert error to HTTP response code
pub fn error_to_status_code(err: &ServerError) -> StatusCode {
    kind_to_status_code(err.kind())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PathError, StorageError};

    #[test]
    fn test_status_policy() {
        let violation = ServerError::from(PathError::EscapesRoot("../x".into()));
        assert_eq!(error_to_status_code(&violation), StatusCode::FORBIDDEN);

        let missing = ServerError::from(StorageError::NotADirectory("a.txt".into()));
        assert_eq!(error_to_status_code(&missing), StatusCode::NOT_FOUND);

        let conflict = ServerError::from(StorageError::AlreadyExists("b.txt".into()));
        assert_eq!(error_to_status_code(&conflict), StatusCode::CONFLICT);

        let malformed = ServerError::MalformedPayload("missing field".into());
        assert_eq!(error_to_status_code(&malformed), StatusCode::BAD_REQUEST);

        let io = ServerError::from(std::io::Error::other("disk on fire"));
        assert_eq!(error_to_status_code(&io), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_path_not_found_is_not_a_violation() {
        let err = StorageError::from(PathError::NotFound("docs/missing".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = StorageError::from(PathError::SymlinkEscape("link".into()));
        assert_eq!(err.kind(), ErrorKind::PathViolation);
    }
}
