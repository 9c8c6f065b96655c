//! Application-level error type returned by handlers.
//!
//! All variants serialise to the [`ErrorResponse`] JSON format and map to the
//! appropriate HTTP status code.
//!
//! | Variant | Status | `code` |
//! |---------|--------|--------|
//! | `NotFound` | 404 | `not_found` |
//! | `BadRequest` | 400 | `invalid_parameter` |
//! | `Conflict` | 409 | `conflict` |
//! | `MethodNotAllowed` | 405 | `method_not_allowed` |
//! | `Forbidden` | 403 | `forbidden` |
//! | `Internal` | 500 | `internal_error` |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use repolink::{ProjectionError, RepositoryError};
use serde::{Deserialize, Serialize};

/// Error body returned by all endpoints.
///
/// ```json
/// { "error": "children of /site has no entry \"news\"", "code": "not_found" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Human-readable description of the problem.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            error: error.into(),
        }
    }
}

/// An error that a handler can return; converts directly to an HTTP response.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    MethodNotAllowed(String),
    Forbidden(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_parameter", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::MethodNotAllowed(msg) => {
                (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", msg)
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };
        tracing::warn!(status = status.as_u16(), code, "{message}");
        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        let message = e.to_string();
        match e {
            RepositoryError::ItemNotFound(_) => AppError::NotFound(message),
            RepositoryError::ItemExists(_) => AppError::Conflict(message),
            RepositoryError::NoSuchNodeType(_) | RepositoryError::ConstraintViolation(_) => {
                AppError::BadRequest(message)
            }
            RepositoryError::Protected(_) => AppError::MethodNotAllowed(message),
            RepositoryError::SessionClosed | RepositoryError::Internal(_) => {
                AppError::Internal(message)
            }
        }
    }
}

impl From<ProjectionError> for AppError {
    fn from(e: ProjectionError) -> Self {
        match e {
            ProjectionError::NotFound(msg) => AppError::NotFound(msg),
            ProjectionError::BadRequest(msg) => AppError::BadRequest(msg),
            ProjectionError::Conflict(msg) => AppError::Conflict(msg),
            ProjectionError::MethodNotAllowed(msg) => AppError::MethodNotAllowed(msg),
            ProjectionError::Forbidden(msg) => AppError::Forbidden(msg),
            ProjectionError::Repository(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: impl Into<AppError>) -> StatusCode {
        e.into().into_response().status()
    }

    #[test]
    fn repository_errors_map_to_statuses() {
        assert_eq!(status_of(RepositoryError::ItemNotFound("/x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(RepositoryError::ItemExists("/x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(RepositoryError::NoSuchNodeType("nt:x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(RepositoryError::ConstraintViolation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(RepositoryError::Protected("/x".into())),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            status_of(RepositoryError::SessionClosed),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn projection_errors_map_to_statuses() {
        assert_eq!(status_of(ProjectionError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ProjectionError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ProjectionError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(ProjectionError::MethodNotAllowed("x".into())),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(status_of(ProjectionError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(ProjectionError::Repository(RepositoryError::Internal("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
