//! Error types for the repository contract and the projection layer.
//!
//! [`RepositoryError`] is what a [`Session`](crate::repository::Session)
//! implementation reports. [`ProjectionError`] is what representation
//! building and the sub-element accessors return; repository failures are
//! carried inside it unchanged so the request boundary can decide how to
//! surface them.

use thiserror::Error;

/// Failures reported by the content-repository collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// No item exists at the given identifier or path.
    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// An item with the same name already exists under the parent.
    #[error("item already exists: {0}")]
    ItemExists(String),

    /// The named node type is not registered.
    #[error("no such node type: {0}")]
    NoSuchNodeType(String),

    /// The item is governed by a protected definition and cannot be written.
    #[error("protected item: {0}")]
    Protected(String),

    /// The write would violate a node-type or value constraint.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The session was used after logout.
    #[error("session is closed")]
    SessionClosed,

    /// Unexpected failure inside the repository implementation.
    #[error("internal repository error: {0}")]
    Internal(String),
}

/// Failures of the projection layer.
///
/// The first five variants are produced by the accessors themselves;
/// [`ProjectionError::Repository`] wraps whatever the collaborator reported.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    /// The requested sub-element does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The create payload (or the request shape) is invalid.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A sub-element with that name already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The operation is not supported for this container or element.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// The caller may not see the item.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type Result<T, E = ProjectionError> = std::result::Result<T, E>;
