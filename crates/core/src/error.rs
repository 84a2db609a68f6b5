//! Domain-level error type shared across the workspace.

/// Errors produced by domain logic (validation, lookups, invariants).
///
/// The API layer maps each variant onto an HTTP status; the executor
/// records `Validation`/`Internal` messages verbatim on failed jobs.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An entity lookup failed.
    #[error("{entity} with id {id} not found")]
    NotFound {
        entity: &'static str,
        id: uuid::Uuid,
    },

    /// A submission precondition was not met. Nothing was created.
    #[error("{0}")]
    Validation(String),

    /// The requested operation conflicts with current state.
    #[error("{0}")]
    Conflict(String),

    /// An unexpected internal failure.
    #[error("{0}")]
    Internal(String),
}
