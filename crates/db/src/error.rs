//! Repository error type.

/// Errors surfaced by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// A versioned update found a different row version (or a state-guard
    /// mismatch). The caller must re-read the row and retry.
    #[error("row version conflict")]
    Conflict,

    /// The referenced row does not exist.
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// Any other database error.
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Whether a sqlx error is a SQLite unique-constraint violation.
///
/// The partial unique index on active jobs surfaces the
/// single-active-job invariant this way under concurrent submissions.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().contains("UNIQUE constraint failed"),
        _ => false,
    }
}
