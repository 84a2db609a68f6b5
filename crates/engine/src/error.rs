//! Orchestration error type.

use parrot_core::error::CoreError;
use parrot_db::error::RepoError;

/// Errors surfaced by the registry and executor.
///
/// Stage-level failures never escape as errors; the executor absorbs
/// them into the job's `failed` record.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
