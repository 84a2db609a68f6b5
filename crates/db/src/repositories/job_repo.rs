//! Repository for the `jobs` table.
//!
//! Every mutation is an optimistic, versioned compare-and-swap:
//! `UPDATE … SET version = version + 1 WHERE id = ? AND version = ?`
//! plus a status guard matching the state machine in
//! [`parrot_core::job::JobStatus`]. Zero affected rows with an existing id
//! means another writer got there first and the caller must retry against
//! the fresh record.

use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use parrot_core::job::{JobInput, JobStatus, JobType};
use parrot_core::pipeline::StageName;
use parrot_core::types::{JobId, ProfileId};

use crate::error::RepoError;
use crate::models::job::Job;
use crate::DbPool;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, job_type, profile_id, status, current_stage, progress_percent, \
    error_message, input, output_ref, version, \
    created_at, started_at, completed_at";

/// Provides CRUD and state-machine operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new `pending` job at version 0.
    ///
    /// The partial unique index over active `(profile_id, job_type)`
    /// pairs makes this fail if another active job exists; callers map
    /// that to a validation error.
    pub async fn submit(
        pool: &DbPool,
        profile_id: ProfileId,
        input: &JobInput,
    ) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (id, job_type, profile_id, status, progress_percent, input, version, created_at) \
             VALUES ($1, $2, $3, $4, 0, $5, 0, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(Uuid::new_v4())
            .bind(input.job_type())
            .bind(profile_id)
            .bind(JobStatus::Pending)
            .bind(Json(input.clone()))
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &DbPool, id: JobId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Whether an active (non-terminal) job exists for the pair.
    pub async fn active_exists(
        pool: &DbPool,
        profile_id: ProfileId,
        job_type: JobType,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(\
                 SELECT 1 FROM jobs \
                 WHERE profile_id = $1 AND job_type = $2 \
                   AND status IN ($3, $4, $5))",
        )
        .bind(profile_id)
        .bind(job_type)
        .bind(JobStatus::Pending)
        .bind(JobStatus::Queued)
        .bind(JobStatus::Processing)
        .fetch_one(pool)
        .await
    }

    /// Whether any active (non-terminal) job of any type exists for the
    /// profile. Gates profile deletion.
    pub async fn any_active_for(
        pool: &DbPool,
        profile_id: ProfileId,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(\
                 SELECT 1 FROM jobs \
                 WHERE profile_id = $1 AND status IN ($2, $3, $4))",
        )
        .bind(profile_id)
        .bind(JobStatus::Pending)
        .bind(JobStatus::Queued)
        .bind(JobStatus::Processing)
        .fetch_one(pool)
        .await
    }

    /// The most recent job of a type for a profile, if any.
    pub async fn latest_for(
        pool: &DbPool,
        profile_id: ProfileId,
        job_type: JobType,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE profile_id = $1 AND job_type = $2 \
             ORDER BY created_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(profile_id)
            .bind(job_type)
            .fetch_optional(pool)
            .await
    }

    /// Output reference of the most recent completed job of a type, if any.
    ///
    /// Used to locate the trained voice model/embedding a tts or cover
    /// job should run against.
    pub async fn latest_output_ref(
        pool: &DbPool,
        profile_id: ProfileId,
        job_type: JobType,
    ) -> Result<Option<String>, sqlx::Error> {
        let output: Option<Option<String>> = sqlx::query_scalar(
            "SELECT output_ref FROM jobs \
             WHERE profile_id = $1 AND job_type = $2 AND status = $3 \
             ORDER BY completed_at DESC LIMIT 1",
        )
        .bind(profile_id)
        .bind(job_type)
        .bind(JobStatus::Completed)
        .fetch_optional(pool)
        .await?;
        Ok(output.flatten())
    }

    /// Atomically claim the oldest `pending` job, moving it to `queued`.
    ///
    /// The single-statement update is the SQLite analogue of
    /// `SELECT … FOR UPDATE SKIP LOCKED`: only one worker can win the row.
    pub async fn claim_next(pool: &DbPool) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs SET status = $1, version = version + 1 \
             WHERE id = (\
                 SELECT id FROM jobs WHERE status = $2 \
                 ORDER BY created_at ASC LIMIT 1) \
             RETURNING {COLUMNS}"
        );
        let claimed = sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Queued)
            .bind(JobStatus::Pending)
            .fetch_optional(pool)
            .await?;
        if let Some(job) = &claimed {
            tracing::debug!(job_id = %job.id, job_type = %job.job_type, "claimed pending job");
        }
        Ok(claimed)
    }

    /// CAS `queued -> processing`, recording `started_at` and the first
    /// stage of the pipeline.
    pub async fn mark_processing(
        pool: &DbPool,
        id: JobId,
        expected_version: i64,
        first_stage: StageName,
    ) -> Result<Job, RepoError> {
        let query = format!(
            "UPDATE jobs SET status = $1, current_stage = $2, started_at = $3, \
                 version = version + 1 \
             WHERE id = $4 AND version = $5 AND status = $6 \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Processing)
            .bind(first_stage)
            .bind(Utc::now())
            .bind(id)
            .bind(expected_version)
            .bind(JobStatus::Queued)
            .fetch_optional(pool)
            .await?;
        Self::cas_outcome(pool, id, updated).await
    }

    /// CAS progress update while `processing`.
    ///
    /// Persists `MAX(progress_percent, new)` so successive reads of
    /// `progress_percent` are non-decreasing even if updates race.
    pub async fn update_progress(
        pool: &DbPool,
        id: JobId,
        expected_version: i64,
        stage: StageName,
        percent: u8,
    ) -> Result<Job, RepoError> {
        let query = format!(
            "UPDATE jobs SET current_stage = $1, \
                 progress_percent = MAX(progress_percent, $2), \
                 version = version + 1 \
             WHERE id = $3 AND version = $4 AND status = $5 \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Job>(&query)
            .bind(stage)
            .bind(percent as i64)
            .bind(id)
            .bind(expected_version)
            .bind(JobStatus::Processing)
            .fetch_optional(pool)
            .await?;
        Self::cas_outcome(pool, id, updated).await
    }

    /// CAS `processing -> completed`: progress becomes exactly 100 and
    /// the artifact reference is recorded.
    pub async fn complete(
        pool: &DbPool,
        id: JobId,
        expected_version: i64,
        output_ref: &str,
    ) -> Result<Job, RepoError> {
        let query = format!(
            "UPDATE jobs SET status = $1, progress_percent = 100, output_ref = $2, \
                 completed_at = $3, version = version + 1 \
             WHERE id = $4 AND version = $5 AND status = $6 \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Completed)
            .bind(output_ref)
            .bind(Utc::now())
            .bind(id)
            .bind(expected_version)
            .bind(JobStatus::Processing)
            .fetch_optional(pool)
            .await?;
        Self::cas_outcome(pool, id, updated).await
    }

    /// CAS `processing -> failed` with the error message.
    ///
    /// Earlier stages' artifacts are intentionally left in the blob store
    /// for diagnostics; nothing is rolled back.
    pub async fn fail(
        pool: &DbPool,
        id: JobId,
        expected_version: i64,
        error_message: &str,
    ) -> Result<Job, RepoError> {
        let query = format!(
            "UPDATE jobs SET status = $1, error_message = $2, completed_at = $3, \
                 version = version + 1 \
             WHERE id = $4 AND version = $5 AND status = $6 \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Failed)
            .bind(error_message)
            .bind(Utc::now())
            .bind(id)
            .bind(expected_version)
            .bind(JobStatus::Processing)
            .fetch_optional(pool)
            .await?;
        Self::cas_outcome(pool, id, updated).await
    }

    /// Distinguish a CAS miss from a missing row.
    async fn cas_outcome(
        pool: &DbPool,
        id: JobId,
        updated: Option<Job>,
    ) -> Result<Job, RepoError> {
        match updated {
            Some(job) => Ok(job),
            None => match Self::find_by_id(pool, id).await? {
                Some(_) => Err(RepoError::Conflict),
                None => Err(RepoError::NotFound { entity: "Job" }),
            },
        }
    }
}
