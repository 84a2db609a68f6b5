//! Job registry row model.

use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

use parrot_core::job::{JobInput, JobSnapshot, JobStatus, JobType};
use parrot_core::pipeline::StageName;
use parrot_core::types::{JobId, ProfileId, Timestamp};

/// A row from the `jobs` table.
///
/// `version` is the optimistic-locking counter: every write bumps it, and
/// every write names the version it expects to replace.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub profile_id: ProfileId,
    pub status: JobStatus,
    pub current_stage: Option<StageName>,
    pub progress_percent: i64,
    pub error_message: Option<String>,
    pub input: Json<JobInput>,
    pub output_ref: Option<String>,
    pub version: i64,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl From<Job> for JobSnapshot {
    fn from(job: Job) -> Self {
        JobSnapshot {
            id: job.id,
            job_type: job.job_type,
            status: job.status,
            current_stage: job.current_stage,
            progress_percent: job.progress_percent.clamp(0, 100) as u8,
            error_message: job.error_message,
            output_ref: job.output_ref,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}
