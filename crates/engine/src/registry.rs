//! The versioned job registry facade.
//!
//! Single write path for job records: submission validation, the claim
//! handshake, progress accumulation, and terminal transitions all go
//! through here. Writes use the repository's compare-and-swap methods
//! and retry on version conflicts against a fresh read, so concurrent
//! reporters cannot lose updates.

use parrot_core::error::CoreError;
use parrot_core::job::{EnrollStatus, JobInput, JobSnapshot, JobStatus, JobType, SampleType};
use parrot_core::pipeline::{self, StageName};
use parrot_core::types::{JobId, ProfileId};
use parrot_core::validation;
use parrot_db::error::{is_unique_violation, RepoError};
use parrot_db::models::job::Job;
use parrot_db::models::profile::VoiceProfile;
use parrot_db::repositories::{JobRepo, ProfileRepo, SampleRepo};
use parrot_db::DbPool;

use crate::error::EngineError;

/// Upper bound on fetch-then-CAS retries for one logical write.
const MAX_CAS_ATTEMPTS: u32 = 5;

/// Validates submissions and owns every job-record transition.
#[derive(Clone)]
pub struct JobRegistry {
    pool: DbPool,
}

impl JobRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    // -- submission -----------------------------------------------------------

    /// Validate and create a job in `pending` state.
    ///
    /// Checks, in order: profile existence, type-specific input rules,
    /// type-specific readiness preconditions, and the single-active-job
    /// rule. The partial unique index backs up the last check against
    /// concurrent submissions.
    pub async fn create_job(
        &self,
        profile_id: ProfileId,
        input: JobInput,
    ) -> Result<Job, EngineError> {
        let profile = self.require_profile(profile_id).await?;

        match &input {
            JobInput::EnrollSpeaking => {
                self.require_samples(profile_id, SampleType::Speaking).await?;
            }
            JobInput::EnrollSinging => {
                self.require_samples(profile_id, SampleType::Singing).await?;
            }
            JobInput::Tts { text } => {
                validation::validate_tts_text(text)?;
                if profile.speaking_status != EnrollStatus::Ready {
                    return Err(CoreError::Validation(
                        "Speaking voice is not enrolled for this profile".to_string(),
                    )
                    .into());
                }
            }
            JobInput::Cover { pitch_shift, .. } => {
                validation::validate_pitch_shift(*pitch_shift)?;
                if profile.singing_status != EnrollStatus::Ready {
                    return Err(CoreError::Validation(
                        "Singing voice is not enrolled for this profile".to_string(),
                    )
                    .into());
                }
            }
        }

        let job_type = input.job_type();
        if JobRepo::active_exists(&self.pool, profile_id, job_type).await? {
            return Err(duplicate_active(job_type).into());
        }

        match JobRepo::submit(&self.pool, profile_id, &input).await {
            Ok(job) => {
                tracing::info!(
                    job_id = %job.id,
                    profile_id = %profile_id,
                    job_type = %job_type,
                    "Job submitted",
                );
                Ok(job)
            }
            // Lost the race between the pre-check and the insert.
            Err(e) if is_unique_violation(&e) => Err(duplicate_active(job_type).into()),
            Err(e) => Err(e.into()),
        }
    }

    // -- reads ----------------------------------------------------------------

    pub async fn get_job(&self, job_id: JobId) -> Result<Job, EngineError> {
        JobRepo::find_by_id(&self.pool, job_id)
            .await?
            .ok_or_else(|| {
                EngineError::Core(CoreError::NotFound {
                    entity: "Job",
                    id: job_id,
                })
            })
    }

    /// Current state of a job as the polling surface exposes it.
    pub async fn snapshot(&self, job_id: JobId) -> Result<JobSnapshot, EngineError> {
        Ok(self.get_job(job_id).await?.into())
    }

    // -- executor transitions -------------------------------------------------

    /// Claim the oldest pending job for a worker, if any.
    pub async fn claim_next(&self) -> Result<Option<Job>, EngineError> {
        Ok(JobRepo::claim_next(&self.pool).await?)
    }

    /// Move a claimed job to `processing` at its pipeline's first stage.
    ///
    /// For enrollment jobs the profile's matching status flips to
    /// `enrolling` at the same time.
    pub async fn begin_processing(&self, job: &Job) -> Result<Job, EngineError> {
        let first_stage = pipeline::stages(job.job_type)[0].stage;
        let updated =
            JobRepo::mark_processing(&self.pool, job.id, job.version, first_stage).await?;
        self.mirror_enroll_status(&updated, EnrollStatus::Enrolling)
            .await?;
        tracing::info!(
            job_id = %job.id,
            job_type = %job.job_type,
            stage = %first_stage,
            "Job processing started",
        );
        Ok(updated)
    }

    /// Record intra-stage progress.
    ///
    /// The overall percentage is the weighted accumulation of finished
    /// stages plus the fraction of the current one. Reports that arrive
    /// after the job left `processing` are dropped.
    pub async fn report_progress(
        &self,
        job_id: JobId,
        stage: StageName,
        fraction: f64,
    ) -> Result<(), EngineError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let job = self.get_job(job_id).await?;
            if job.status != JobStatus::Processing {
                return Ok(());
            }
            let percent = self.percent_for(job.job_type, stage, fraction)?;
            match JobRepo::update_progress(&self.pool, job_id, job.version, stage, percent).await
            {
                Ok(_) => return Ok(()),
                Err(RepoError::Conflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(RepoError::Conflict.into())
    }

    /// Terminal success: progress 100, artifact recorded, enrollment
    /// status mirrored to `ready`.
    pub async fn complete_job(&self, job_id: JobId, output_ref: &str) -> Result<Job, EngineError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let job = self.get_job(job_id).await?;
            match JobRepo::complete(&self.pool, job_id, job.version, output_ref).await {
                Ok(updated) => {
                    self.mirror_enroll_status(&updated, EnrollStatus::Ready)
                        .await?;
                    tracing::info!(
                        job_id = %job_id,
                        output_ref,
                        "Job completed",
                    );
                    return Ok(updated);
                }
                Err(RepoError::Conflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(RepoError::Conflict.into())
    }

    /// Terminal failure: message recorded, enrollment status mirrored to
    /// `failed`. Idempotent if the job is already terminal.
    pub async fn fail_job(&self, job_id: JobId, message: &str) -> Result<Job, EngineError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let job = self.get_job(job_id).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            match JobRepo::fail(&self.pool, job_id, job.version, message).await {
                Ok(updated) => {
                    self.mirror_enroll_status(&updated, EnrollStatus::Failed)
                        .await?;
                    tracing::warn!(
                        job_id = %job_id,
                        error = message,
                        "Job failed",
                    );
                    return Ok(updated);
                }
                Err(RepoError::Conflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(RepoError::Conflict.into())
    }

    // -- helpers --------------------------------------------------------------

    async fn require_profile(&self, profile_id: ProfileId) -> Result<VoiceProfile, EngineError> {
        ProfileRepo::find_by_id(&self.pool, profile_id)
            .await?
            .ok_or_else(|| {
                EngineError::Core(CoreError::NotFound {
                    entity: "VoiceProfile",
                    id: profile_id,
                })
            })
    }

    async fn require_samples(
        &self,
        profile_id: ProfileId,
        sample_type: SampleType,
    ) -> Result<(), EngineError> {
        let count = SampleRepo::count_for(&self.pool, profile_id, sample_type).await?;
        validation::validate_enroll_sample_count(sample_type, count)?;
        Ok(())
    }

    fn percent_for(
        &self,
        job_type: JobType,
        stage: StageName,
        fraction: f64,
    ) -> Result<u8, EngineError> {
        let completed = pipeline::completed_weight_before(job_type, stage);
        let weight = pipeline::weight_of(job_type, stage);
        match (completed, weight) {
            (Some(completed), Some(weight)) => {
                Ok(pipeline::overall_percent(completed, weight, fraction))
            }
            _ => Err(EngineError::Core(CoreError::Internal(format!(
                "stage {stage} is not part of the {job_type} pipeline"
            )))),
        }
    }

    async fn mirror_enroll_status(
        &self,
        job: &Job,
        status: EnrollStatus,
    ) -> Result<(), EngineError> {
        if matches!(job.job_type, JobType::EnrollSpeaking | JobType::EnrollSinging) {
            ProfileRepo::set_enroll_status(&self.pool, job.profile_id, job.job_type, status)
                .await?;
        }
        Ok(())
    }
}

/// Rejected synchronously at submission; no job record is created.
fn duplicate_active(job_type: JobType) -> CoreError {
    CoreError::Validation(format!(
        "A {job_type} job is already in progress for this profile"
    ))
}
