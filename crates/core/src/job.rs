//! Job-level enumerations, typed inputs, and the pollable snapshot DTO.
//!
//! Status and type values are closed enums validated at construction
//! (deserialization) time; nothing in the workspace compares free-form
//! status strings.

use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

/// The four pipeline families the platform runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobType {
    EnrollSpeaking,
    EnrollSinging,
    Tts,
    Cover,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::EnrollSpeaking => "enroll_speaking",
            JobType::EnrollSinging => "enroll_singing",
            JobType::Tts => "tts",
            JobType::Cover => "cover",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle status.
///
/// `Completed` and `Failed` are terminal; no further transitions occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the job still counts against the single-active-job
    /// invariant for its `(profile, job_type)` pair.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Valid target states reachable from `self`.
    pub fn valid_transitions(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Pending => &[JobStatus::Queued],
            JobStatus::Queued => &[JobStatus::Processing],
            JobStatus::Processing => &[JobStatus::Completed, JobStatus::Failed],
            JobStatus::Completed | JobStatus::Failed => &[],
        }
    }

    pub fn can_transition(&self, to: JobStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of an uploaded voice sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SampleType {
    Speaking,
    Singing,
}

impl SampleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleType::Speaking => "speaking",
            SampleType::Singing => "singing",
        }
    }

    /// The enrollment job type that consumes samples of this kind.
    pub fn enroll_job_type(&self) -> JobType {
        match self {
            SampleType::Speaking => JobType::EnrollSpeaking,
            SampleType::Singing => JobType::EnrollSinging,
        }
    }
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-type enrollment status on a voice profile.
///
/// Owned exclusively by the orchestration layer: `Enrolling` is set when
/// the matching enroll job reaches `processing`, `Ready`/`Failed` when it
/// reaches a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EnrollStatus {
    Pending,
    Enrolling,
    Ready,
    Failed,
}

fn default_volume() -> f64 {
    1.0
}

/// Type-specific job input, persisted as JSON on the job record.
///
/// Enrollment jobs carry no payload of their own: their samples are
/// already uploaded and associated with the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum JobInput {
    EnrollSpeaking,
    EnrollSinging,
    Tts {
        text: String,
    },
    Cover {
        /// Blob-store key of the uploaded source song.
        song_ref: String,
        original_filename: String,
        /// Semitones, -12 to +12.
        #[serde(default)]
        pitch_shift: i64,
        #[serde(default = "default_volume")]
        vocal_volume: f64,
        #[serde(default = "default_volume")]
        instrumental_volume: f64,
    },
}

impl JobInput {
    pub fn job_type(&self) -> JobType {
        match self {
            JobInput::EnrollSpeaking => JobType::EnrollSpeaking,
            JobInput::EnrollSinging => JobType::EnrollSinging,
            JobInput::Tts { .. } => JobType::Tts,
            JobInput::Cover { .. } => JobType::Cover,
        }
    }
}

/// The full current state of a job as exposed by the Status Publisher.
///
/// Read-only: successive reads of a terminal job are identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub current_stage: Option<crate::pipeline::StageName>,
    pub progress_percent: u8,
    pub error_message: Option<String>,
    pub output_ref: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl JobSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
