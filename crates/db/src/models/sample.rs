//! Voice sample row model.

use serde::Serialize;
use sqlx::FromRow;

use parrot_core::job::SampleType;
use parrot_core::types::{ProfileId, SampleId, Timestamp};

/// A row from the `voice_samples` table. Immutable after upload.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VoiceSample {
    pub id: SampleId,
    pub profile_id: ProfileId,
    pub sample_type: SampleType,
    pub original_filename: String,
    pub file_ref: String,
    pub file_size_bytes: i64,
    pub duration_seconds: f64,
    pub sample_rate: Option<i64>,
    pub channels: Option<i64>,
    pub uploaded_at: Timestamp,
}

/// Insert DTO for a newly uploaded sample.
#[derive(Debug, Clone)]
pub struct NewSample {
    pub profile_id: ProfileId,
    pub sample_type: SampleType,
    pub original_filename: String,
    pub file_ref: String,
    pub file_size_bytes: i64,
    pub duration_seconds: f64,
    pub sample_rate: Option<i64>,
    pub channels: Option<i64>,
}
