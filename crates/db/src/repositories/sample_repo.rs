//! Repository for the `voice_samples` table.

use chrono::Utc;
use uuid::Uuid;

use parrot_core::job::SampleType;
use parrot_core::types::{ProfileId, SampleId};

use crate::models::sample::{NewSample, VoiceSample};
use crate::DbPool;

const COLUMNS: &str = "\
    id, profile_id, sample_type, original_filename, file_ref, \
    file_size_bytes, duration_seconds, sample_rate, channels, uploaded_at";

/// Provides CRUD operations for uploaded voice samples.
pub struct SampleRepo;

impl SampleRepo {
    /// Insert a newly uploaded sample.
    pub async fn insert(pool: &DbPool, sample: &NewSample) -> Result<VoiceSample, sqlx::Error> {
        let query = format!(
            "INSERT INTO voice_samples \
                 (id, profile_id, sample_type, original_filename, file_ref, \
                  file_size_bytes, duration_seconds, sample_rate, channels, uploaded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VoiceSample>(&query)
            .bind(Uuid::new_v4())
            .bind(sample.profile_id)
            .bind(sample.sample_type)
            .bind(&sample.original_filename)
            .bind(&sample.file_ref)
            .bind(sample.file_size_bytes)
            .bind(sample.duration_seconds)
            .bind(sample.sample_rate)
            .bind(sample.channels)
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    /// Find a sample by its ID.
    pub async fn find_by_id(
        pool: &DbPool,
        id: SampleId,
    ) -> Result<Option<VoiceSample>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM voice_samples WHERE id = $1");
        sqlx::query_as::<_, VoiceSample>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All samples of a type for a profile, oldest first.
    pub async fn list_for(
        pool: &DbPool,
        profile_id: ProfileId,
        sample_type: SampleType,
    ) -> Result<Vec<VoiceSample>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM voice_samples \
             WHERE profile_id = $1 AND sample_type = $2 \
             ORDER BY uploaded_at ASC"
        );
        sqlx::query_as::<_, VoiceSample>(&query)
            .bind(profile_id)
            .bind(sample_type)
            .fetch_all(pool)
            .await
    }

    /// Number of samples of a type for a profile.
    pub async fn count_for(
        pool: &DbPool,
        profile_id: ProfileId,
        sample_type: SampleType,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM voice_samples WHERE profile_id = $1 AND sample_type = $2",
        )
        .bind(profile_id)
        .bind(sample_type)
        .fetch_one(pool)
        .await
    }

    /// Total recorded duration of a profile's samples of a type.
    pub async fn total_duration(
        pool: &DbPool,
        profile_id: ProfileId,
        sample_type: SampleType,
    ) -> Result<f64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(duration_seconds), 0.0) FROM voice_samples \
             WHERE profile_id = $1 AND sample_type = $2",
        )
        .bind(profile_id)
        .bind(sample_type)
        .fetch_one(pool)
        .await
    }

    /// Delete a sample row. Returns whether a row was removed.
    pub async fn delete(pool: &DbPool, id: SampleId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM voice_samples WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
