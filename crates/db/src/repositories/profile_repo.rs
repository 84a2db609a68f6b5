//! Repository for the `voice_profiles` table.

use chrono::Utc;
use uuid::Uuid;

use parrot_core::job::{EnrollStatus, JobType};
use parrot_core::types::ProfileId;

use crate::models::profile::VoiceProfile;
use crate::DbPool;

const COLUMNS: &str =
    "id, name, speaking_status, singing_status, created_at, updated_at";

/// Provides CRUD operations for voice profiles.
pub struct ProfileRepo;

impl ProfileRepo {
    /// Create a profile with both enrollment statuses at `pending`.
    pub async fn create(pool: &DbPool, name: &str) -> Result<VoiceProfile, sqlx::Error> {
        let query = format!(
            "INSERT INTO voice_profiles (id, name, speaking_status, singing_status, created_at, updated_at) \
             VALUES ($1, $2, $3, $3, $4, $4) \
             RETURNING {COLUMNS}"
        );
        let now = Utc::now();
        sqlx::query_as::<_, VoiceProfile>(&query)
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(EnrollStatus::Pending)
            .bind(now)
            .fetch_one(pool)
            .await
    }

    /// Find a profile by its ID.
    pub async fn find_by_id(
        pool: &DbPool,
        id: ProfileId,
    ) -> Result<Option<VoiceProfile>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM voice_profiles WHERE id = $1");
        sqlx::query_as::<_, VoiceProfile>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Delete a profile row; sample and job rows cascade. Returns whether
    /// a row was removed.
    pub async fn delete(pool: &DbPool, id: ProfileId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM voice_profiles WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the enrollment status column matching the enroll job type.
    ///
    /// `job_type` must be `EnrollSpeaking` or `EnrollSinging`; other types
    /// have no status column and the call is a no-op returning the row.
    pub async fn set_enroll_status(
        pool: &DbPool,
        id: ProfileId,
        job_type: JobType,
        status: EnrollStatus,
    ) -> Result<Option<VoiceProfile>, sqlx::Error> {
        let column = match job_type {
            JobType::EnrollSpeaking => "speaking_status",
            JobType::EnrollSinging => "singing_status",
            _ => return Self::find_by_id(pool, id).await,
        };
        let query = format!(
            "UPDATE voice_profiles SET {column} = $1, updated_at = $2 \
             WHERE id = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VoiceProfile>(&query)
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
