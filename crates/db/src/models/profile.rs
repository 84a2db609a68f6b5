//! Voice profile row model.

use serde::Serialize;
use sqlx::FromRow;

use parrot_core::job::EnrollStatus;
use parrot_core::types::{ProfileId, Timestamp};

/// A row from the `voice_profiles` table.
///
/// The two per-type status fields are written exclusively by the
/// orchestration layer as a side effect of enroll jobs.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VoiceProfile {
    pub id: ProfileId,
    pub name: String,
    pub speaking_status: EnrollStatus,
    pub singing_status: EnrollStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
