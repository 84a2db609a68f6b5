//! Handlers for the `/profiles` resource: voice profiles and their
//! uploaded samples.

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parrot_core::error::CoreError;
use parrot_core::job::{JobSnapshot, JobType, SampleType};
use parrot_core::types::{ProfileId, SampleId};
use parrot_core::validation::{self, MAX_SAMPLE_BYTES};
use parrot_db::models::profile::VoiceProfile;
use parrot_db::models::sample::{NewSample, VoiceSample};
use parrot_db::repositories::{JobRepo, ProfileRepo, SampleRepo};
use parrot_engine::collaborators::{AudioInspector, BlobStore};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

const MAX_PROFILE_NAME_CHARS: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profiles", post(create_profile))
        .route("/profiles/{id}", get(get_profile).delete(delete_profile))
        .route(
            "/profiles/{id}/samples",
            post(upload_sample)
                .get(list_samples)
                // Twice the sample cap: an oversized upload must reach the
                // size check and report the real limit.
                .layer(DefaultBodyLimit::max(2 * MAX_SAMPLE_BYTES as usize)),
        )
        .route(
            "/profiles/{id}/samples/{sample_id}",
            axum::routing::delete(delete_sample),
        )
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn find_profile(state: &AppState, id: ProfileId) -> AppResult<VoiceProfile> {
    ProfileRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "VoiceProfile",
            id,
        }))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Malformed multipart body: {e}"))
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateProfileRequest {
    pub name: String,
}

/// Profile detail with per-type sample counts and totals and the most
/// recent enrollment job of each type.
#[derive(Serialize)]
pub struct ProfileDetail {
    #[serde(flatten)]
    pub profile: VoiceProfile,
    pub speaking_samples: i64,
    pub singing_samples: i64,
    pub speaking_total_seconds: f64,
    pub singing_total_seconds: f64,
    pub latest_speaking_job: Option<JobSnapshot>,
    pub latest_singing_job: Option<JobSnapshot>,
}

/// POST /api/v1/profiles
///
/// Create a voice profile. Both enrollment statuses start at `pending`.
async fn create_profile(
    State(state): State<AppState>,
    Json(input): Json<CreateProfileRequest>,
) -> AppResult<impl IntoResponse> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("Profile name cannot be empty".into()).into());
    }
    if name.chars().count() > MAX_PROFILE_NAME_CHARS {
        return Err(CoreError::Validation(format!(
            "Profile name must not exceed {MAX_PROFILE_NAME_CHARS} characters"
        ))
        .into());
    }

    let profile = ProfileRepo::create(&state.pool, name).await?;
    tracing::info!(profile_id = %profile.id, "Voice profile created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: profile })))
}

/// GET /api/v1/profiles/{id}
async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<ProfileId>,
) -> AppResult<impl IntoResponse> {
    let profile = find_profile(&state, id).await?;
    let speaking_samples = SampleRepo::count_for(&state.pool, id, SampleType::Speaking).await?;
    let singing_samples = SampleRepo::count_for(&state.pool, id, SampleType::Singing).await?;
    let speaking_total_seconds =
        SampleRepo::total_duration(&state.pool, id, SampleType::Speaking).await?;
    let singing_total_seconds =
        SampleRepo::total_duration(&state.pool, id, SampleType::Singing).await?;
    let latest_speaking_job =
        JobRepo::latest_for(&state.pool, id, JobType::EnrollSpeaking).await?;
    let latest_singing_job = JobRepo::latest_for(&state.pool, id, JobType::EnrollSinging).await?;

    Ok(Json(DataResponse {
        data: ProfileDetail {
            profile,
            speaking_samples,
            singing_samples,
            speaking_total_seconds,
            singing_total_seconds,
            latest_speaking_job: latest_speaking_job.map(Into::into),
            latest_singing_job: latest_singing_job.map(Into::into),
        },
    }))
}

/// DELETE /api/v1/profiles/{id}
///
/// Rejected with 409 while any job for the profile is in flight. Sample
/// blobs are removed; sample and job rows cascade with the profile.
async fn delete_profile(
    State(state): State<AppState>,
    Path(id): Path<ProfileId>,
) -> AppResult<impl IntoResponse> {
    find_profile(&state, id).await?;
    if JobRepo::any_active_for(&state.pool, id).await? {
        return Err(CoreError::Conflict(
            "Cannot delete a profile while jobs are in progress".to_string(),
        )
        .into());
    }

    let mut samples = SampleRepo::list_for(&state.pool, id, SampleType::Speaking).await?;
    samples.extend(SampleRepo::list_for(&state.pool, id, SampleType::Singing).await?);
    for sample in &samples {
        if let Err(e) = state.blobs.delete(&sample.file_ref).await {
            tracing::warn!(sample_id = %sample.id, error = %e, "Sample blob cleanup failed");
        }
    }
    ProfileRepo::delete(&state.pool, id).await?;

    tracing::info!(profile_id = %id, "Voice profile deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// POST /api/v1/profiles/{id}/samples
///
/// Multipart upload of one voice sample. Fields: `sample_type`
/// (`speaking` or `singing`) and `file`. The file is validated
/// (extension, size, probed duration), stored in the blob store, and
/// recorded against the profile.
async fn upload_sample(
    State(state): State<AppState>,
    Path(id): Path<ProfileId>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    find_profile(&state, id).await?;

    let mut sample_type: Option<SampleType> = None;
    let mut file: Option<(String, axum::body::Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("sample_type") => {
                let text = field.text().await.map_err(multipart_error)?;
                sample_type =
                    Some(serde_json::from_value(serde_json::Value::String(text.clone()))
                        .map_err(|_| {
                            AppError::Core(CoreError::Validation(format!(
                                "Unknown sample_type: {text}"
                            )))
                        })?);
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((filename, bytes));
            }
            _ => {}
        }
    }

    let sample_type =
        sample_type.ok_or_else(|| AppError::BadRequest("Missing sample_type field".into()))?;
    let (filename, bytes) =
        file.ok_or_else(|| AppError::BadRequest("Missing file field".into()))?;

    validation::validate_audio_upload(&filename, bytes.len() as u64, MAX_SAMPLE_BYTES)?;
    let info = state.inspector.inspect(&filename, &bytes)?;
    if let Some(duration) = info.duration_seconds {
        validation::validate_sample_duration(duration)?;
    }

    // Key by a fresh UUID; the original name only survives as metadata.
    let extension = std::path::Path::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin")
        .to_ascii_lowercase();
    let file_ref = format!("samples/{id}/{}.{extension}", Uuid::new_v4());
    state.blobs.put(&file_ref, &bytes).await?;

    let sample = SampleRepo::insert(
        &state.pool,
        &NewSample {
            profile_id: id,
            sample_type,
            original_filename: filename,
            file_ref,
            file_size_bytes: bytes.len() as i64,
            duration_seconds: info.duration_seconds.unwrap_or(0.0),
            sample_rate: info.sample_rate.map(i64::from),
            channels: info.channels.map(i64::from),
        },
    )
    .await?;

    tracing::info!(
        profile_id = %id,
        sample_id = %sample.id,
        sample_type = %sample_type,
        size_bytes = sample.file_size_bytes,
        "Voice sample uploaded",
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: sample })))
}

/// GET /api/v1/profiles/{id}/samples
async fn list_samples(
    State(state): State<AppState>,
    Path(id): Path<ProfileId>,
) -> AppResult<impl IntoResponse> {
    find_profile(&state, id).await?;

    let mut samples: Vec<VoiceSample> =
        SampleRepo::list_for(&state.pool, id, SampleType::Speaking).await?;
    samples.extend(SampleRepo::list_for(&state.pool, id, SampleType::Singing).await?);

    Ok(Json(DataResponse { data: samples }))
}

/// DELETE /api/v1/profiles/{id}/samples/{sample_id}
///
/// Rejected with 409 while an enrollment job that would consume the
/// sample is in flight.
async fn delete_sample(
    State(state): State<AppState>,
    Path((id, sample_id)): Path<(ProfileId, SampleId)>,
) -> AppResult<impl IntoResponse> {
    find_profile(&state, id).await?;
    let sample = SampleRepo::find_by_id(&state.pool, sample_id)
        .await?
        .filter(|s| s.profile_id == id)
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "VoiceSample",
            id: sample_id,
        }))?;

    let enroll_type = sample.sample_type.enroll_job_type();
    if JobRepo::active_exists(&state.pool, id, enroll_type).await? {
        return Err(CoreError::Conflict(
            "Cannot delete a sample while enrollment is in progress".to_string(),
        )
        .into());
    }

    state.blobs.delete(&sample.file_ref).await?;
    SampleRepo::delete(&state.pool, sample_id).await?;

    tracing::info!(profile_id = %id, sample_id = %sample_id, "Voice sample deleted");
    Ok(StatusCode::NO_CONTENT)
}
