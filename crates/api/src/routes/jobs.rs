//! Handlers for the `/jobs` resource: submission, status polling, and
//! artifact download.

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parrot_core::error::CoreError;
use parrot_core::job::{JobInput, JobSnapshot, JobStatus};
use parrot_core::types::{JobId, ProfileId};
use parrot_core::validation::{self, MAX_SONG_BYTES};
use parrot_engine::collaborators::BlobStore;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(submit_job))
        .route(
            "/jobs/cover",
            // Twice the song cap: an oversized upload must reach the size
            // check and report the real limit, not die in the parser.
            post(submit_cover).layer(DefaultBodyLimit::max(2 * MAX_SONG_BYTES as usize)),
        )
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/artifact", get(get_artifact))
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// JSON submission body: a profile plus the type-tagged job input.
#[derive(Deserialize)]
pub struct SubmitJobRequest {
    pub profile_id: ProfileId,
    #[serde(flatten)]
    pub input: JobInput,
}

/// POST /api/v1/jobs
///
/// Submit an enrollment or TTS job. Cover jobs go through the multipart
/// `/jobs/cover` endpoint because they carry the source song.
async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    if matches!(request.input, JobInput::Cover { .. }) {
        return Err(AppError::BadRequest(
            "Cover jobs must be submitted via /jobs/cover with the song file".to_string(),
        ));
    }

    let job = state.registry.create_job(request.profile_id, request.input).await?;
    let snapshot: JobSnapshot = job.into();
    Ok((StatusCode::CREATED, Json(DataResponse { data: snapshot })))
}

/// POST /api/v1/jobs/cover
///
/// Multipart submission of a cover job. Fields: `profile_id`, `file`
/// (the source song), and optional `pitch_shift`, `vocal_volume`,
/// `instrumental_volume`. The song is stored before the job record is
/// created; on rejection the stored blob is removed again.
async fn submit_cover(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut profile_id: Option<ProfileId> = None;
    let mut pitch_shift: i64 = 0;
    let mut vocal_volume: f64 = 1.0;
    let mut instrumental_volume: f64 = 1.0;
    let mut file: Option<(String, axum::body::Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("profile_id") => {
                let text = field.text().await.map_err(multipart_error)?;
                profile_id = Some(text.parse().map_err(|_| {
                    AppError::BadRequest(format!("Invalid profile_id: {text}"))
                })?);
            }
            Some("pitch_shift") => {
                pitch_shift = parse_field(field, "pitch_shift").await?;
            }
            Some("vocal_volume") => {
                vocal_volume = parse_field(field, "vocal_volume").await?;
            }
            Some("instrumental_volume") => {
                instrumental_volume = parse_field(field, "instrumental_volume").await?;
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((filename, bytes));
            }
            _ => {}
        }
    }

    let profile_id =
        profile_id.ok_or_else(|| AppError::BadRequest("Missing profile_id field".into()))?;
    let (filename, bytes) =
        file.ok_or_else(|| AppError::BadRequest("Missing file field".into()))?;

    validation::validate_audio_upload(&filename, bytes.len() as u64, MAX_SONG_BYTES)?;
    validation::validate_pitch_shift(pitch_shift)?;

    let extension = std::path::Path::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin")
        .to_ascii_lowercase();
    let song_ref = format!("uploads/{}.{extension}", Uuid::new_v4());
    state.blobs.put(&song_ref, &bytes).await?;

    let input = JobInput::Cover {
        song_ref: song_ref.clone(),
        original_filename: filename,
        pitch_shift,
        vocal_volume,
        instrumental_volume,
    };
    let job = match state.registry.create_job(profile_id, input).await {
        Ok(job) => job,
        Err(e) => {
            // Rejected submission must not leak the uploaded song.
            if let Err(cleanup) = state.blobs.delete(&song_ref).await {
                tracing::warn!(song_ref, error = %cleanup, "Orphaned song cleanup failed");
            }
            return Err(e.into());
        }
    };

    let snapshot: JobSnapshot = job.into();
    Ok((StatusCode::CREATED, Json(DataResponse { data: snapshot })))
}

async fn parse_field<T: std::str::FromStr>(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<T, AppError> {
    let text = field.text().await.map_err(multipart_error)?;
    text.parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid {name}: {text}")))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Malformed multipart body: {e}"))
}

// ---------------------------------------------------------------------------
// Status and artifact
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// The pollable status snapshot. Terminal snapshots are stable across
/// reads.
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.registry.snapshot(id).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// Where a finished artifact can be fetched from. The blob store serves
/// the bytes; this endpoint only resolves the reference.
#[derive(Serialize)]
pub struct ArtifactLocation {
    pub download_url: String,
}

/// GET /api/v1/jobs/{id}/artifact
///
/// Resolve the finished output to a download URL. 409 unless the job is
/// `completed`.
async fn get_artifact(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.registry.get_job(id).await?;
    if job.status != JobStatus::Completed {
        return Err(CoreError::Conflict(format!(
            "Job is {}, artifact is only available once completed",
            job.status
        ))
        .into());
    }
    let output_ref = job.output_ref.ok_or_else(|| {
        AppError::InternalError(format!("completed job {id} has no output reference"))
    })?;
    if !state.blobs.exists(&output_ref).await? {
        return Err(parrot_engine::collaborators::CollabError::NotFound(output_ref).into());
    }
    let download_url = state.blobs.download_url(&output_ref)?;

    Ok(Json(DataResponse {
        data: ArtifactLocation { download_url },
    }))
}
