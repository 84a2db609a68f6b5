//! HTTP surface tests over the full router.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{
    delete, expect_status, get, post_json, post_multipart, spawn_app, spawn_app_with_duration,
    Part, TestApp,
};
use parrot_core::job::{EnrollStatus, JobType};
use parrot_db::repositories::{JobRepo, ProfileRepo};

async fn create_profile(app: &TestApp, name: &str) -> String {
    let response = post_json(&app.app, "/api/v1/profiles", json!({ "name": name })).await;
    let body = expect_status(response, StatusCode::CREATED).await;
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn upload_sample(app: &TestApp, profile_id: &str, sample_type: &str, filename: &str) {
    let response = post_multipart(
        &app.app,
        &format!("/api/v1/profiles/{profile_id}/samples"),
        &[
            ("sample_type", Part::Text(sample_type)),
            (
                "file",
                Part::File {
                    filename,
                    bytes: b"RIFF fake audio",
                },
            ),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

async fn submit_enroll(app: &TestApp, profile_id: &str) -> axum::response::Response {
    post_json(
        &app.app,
        "/api/v1/jobs",
        json!({ "profile_id": profile_id, "job_type": "enroll_speaking" }),
    )
    .await
}

// ---------------------------------------------------------------------------
// Health and profiles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_ok() {
    let app = spawn_app().await;
    let response = get(&app.app, "/health").await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db_healthy"], true);
}

#[tokio::test]
async fn create_and_fetch_profile() {
    let app = spawn_app().await;
    let profile_id = create_profile(&app, "narrator").await;

    let response = get(&app.app, &format!("/api/v1/profiles/{profile_id}")).await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["name"], "narrator");
    assert_eq!(body["data"]["speaking_status"], "pending");
    assert_eq!(body["data"]["singing_status"], "pending");
    assert_eq!(body["data"]["speaking_samples"], 0);
    assert_eq!(body["data"]["singing_samples"], 0);
    assert_eq!(body["data"]["speaking_total_seconds"], 0.0);
    assert_eq!(body["data"]["singing_total_seconds"], 0.0);
    assert!(body["data"]["latest_speaking_job"].is_null());
    assert!(body["data"]["latest_singing_job"].is_null());
}

#[tokio::test]
async fn blank_profile_name_is_rejected() {
    let app = spawn_app().await;
    let response = post_json(&app.app, "/api/v1/profiles", json!({ "name": "   " })).await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_profile_is_404() {
    let app = spawn_app().await;
    let response = get(
        &app.app,
        &format!("/api/v1/profiles/{}", uuid::Uuid::new_v4()),
    )
    .await;
    let body = expect_status(response, StatusCode::NOT_FOUND).await;
    assert_eq!(body["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Sample uploads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn uploaded_sample_is_stored_listed_and_counted() {
    let app = spawn_app().await;
    let profile_id = create_profile(&app, "narrator").await;
    upload_sample(&app, &profile_id, "speaking", "take1.wav").await;

    let response = get(&app.app, &format!("/api/v1/profiles/{profile_id}/samples")).await;
    let body = expect_status(response, StatusCode::OK).await;
    let samples = body["data"].as_array().unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0]["original_filename"], "take1.wav");
    assert_eq!(samples[0]["sample_type"], "speaking");
    let file_ref = samples[0]["file_ref"].as_str().unwrap();
    assert!(app.blobs.contains(file_ref));

    let response = get(&app.app, &format!("/api/v1/profiles/{profile_id}")).await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["speaking_samples"], 1);
    assert_eq!(body["data"]["speaking_total_seconds"], 10.0);
    assert_eq!(body["data"]["singing_total_seconds"], 0.0);
}

#[tokio::test]
async fn unsupported_upload_extension_is_rejected() {
    let app = spawn_app().await;
    let profile_id = create_profile(&app, "narrator").await;

    let response = post_multipart(
        &app.app,
        &format!("/api/v1/profiles/{profile_id}/samples"),
        &[
            ("sample_type", Part::Text("speaking")),
            (
                "file",
                Part::File {
                    filename: "notes.txt",
                    bytes: b"hello",
                },
            ),
        ],
    )
    .await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn too_short_sample_is_rejected() {
    let app = spawn_app_with_duration(0.2).await;
    let profile_id = create_profile(&app, "narrator").await;

    let response = post_multipart(
        &app.app,
        &format!("/api/v1/profiles/{profile_id}/samples"),
        &[
            ("sample_type", Part::Text("speaking")),
            (
                "file",
                Part::File {
                    filename: "blip.wav",
                    bytes: b"RIFF",
                },
            ),
        ],
    )
    .await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["error"].as_str().unwrap().contains("at least 0.5"));
}

#[tokio::test]
async fn unknown_sample_type_is_rejected() {
    let app = spawn_app().await;
    let profile_id = create_profile(&app, "narrator").await;

    let response = post_multipart(
        &app.app,
        &format!("/api/v1/profiles/{profile_id}/samples"),
        &[
            ("sample_type", Part::Text("whistling")),
            (
                "file",
                Part::File {
                    filename: "a.wav",
                    bytes: b"RIFF",
                },
            ),
        ],
    )
    .await;
    expect_status(response, StatusCode::BAD_REQUEST).await;
}

// ---------------------------------------------------------------------------
// Job submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enroll_without_enough_samples_is_rejected() {
    let app = spawn_app().await;
    let profile_id = create_profile(&app, "narrator").await;
    upload_sample(&app, &profile_id, "speaking", "a.wav").await;
    upload_sample(&app, &profile_id, "speaking", "b.wav").await;

    let response = submit_enroll(&app, &profile_id).await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["error"].as_str().unwrap().contains("at least 3"));
}

#[tokio::test]
async fn enroll_submission_creates_pending_job() {
    let app = spawn_app().await;
    let profile_id = create_profile(&app, "narrator").await;
    for name in ["a.wav", "b.wav", "c.wav"] {
        upload_sample(&app, &profile_id, "speaking", name).await;
    }

    let response = submit_enroll(&app, &profile_id).await;
    let body = expect_status(response, StatusCode::CREATED).await;
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["job_type"], "enroll_speaking");
    assert_eq!(body["data"]["progress_percent"], 0);

    // The snapshot endpoint returns the same state.
    let job_id = body["data"]["id"].as_str().unwrap().to_string();
    let response = get(&app.app, &format!("/api/v1/jobs/{job_id}")).await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["status"], "pending");

    // The profile detail now references the enrollment job.
    let response = get(&app.app, &format!("/api/v1/profiles/{profile_id}")).await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["latest_speaking_job"]["id"], job_id);
    assert!(body["data"]["latest_singing_job"].is_null());
}

#[tokio::test]
async fn duplicate_active_job_is_a_validation_error() {
    let app = spawn_app().await;
    let profile_id = create_profile(&app, "narrator").await;
    for name in ["a.wav", "b.wav", "c.wav"] {
        upload_sample(&app, &profile_id, "speaking", name).await;
    }

    let response = submit_enroll(&app, &profile_id).await;
    expect_status(response, StatusCode::CREATED).await;
    let response = submit_enroll(&app, &profile_id).await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["error"].as_str().unwrap().contains("already in progress"));
}

#[tokio::test]
async fn tts_without_enrolled_voice_is_rejected() {
    let app = spawn_app().await;
    let profile_id = create_profile(&app, "narrator").await;

    let response = post_json(
        &app.app,
        "/api/v1/jobs",
        json!({ "profile_id": profile_id, "job_type": "tts", "text": "hello" }),
    )
    .await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["error"].as_str().unwrap().contains("not enrolled"));
}

#[tokio::test]
async fn cover_jobs_must_use_the_multipart_endpoint() {
    let app = spawn_app().await;
    let profile_id = create_profile(&app, "singer").await;

    let response = post_json(
        &app.app,
        "/api/v1/jobs",
        json!({
            "profile_id": profile_id,
            "job_type": "cover",
            "song_ref": "x",
            "original_filename": "x.wav",
        }),
    )
    .await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["error"].as_str().unwrap().contains("/jobs/cover"));
}

// ---------------------------------------------------------------------------
// Cover submission
// ---------------------------------------------------------------------------

async fn ready_singer(app: &TestApp) -> String {
    let profile_id = create_profile(app, "singer").await;
    let id: uuid::Uuid = profile_id.parse().unwrap();
    ProfileRepo::set_enroll_status(&app.pool, id, JobType::EnrollSinging, EnrollStatus::Ready)
        .await
        .unwrap();
    profile_id
}

#[tokio::test]
async fn cover_submission_stores_the_song_and_creates_a_job() {
    let app = spawn_app().await;
    let profile_id = ready_singer(&app).await;

    let response = post_multipart(
        &app.app,
        "/api/v1/jobs/cover",
        &[
            ("profile_id", Part::Text(&profile_id)),
            ("pitch_shift", Part::Text("-2")),
            (
                "file",
                Part::File {
                    filename: "song.mp3",
                    bytes: b"ID3 fake song",
                },
            ),
        ],
    )
    .await;
    let body = expect_status(response, StatusCode::CREATED).await;
    assert_eq!(body["data"]["job_type"], "cover");
    assert_eq!(body["data"]["status"], "pending");
}

#[tokio::test]
async fn cover_pitch_shift_out_of_range_is_rejected() {
    let app = spawn_app().await;
    let profile_id = ready_singer(&app).await;

    let response = post_multipart(
        &app.app,
        "/api/v1/jobs/cover",
        &[
            ("profile_id", Part::Text(&profile_id)),
            ("pitch_shift", Part::Text("13")),
            (
                "file",
                Part::File {
                    filename: "song.mp3",
                    bytes: b"ID3",
                },
            ),
        ],
    )
    .await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["error"].as_str().unwrap().contains("pitch_shift"));
}

#[tokio::test]
async fn oversized_song_reports_the_size_cap() {
    let app = spawn_app().await;
    let profile_id = ready_singer(&app).await;
    let song = vec![0u8; 120 * 1024 * 1024];

    let response = post_multipart(
        &app.app,
        "/api/v1/jobs/cover",
        &[
            ("profile_id", Part::Text(&profile_id)),
            (
                "file",
                Part::File {
                    filename: "epic.mp3",
                    bytes: &song,
                },
            ),
        ],
    )
    .await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["error"].as_str().unwrap().contains("100 MB"));

    // No job record and no stored song.
    let id: uuid::Uuid = profile_id.parse().unwrap();
    assert!(!JobRepo::any_active_for(&app.pool, id).await.unwrap());
    assert!(app.blobs.keys().iter().all(|k| !k.starts_with("uploads/")));
}

#[tokio::test]
async fn rejected_cover_does_not_leak_the_uploaded_song() {
    let app = spawn_app().await;
    // Profile exists but the singing voice is not enrolled.
    let profile_id = create_profile(&app, "singer").await;

    let response = post_multipart(
        &app.app,
        "/api/v1/jobs/cover",
        &[
            ("profile_id", Part::Text(&profile_id)),
            (
                "file",
                Part::File {
                    filename: "song.mp3",
                    bytes: b"ID3",
                },
            ),
        ],
    )
    .await;
    expect_status(response, StatusCode::BAD_REQUEST).await;
    // Cleanup removed the orphaned upload.
    assert!(app.blobs.keys().iter().all(|k| !k.starts_with("uploads/")));
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn artifact_is_409_until_the_job_completes() {
    let app = spawn_app().await;
    let profile_id = create_profile(&app, "narrator").await;
    for name in ["a.wav", "b.wav", "c.wav"] {
        upload_sample(&app, &profile_id, "speaking", name).await;
    }
    let response = submit_enroll(&app, &profile_id).await;
    let body = expect_status(response, StatusCode::CREATED).await;
    let job_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = get(&app.app, &format!("/api/v1/jobs/{job_id}/artifact")).await;
    let body = expect_status(response, StatusCode::CONFLICT).await;
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn completed_artifact_resolves_to_a_download_url() {
    let app = spawn_app().await;
    let profile_id = create_profile(&app, "narrator").await;
    for name in ["a.wav", "b.wav", "c.wav"] {
        upload_sample(&app, &profile_id, "speaking", name).await;
    }
    let response = submit_enroll(&app, &profile_id).await;
    let body = expect_status(response, StatusCode::CREATED).await;
    let job_id: uuid::Uuid = body["data"]["id"].as_str().unwrap().parse().unwrap();

    // Drive the job to completion directly through the registry.
    let job = app.registry.claim_next().await.unwrap().unwrap();
    let job = app.registry.begin_processing(&job).await.unwrap();
    use parrot_engine::collaborators::BlobStore;
    app.blobs.put("models/m1", b"model bytes").await.unwrap();
    app.registry.complete_job(job.id, "models/m1").await.unwrap();

    // The response carries a reference into the blob store, not bytes.
    let response = get(&app.app, &format!("/api/v1/jobs/{job_id}/artifact")).await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["download_url"], "memory://models/m1");
}

#[tokio::test]
async fn unknown_job_is_404() {
    let app = spawn_app().await;
    let response = get(&app.app, &format!("/api/v1/jobs/{}", uuid::Uuid::new_v4())).await;
    let body = expect_status(response, StatusCode::NOT_FOUND).await;
    assert_eq!(body["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Sample deletion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sample_deletion_is_blocked_while_enrollment_is_active() {
    let app = spawn_app().await;
    let profile_id = create_profile(&app, "narrator").await;
    for name in ["a.wav", "b.wav", "c.wav"] {
        upload_sample(&app, &profile_id, "speaking", name).await;
    }
    let response = submit_enroll(&app, &profile_id).await;
    expect_status(response, StatusCode::CREATED).await;

    let response = get(&app.app, &format!("/api/v1/profiles/{profile_id}/samples")).await;
    let body = expect_status(response, StatusCode::OK).await;
    let sample_id = body["data"][0]["id"].as_str().unwrap().to_string();
    let file_ref = body["data"][0]["file_ref"].as_str().unwrap().to_string();

    let response = delete(
        &app.app,
        &format!("/api/v1/profiles/{profile_id}/samples/{sample_id}"),
    )
    .await;
    let body = expect_status(response, StatusCode::CONFLICT).await;
    assert!(body["error"].as_str().unwrap().contains("enrollment"));

    // Fail the job; the slot frees and deletion goes through.
    let job = app.registry.claim_next().await.unwrap().unwrap();
    let job = app.registry.begin_processing(&job).await.unwrap();
    app.registry.fail_job(job.id, "boom").await.unwrap();

    let response = delete(
        &app.app,
        &format!("/api/v1/profiles/{profile_id}/samples/{sample_id}"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!app.blobs.contains(&file_ref));
}

// ---------------------------------------------------------------------------
// Profile deletion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn profile_deletion_is_blocked_while_jobs_run_then_cascades() {
    let app = spawn_app().await;
    let profile_id = create_profile(&app, "narrator").await;
    for name in ["a.wav", "b.wav", "c.wav"] {
        upload_sample(&app, &profile_id, "speaking", name).await;
    }
    let response = submit_enroll(&app, &profile_id).await;
    let body = expect_status(response, StatusCode::CREATED).await;
    let job_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = delete(&app.app, &format!("/api/v1/profiles/{profile_id}")).await;
    let body = expect_status(response, StatusCode::CONFLICT).await;
    assert!(body["error"].as_str().unwrap().contains("in progress"));

    // Fail the job; deletion then goes through.
    let job = app.registry.claim_next().await.unwrap().unwrap();
    let job = app.registry.begin_processing(&job).await.unwrap();
    app.registry.fail_job(job.id, "boom").await.unwrap();

    let response = delete(&app.app, &format!("/api/v1/profiles/{profile_id}")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Sample blobs are removed and the rows cascaded with the profile.
    assert!(app.blobs.keys().iter().all(|k| !k.starts_with("samples/")));
    let response = get(&app.app, &format!("/api/v1/profiles/{profile_id}")).await;
    expect_status(response, StatusCode::NOT_FOUND).await;
    let response = get(&app.app, &format!("/api/v1/jobs/{job_id}")).await;
    expect_status(response, StatusCode::NOT_FOUND).await;
}
