//! Shared test harness: in-memory collaborators plus the full app
//! router, so integration tests exercise the same middleware stack that
//! production uses.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use parrot_api::config::ServerConfig;
use parrot_api::router::build_app_router;
use parrot_api::state::AppState;
use parrot_db::{memory_pool, run_migrations, DbPool};
use parrot_engine::collaborators::{AudioInfo, AudioInspector, BlobStore, CollabError};
use parrot_engine::registry::JobRegistry;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Blob store over a HashMap.
#[derive(Default)]
pub struct MemoryBlobStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn contains(&self, key: &str) -> bool {
        self.data.lock().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.data.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CollabError> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, CollabError> {
        self.data
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| CollabError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), CollabError> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CollabError> {
        Ok(self.data.lock().unwrap().contains_key(key))
    }

    fn download_url(&self, key: &str) -> Result<String, CollabError> {
        Ok(format!("memory://{key}"))
    }

    fn local_path(&self, _key: &str) -> Option<PathBuf> {
        None
    }
}

/// Inspector that reports a fixed duration for wav uploads and no
/// metadata for compressed formats.
pub struct StubInspector {
    pub wav_duration: f64,
}

impl AudioInspector for StubInspector {
    fn inspect(&self, filename: &str, _bytes: &[u8]) -> Result<AudioInfo, CollabError> {
        if filename.to_ascii_lowercase().ends_with(".wav") {
            Ok(AudioInfo {
                duration_seconds: Some(self.wav_duration),
                sample_rate: Some(44_100),
                channels: Some(1),
            })
        } else {
            Ok(AudioInfo::default())
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub app: Router,
    pub pool: DbPool,
    pub registry: JobRegistry,
    pub blobs: Arc<MemoryBlobStore>,
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url: "sqlite::memory:".to_string(),
        data_dir: "./data".to_string(),
        engine_url: "http://localhost:8500".to_string(),
        workers: 1,
        gpu_permits: 1,
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_duration(10.0).await
}

/// Harness with a configurable probed wav duration.
pub async fn spawn_app_with_duration(wav_duration: f64) -> TestApp {
    let pool = memory_pool().await.expect("pool");
    run_migrations(&pool).await.expect("migrations");

    let blobs = Arc::new(MemoryBlobStore::default());
    let registry = JobRegistry::new(pool.clone());
    let config = test_config();
    let state = AppState {
        pool: pool.clone(),
        registry: registry.clone(),
        blobs: blobs.clone(),
        inspector: Arc::new(StubInspector { wav_duration }),
        config: Arc::new(config.clone()),
    };

    TestApp {
        app: build_app_router(state, &config),
        pool,
        registry,
        blobs,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn delete(app: &Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

/// One field of a hand-built multipart body.
pub enum Part<'a> {
    Text(&'a str),
    File { filename: &'a str, bytes: &'a [u8] },
}

const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

/// Build a `multipart/form-data` body by hand; no client-side multipart
/// crate needed for tests.
pub fn multipart_body(fields: &[(&str, Part<'_>)]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, part) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File { filename, bytes } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

pub async fn post_multipart(
    app: &Router,
    uri: &str,
    fields: &[(&str, Part<'_>)],
) -> Response<Body> {
    let (content_type, body) = multipart_body(fields);
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert status and return the parsed body.
pub async fn expect_status(
    response: Response<Body>,
    status: StatusCode,
) -> serde_json::Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}
