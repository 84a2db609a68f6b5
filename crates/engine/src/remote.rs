//! HTTP client for the GPU-side processing service.
//!
//! Each [`ProcessingEngine`] method maps to one endpoint on the service.
//! Requests and responses are small JSON envelopes; audio moves by blob
//! reference, never through these calls. The service does not stream
//! intra-stage progress over plain HTTP, so the progress callback is not
//! used here.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use async_trait::async_trait;

use parrot_core::types::JobId;

use crate::collaborators::{CollabError, ProcessingEngine, ProgressFn, SeparatedTracks};

/// Connect timeout for engine calls. Per-stage deadlines are enforced by
/// the executor, not here.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct StageRequest<'a> {
    job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_ref: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_refs: Option<&'a [String]>,
    #[serde(flatten)]
    params: serde_json::Value,
}

impl<'a> StageRequest<'a> {
    fn single(job_id: JobId, input_ref: &'a str) -> Self {
        Self {
            job_id,
            input_ref: Some(input_ref),
            sample_refs: None,
            params: serde_json::Value::Object(Default::default()),
        }
    }

    fn samples(job_id: JobId, sample_refs: &'a [String]) -> Self {
        Self {
            job_id,
            input_ref: None,
            sample_refs: Some(sample_refs),
            params: serde_json::Value::Object(Default::default()),
        }
    }

    fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

#[derive(Deserialize)]
struct StageResponse {
    output_ref: String,
}

#[derive(Deserialize)]
struct SeparateResponse {
    vocals_ref: String,
    instrumental_ref: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// [`ProcessingEngine`] backed by the remote GPU service.
pub struct RemoteEngine {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteEngine {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &StageRequest<'_>,
    ) -> Result<T, CollabError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| CollabError::Transient(format!("engine unreachable: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| CollabError::Transient(format!("bad engine response: {e}")));
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => format!("engine returned {status}"),
        };
        if status.is_client_error() {
            Err(CollabError::Permanent(message))
        } else {
            Err(CollabError::Transient(message))
        }
    }

    async fn post_stage(
        &self,
        path: &str,
        body: &StageRequest<'_>,
    ) -> Result<String, CollabError> {
        let response: StageResponse = self.post(path, body).await?;
        Ok(response.output_ref)
    }
}

#[async_trait]
impl ProcessingEngine for RemoteEngine {
    async fn preprocess_speaking(
        &self,
        job_id: JobId,
        sample_refs: &[String],
        _progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.post_stage(
            "/v1/speaking/preprocess",
            &StageRequest::samples(job_id, sample_refs),
        )
        .await
    }

    async fn train_speaking(
        &self,
        job_id: JobId,
        prepared_ref: &str,
        _progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.post_stage("/v1/speaking/train", &StageRequest::single(job_id, prepared_ref))
            .await
    }

    async fn preprocess_singing(
        &self,
        job_id: JobId,
        sample_refs: &[String],
        _progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.post_stage(
            "/v1/singing/preprocess",
            &StageRequest::samples(job_id, sample_refs),
        )
        .await
    }

    async fn extract_f0(
        &self,
        job_id: JobId,
        prepared_ref: &str,
        _progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.post_stage("/v1/singing/f0", &StageRequest::single(job_id, prepared_ref))
            .await
    }

    async fn extract_features(
        &self,
        job_id: JobId,
        prepared_ref: &str,
        _progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.post_stage(
            "/v1/singing/features",
            &StageRequest::single(job_id, prepared_ref),
        )
        .await
    }

    async fn train_singing(
        &self,
        job_id: JobId,
        features_ref: &str,
        _progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.post_stage("/v1/singing/train", &StageRequest::single(job_id, features_ref))
            .await
    }

    async fn build_index(
        &self,
        job_id: JobId,
        model_ref: &str,
        _progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.post_stage("/v1/singing/index", &StageRequest::single(job_id, model_ref))
            .await
    }

    async fn synthesize(
        &self,
        job_id: JobId,
        model_ref: &str,
        text: &str,
        _progress: ProgressFn,
    ) -> Result<String, CollabError> {
        let body = StageRequest::single(job_id, model_ref)
            .with_params(serde_json::json!({ "text": text }));
        self.post_stage("/v1/tts/synthesize", &body).await
    }

    async fn separate(
        &self,
        job_id: JobId,
        song_ref: &str,
        _progress: ProgressFn,
    ) -> Result<SeparatedTracks, CollabError> {
        let response: SeparateResponse = self
            .post("/v1/cover/separate", &StageRequest::single(job_id, song_ref))
            .await?;
        Ok(SeparatedTracks {
            vocals_ref: response.vocals_ref,
            instrumental_ref: response.instrumental_ref,
        })
    }

    async fn convert_vocals(
        &self,
        job_id: JobId,
        model_ref: &str,
        vocals_ref: &str,
        pitch_shift: i64,
        _progress: ProgressFn,
    ) -> Result<String, CollabError> {
        let body = StageRequest::single(job_id, vocals_ref).with_params(serde_json::json!({
            "model_ref": model_ref,
            "pitch_shift": pitch_shift,
        }));
        self.post_stage("/v1/cover/convert", &body).await
    }

    async fn mix(
        &self,
        job_id: JobId,
        vocals_ref: &str,
        instrumental_ref: &str,
        vocal_volume: f64,
        instrumental_volume: f64,
        _progress: ProgressFn,
    ) -> Result<String, CollabError> {
        let body = StageRequest::single(job_id, vocals_ref).with_params(serde_json::json!({
            "instrumental_ref": instrumental_ref,
            "vocal_volume": vocal_volume,
            "instrumental_volume": instrumental_volume,
        }));
        self.post_stage("/v1/cover/mix", &body).await
    }
}
