//! Traits the executor calls out through.
//!
//! The stage executor never talks to the GPU service, the blob store, or
//! audio files directly. Everything external sits behind these traits so
//! the pipeline tests can run against in-memory fakes.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use parrot_core::types::JobId;

/// Progress callback a long-running engine call reports through.
/// `fraction` is within the current stage, 0.0 to 1.0.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Errors from collaborator calls.
///
/// The transient/permanent split drives the retry policy: only
/// `Transient` failures of I/O stages are retried.
#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    /// Network or storage hiccup that may succeed on retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Deterministic failure; retrying would reproduce it.
    #[error("{0}")]
    Permanent(String),

    /// Referenced blob does not exist.
    #[error("blob not found: {0}")]
    NotFound(String),
}

/// Probed properties of an uploaded audio file.
///
/// Fields are `None` when the format cannot be probed without a full
/// decoder (mp3, flac); duration validation then happens downstream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioInfo {
    pub duration_seconds: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Vocal/instrumental pair produced by source separation.
#[derive(Debug, Clone)]
pub struct SeparatedTracks {
    pub vocals_ref: String,
    pub instrumental_ref: String,
}

/// The heavy audio/ML operations behind each pipeline stage.
///
/// One method per compute stage. Implementations report intra-stage
/// progress through the [`ProgressFn`] where the underlying tool exposes
/// it; stages without granular progress may simply never call it.
#[async_trait]
pub trait ProcessingEngine: Send + Sync {
    /// Normalize and segment speaking samples for voice training.
    async fn preprocess_speaking(
        &self,
        job_id: JobId,
        sample_refs: &[String],
        progress: ProgressFn,
    ) -> Result<String, CollabError>;

    /// Train the speaking voice from preprocessed samples. Returns the
    /// model reference.
    async fn train_speaking(
        &self,
        job_id: JobId,
        prepared_ref: &str,
        progress: ProgressFn,
    ) -> Result<String, CollabError>;

    /// Resample and clean singing samples.
    async fn preprocess_singing(
        &self,
        job_id: JobId,
        sample_refs: &[String],
        progress: ProgressFn,
    ) -> Result<String, CollabError>;

    /// Extract pitch contours from prepared singing data.
    async fn extract_f0(
        &self,
        job_id: JobId,
        prepared_ref: &str,
        progress: ProgressFn,
    ) -> Result<String, CollabError>;

    /// Extract acoustic features from prepared singing data.
    async fn extract_features(
        &self,
        job_id: JobId,
        prepared_ref: &str,
        progress: ProgressFn,
    ) -> Result<String, CollabError>;

    /// Train the singing conversion model. Returns the model reference.
    async fn train_singing(
        &self,
        job_id: JobId,
        features_ref: &str,
        progress: ProgressFn,
    ) -> Result<String, CollabError>;

    /// Build the retrieval index for a trained singing model. Returns the
    /// final model bundle reference.
    async fn build_index(
        &self,
        job_id: JobId,
        model_ref: &str,
        progress: ProgressFn,
    ) -> Result<String, CollabError>;

    /// Synthesize speech in the enrolled voice. Returns the audio
    /// reference.
    async fn synthesize(
        &self,
        job_id: JobId,
        model_ref: &str,
        text: &str,
        progress: ProgressFn,
    ) -> Result<String, CollabError>;

    /// Split a song into vocal and instrumental tracks.
    async fn separate(
        &self,
        job_id: JobId,
        song_ref: &str,
        progress: ProgressFn,
    ) -> Result<SeparatedTracks, CollabError>;

    /// Convert the vocal track to the enrolled singing voice.
    async fn convert_vocals(
        &self,
        job_id: JobId,
        model_ref: &str,
        vocals_ref: &str,
        pitch_shift: i64,
        progress: ProgressFn,
    ) -> Result<String, CollabError>;

    /// Mix converted vocals back over the instrumental. Returns the final
    /// mix reference.
    async fn mix(
        &self,
        job_id: JobId,
        vocals_ref: &str,
        instrumental_ref: &str,
        vocal_volume: f64,
        instrumental_volume: f64,
        progress: ProgressFn,
    ) -> Result<String, CollabError>;
}

/// Content-addressed-ish artifact storage keyed by opaque string refs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CollabError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, CollabError>;

    async fn delete(&self, key: &str) -> Result<(), CollabError>;

    /// Whether a key exists without fetching its bytes.
    async fn exists(&self, key: &str) -> Result<bool, CollabError>;

    /// URL a client downloads the blob from. The store serves the bytes;
    /// the registry only ever hands out references.
    fn download_url(&self, key: &str) -> Result<String, CollabError>;

    /// Filesystem path for a key, when the store is local. Used to hand
    /// large files to the engine without copying through memory.
    fn local_path(&self, key: &str) -> Option<PathBuf>;
}

/// Probes uploaded audio for duration and format metadata.
pub trait AudioInspector: Send + Sync {
    fn inspect(&self, filename: &str, bytes: &[u8]) -> Result<AudioInfo, CollabError>;
}
