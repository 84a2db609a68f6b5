//! In-memory fakes for pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use parrot_core::types::JobId;
use parrot_engine::collaborators::{
    BlobStore, CollabError, ProcessingEngine, ProgressFn, SeparatedTracks,
};

// ---------------------------------------------------------------------------
// MemoryBlobStore
// ---------------------------------------------------------------------------

/// Blob store over a HashMap, with optional scripted put failures.
#[derive(Default)]
pub struct MemoryBlobStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
    fail_put_prefix: Mutex<Option<String>>,
    fail_puts: AtomicU32,
}

impl MemoryBlobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `n` puts under `prefix` fail with a transient error.
    pub fn fail_next_puts(&self, prefix: &str, n: u32) {
        *self.fail_put_prefix.lock().unwrap() = Some(prefix.to_string());
        self.fail_puts.store(n, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CollabError> {
        let armed = self
            .fail_put_prefix
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|prefix| key.starts_with(prefix));
        if armed && self.fail_puts.load(Ordering::SeqCst) > 0 {
            self.fail_puts.fetch_sub(1, Ordering::SeqCst);
            return Err(CollabError::Transient("storage write flaked".into()));
        }
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

// ---------------------------------------------------------------------------
// FakeEngine
// ---------------------------------------------------------------------------

/// Engine fake: records calls, writes deterministic artifacts into the
/// shared blob store, and can be scripted to fail or stall per method.
pub struct FakeEngine {
    blobs: Arc<MemoryBlobStore>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, VecDeque<CollabError>>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
}

impl FakeEngine {
    pub fn new(blobs: Arc<MemoryBlobStore>) -> Arc<Self> {
        Arc::new(Self {
            blobs,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
        })
    }

    /// Queue an error for the next call of `method`.
    pub fn fail_once(&self, method: &'static str, error: CollabError) {
        self.failures
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push_back(error);
    }

    /// Make every call of `method` sleep before completing.
    pub fn stall(&self, method: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(method, delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == method)
            .count()
    }

    async fn produce(
        &self,
        method: &'static str,
        key: String,
        progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.calls.lock().unwrap().push(method.to_string());
        let scripted = self.failures.lock().unwrap().get_mut(method).and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(error);
        }
        let delay = self.delays.lock().unwrap().get(method).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        progress(0.5);
        self.blobs.put(&key, method.as_bytes()).await?;
        Ok(key)
    }
}

#[async_trait]
impl ProcessingEngine for FakeEngine {
    async fn preprocess_speaking(
        &self,
        job_id: JobId,
        _sample_refs: &[String],
        progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.produce("preprocess_speaking", format!("scratch/{job_id}/prepared"), progress)
            .await
    }

    async fn train_speaking(
        &self,
        job_id: JobId,
        _prepared_ref: &str,
        progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.produce("train_speaking", format!("scratch/{job_id}/model"), progress)
            .await
    }

    async fn preprocess_singing(
        &self,
        job_id: JobId,
        _sample_refs: &[String],
        progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.produce("preprocess_singing", format!("scratch/{job_id}/prepared"), progress)
            .await
    }

    async fn extract_f0(
        &self,
        job_id: JobId,
        _prepared_ref: &str,
        progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.produce("extract_f0", format!("scratch/{job_id}/f0"), progress)
            .await
    }

    async fn extract_features(
        &self,
        job_id: JobId,
        _prepared_ref: &str,
        progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.produce("extract_features", format!("scratch/{job_id}/features"), progress)
            .await
    }

    async fn train_singing(
        &self,
        job_id: JobId,
        _features_ref: &str,
        progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.produce("train_singing", format!("scratch/{job_id}/model"), progress)
            .await
    }

    async fn build_index(
        &self,
        job_id: JobId,
        _model_ref: &str,
        progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.produce("build_index", format!("scratch/{job_id}/bundle"), progress)
            .await
    }

    async fn synthesize(
        &self,
        job_id: JobId,
        _model_ref: &str,
        _text: &str,
        progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.produce("synthesize", format!("scratch/{job_id}/speech"), progress)
            .await
    }

    async fn separate(
        &self,
        job_id: JobId,
        _song_ref: &str,
        progress: ProgressFn,
    ) -> Result<SeparatedTracks, CollabError> {
        let vocals = self
            .produce("separate", format!("scratch/{job_id}/vocals"), progress)
            .await?;
        let instrumental = format!("scratch/{job_id}/instrumental");
        self.blobs.put(&instrumental, b"instrumental").await?;
        Ok(SeparatedTracks {
            vocals_ref: vocals,
            instrumental_ref: instrumental,
        })
    }

    async fn convert_vocals(
        &self,
        job_id: JobId,
        _model_ref: &str,
        _vocals_ref: &str,
        _pitch_shift: i64,
        progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.produce("convert_vocals", format!("scratch/{job_id}/converted"), progress)
            .await
    }

    async fn mix(
        &self,
        job_id: JobId,
        _vocals_ref: &str,
        _instrumental_ref: &str,
        _vocal_volume: f64,
        _instrumental_volume: f64,
        progress: ProgressFn,
    ) -> Result<String, CollabError> {
        self.produce("mix", format!("scratch/{job_id}/mixed"), progress)
            .await
    }
}
