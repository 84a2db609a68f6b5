//! Background stage executor.
//!
//! A pool of worker tasks polls the registry for pending jobs. Claiming
//! is a single atomic update, so workers never need coordination beyond
//! the database row. Each claimed job runs its pipeline stage by stage:
//! compute stages are serialized through the GPU semaphore, transient
//! I/O stages are retried with exponential backoff, and every stage runs
//! under a class-specific deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use parrot_core::job::JobType;
use parrot_core::pipeline::{self, StageName};
use parrot_core::retry::{RetryPolicy, StageClass};
use parrot_db::models::job::Job;
use parrot_db::repositories::{JobRepo, SampleRepo};

use crate::collaborators::{BlobStore, CollabError, ProcessingEngine, ProgressFn};
use crate::error::EngineError;
use crate::registry::JobRegistry;
use crate::stages::{self, JobContext, StageScratch};

/// Tunables for the worker pool.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Concurrent worker tasks.
    pub workers: usize,
    /// Concurrent GPU-bound stages across all workers.
    pub gpu_permits: usize,
    /// Poll interval of an idle worker.
    pub dispatch_interval: Duration,
    /// Backoff for transient I/O stages.
    pub retry: RetryPolicy,
    /// Deadline for one attempt of a download/upload stage.
    pub io_timeout: Duration,
    /// Deadline for one attempt of a compute stage. Generous: singing
    /// model training legitimately runs for hours.
    pub compute_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            gpu_permits: 1,
            dispatch_interval: Duration::from_secs(1),
            retry: RetryPolicy::default(),
            io_timeout: Duration::from_secs(10 * 60),
            compute_timeout: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// How one stage attempt ended.
enum StageFailure {
    Collab(CollabError),
    Timeout(Duration),
}

/// Drives claimed jobs through their pipelines.
pub struct StageExecutor {
    registry: JobRegistry,
    engine: Arc<dyn ProcessingEngine>,
    blobs: Arc<dyn BlobStore>,
    gpu: Arc<Semaphore>,
    config: ExecutorConfig,
}

impl StageExecutor {
    pub fn new(
        registry: JobRegistry,
        engine: Arc<dyn ProcessingEngine>,
        blobs: Arc<dyn BlobStore>,
        config: ExecutorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            engine,
            blobs,
            gpu: Arc::new(Semaphore::new(config.gpu_permits.max(1))),
            config,
        })
    }

    /// Run the worker pool until the cancellation token is triggered.
    ///
    /// Shutdown is graceful: a worker that has claimed a job finishes it
    /// before exiting.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            workers = self.config.workers,
            gpu_permits = self.config.gpu_permits,
            "Stage executor started",
        );

        let mut handles = Vec::new();
        for worker_id in 0..self.config.workers.max(1) {
            let executor = self.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                executor.worker_loop(worker_id, cancel).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!("Stage executor stopped");
    }

    async fn worker_loop(&self, worker_id: usize, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.dispatch_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(worker_id, "Worker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    // Drain the queue before going back to sleep.
                    loop {
                        match self.registry.claim_next().await {
                            Ok(Some(job)) => {
                                let job_id = job.id;
                                if let Err(e) = self.run_job(job).await {
                                    tracing::error!(
                                        worker_id,
                                        job_id = %job_id,
                                        error = %e,
                                        "Job run aborted",
                                    );
                                }
                                if cancel.is_cancelled() {
                                    break;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                tracing::error!(worker_id, error = %e, "Claim failed");
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Run one claimed job to a terminal state.
    ///
    /// Stage failures are absorbed into `fail_job`; the returned error is
    /// only for registry/database faults that prevented recording an
    /// outcome.
    async fn run_job(&self, job: Job) -> Result<(), EngineError> {
        let ctx = match self.build_context(&job).await {
            Ok(ctx) => ctx,
            Err(e) => {
                // Could not even resolve inputs; the claim already moved
                // the job to queued, so fail it from there via processing.
                let job = self.registry.begin_processing(&job).await?;
                self.registry.fail_job(job.id, &e.to_string()).await?;
                return Ok(());
            }
        };

        let job = self.registry.begin_processing(&job).await?;
        let job_id = job.id;

        // Bridge the synchronous progress callbacks onto the registry.
        let (tx, mut rx) = mpsc::unbounded_channel::<(StageName, f64)>();
        let registry = self.registry.clone();
        let persist = tokio::spawn(async move {
            while let Some((stage, fraction)) = rx.recv().await {
                if let Err(e) = registry.report_progress(job_id, stage, fraction).await {
                    tracing::warn!(job_id = %job_id, error = %e, "Progress write failed");
                }
            }
        });

        let outcome = self.run_pipeline(&ctx, &tx).await;
        drop(tx);
        let _ = persist.await;

        match outcome {
            Ok(output_ref) => {
                self.registry.complete_job(job_id, &output_ref).await?;
            }
            Err(message) => {
                self.registry.fail_job(job_id, &message).await?;
            }
        }
        Ok(())
    }

    /// Run every stage in order. Returns the final artifact ref, or the
    /// failure message for `fail_job`.
    async fn run_pipeline(
        &self,
        ctx: &JobContext,
        tx: &mpsc::UnboundedSender<(StageName, f64)>,
    ) -> Result<String, String> {
        let mut scratch = StageScratch::default();
        let mut output_ref = None;

        for stage_weight in pipeline::stages(ctx.job_type) {
            let stage = stage_weight.stage;
            // Move current_stage forward before any work happens.
            let _ = tx.send((stage, 0.0));

            match self.run_stage_with_retry(ctx, &mut scratch, stage, tx).await {
                Ok(output) => {
                    let _ = tx.send((stage, 1.0));
                    if let Some(output) = output {
                        output_ref = Some(output);
                    }
                }
                Err(StageFailure::Collab(e)) => {
                    return Err(format!("{stage} failed: {e}"));
                }
                Err(StageFailure::Timeout(limit)) => {
                    return Err(format!("{stage} timed out after {}s", limit.as_secs()));
                }
            }
        }

        output_ref.ok_or_else(|| "pipeline produced no output artifact".to_string())
    }

    /// One stage with the class-specific retry and timeout policy.
    async fn run_stage_with_retry(
        &self,
        ctx: &JobContext,
        scratch: &mut StageScratch,
        stage: StageName,
        tx: &mpsc::UnboundedSender<(StageName, f64)>,
    ) -> Result<Option<String>, StageFailure> {
        let class = StageClass::of(stage);
        let limit = match class {
            StageClass::TransientIo => self.config.io_timeout,
            StageClass::Compute => self.config.compute_timeout,
        };
        let policy = &self.config.retry;
        let mut delay = policy.initial_delay;
        let mut attempt: u32 = 1;

        loop {
            match self.run_stage_once(ctx, scratch, stage, class, limit, tx).await {
                Ok(output) => return Ok(output),
                Err(failure) => {
                    let transient = matches!(
                        failure,
                        StageFailure::Collab(CollabError::Transient(_))
                            | StageFailure::Timeout(_)
                    );
                    if transient && policy.allows_retry(class, attempt) {
                        let backoff = policy.jittered(delay);
                        tracing::warn!(
                            job_id = %ctx.job_id,
                            stage = %stage,
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            "Transient stage failure, retrying",
                        );
                        tokio::time::sleep(backoff).await;
                        delay = policy.next_delay(delay);
                        attempt += 1;
                        continue;
                    }
                    return Err(failure);
                }
            }
        }
    }

    async fn run_stage_once(
        &self,
        ctx: &JobContext,
        scratch: &mut StageScratch,
        stage: StageName,
        class: StageClass,
        limit: Duration,
        tx: &mpsc::UnboundedSender<(StageName, f64)>,
    ) -> Result<Option<String>, StageFailure> {
        // Compute stages are serialized through the GPU semaphore; the
        // deadline starts after the permit is held.
        let _permit = match class {
            StageClass::Compute => Some(
                self.gpu
                    .acquire()
                    .await
                    .map_err(|_| StageFailure::Collab(CollabError::Permanent(
                        "gpu semaphore closed".into(),
                    )))?,
            ),
            StageClass::TransientIo => None,
        };

        let progress = stage_progress(tx.clone(), stage);
        let work = stages::run_stage(
            self.engine.as_ref(),
            self.blobs.as_ref(),
            ctx,
            scratch,
            stage,
            progress,
        );
        match tokio::time::timeout(limit, work).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(StageFailure::Collab(e)),
            Err(_) => Err(StageFailure::Timeout(limit)),
        }
    }

    /// Resolve the immutable inputs a job's stages need.
    async fn build_context(&self, job: &Job) -> Result<JobContext, EngineError> {
        let pool = self.registry.pool();
        let mut sample_refs = Vec::new();
        let mut model_ref = None;

        match job.job_type {
            JobType::EnrollSpeaking | JobType::EnrollSinging => {
                let sample_type = match job.job_type {
                    JobType::EnrollSpeaking => parrot_core::job::SampleType::Speaking,
                    _ => parrot_core::job::SampleType::Singing,
                };
                sample_refs = SampleRepo::list_for(pool, job.profile_id, sample_type)
                    .await?
                    .into_iter()
                    .map(|s| s.file_ref)
                    .collect();
            }
            JobType::Tts => {
                model_ref =
                    JobRepo::latest_output_ref(pool, job.profile_id, JobType::EnrollSpeaking)
                        .await?;
            }
            JobType::Cover => {
                model_ref =
                    JobRepo::latest_output_ref(pool, job.profile_id, JobType::EnrollSinging)
                        .await?;
            }
        }

        Ok(JobContext {
            job_id: job.id,
            profile_id: job.profile_id,
            job_type: job.job_type,
            input: job.input.0.clone(),
            sample_refs,
            model_ref,
        })
    }
}

/// Progress callback for one stage, feeding the persist channel.
fn stage_progress(tx: mpsc::UnboundedSender<(StageName, f64)>, stage: StageName) -> ProgressFn {
    Arc::new(move |fraction: f64| {
        let _ = tx.send((stage, fraction));
    })
}
