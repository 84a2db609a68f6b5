//! Per-stage work dispatch.
//!
//! [`run_stage`] maps one `(job_type, stage)` pair onto the collaborator
//! calls that do the work. Intermediate artifact references accumulate in
//! [`StageScratch`] for the job's later stages; the final stage of each
//! pipeline returns the job's output reference.

use parrot_core::job::{JobInput, JobType};
use parrot_core::pipeline::{file_fraction, StageName};
use parrot_core::types::{JobId, ProfileId};

use crate::collaborators::{BlobStore, CollabError, ProcessingEngine, ProgressFn};

/// Immutable per-job inputs resolved once before the pipeline runs.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub profile_id: ProfileId,
    pub job_type: JobType,
    pub input: JobInput,
    /// Blob refs of the enrollment samples (enroll jobs only).
    pub sample_refs: Vec<String>,
    /// Trained model bundle to run against (tts and cover jobs).
    pub model_ref: Option<String>,
}

/// Intermediate artifact refs carried between stages of one run.
///
/// Reset on every attempt of a job; stages are idempotent against the
/// blob store so a rerun simply overwrites.
#[derive(Debug, Default)]
pub struct StageScratch {
    prepared_ref: Option<String>,
    f0_ref: Option<String>,
    features_ref: Option<String>,
    model_ref: Option<String>,
    vocals_ref: Option<String>,
    instrumental_ref: Option<String>,
    converted_ref: Option<String>,
    audio_ref: Option<String>,
}

impl StageScratch {
    fn take(field: &Option<String>, what: &str) -> Result<String, CollabError> {
        field
            .clone()
            .ok_or_else(|| CollabError::Permanent(format!("missing intermediate artifact: {what}")))
    }
}

/// Durable key the finished artifact of a job is stored under.
pub fn output_key(ctx: &JobContext) -> String {
    match ctx.job_type {
        JobType::EnrollSpeaking => format!("models/{}/speaking/{}", ctx.profile_id, ctx.job_id),
        JobType::EnrollSinging => format!("models/{}/singing/{}", ctx.profile_id, ctx.job_id),
        JobType::Tts => format!("outputs/{}/speech.wav", ctx.job_id),
        JobType::Cover => format!("outputs/{}/cover.wav", ctx.job_id),
    }
}

/// Run one stage of a job's pipeline.
///
/// Returns `Some(output_ref)` when the stage produced the job's final
/// artifact (always and only the last stage of the pipeline).
pub async fn run_stage(
    engine: &dyn ProcessingEngine,
    blobs: &dyn BlobStore,
    ctx: &JobContext,
    scratch: &mut StageScratch,
    stage: StageName,
    progress: ProgressFn,
) -> Result<Option<String>, CollabError> {
    match (ctx.job_type, stage) {
        // -- speaking enrollment ----------------------------------------------
        (JobType::EnrollSpeaking, StageName::Processing) => {
            let prepared = engine
                .preprocess_speaking(ctx.job_id, &ctx.sample_refs, progress)
                .await?;
            scratch.prepared_ref = Some(prepared);
            Ok(None)
        }
        (JobType::EnrollSpeaking, StageName::TrainingChatterbox) => {
            let prepared = StageScratch::take(&scratch.prepared_ref, "prepared samples")?;
            let model = engine.train_speaking(ctx.job_id, &prepared, progress).await?;
            scratch.model_ref = Some(model);
            Ok(None)
        }
        (JobType::EnrollSpeaking, StageName::Uploading) => {
            let model = StageScratch::take(&scratch.model_ref, "trained model")?;
            let key = output_key(ctx);
            copy_blob(blobs, &model, &key, progress).await?;
            Ok(Some(key))
        }

        // -- singing enrollment -----------------------------------------------
        (JobType::EnrollSinging, StageName::Preprocessing) => {
            let prepared = engine
                .preprocess_singing(ctx.job_id, &ctx.sample_refs, progress)
                .await?;
            scratch.prepared_ref = Some(prepared);
            Ok(None)
        }
        (JobType::EnrollSinging, StageName::F0Extraction) => {
            let prepared = StageScratch::take(&scratch.prepared_ref, "prepared samples")?;
            let f0 = engine.extract_f0(ctx.job_id, &prepared, progress).await?;
            scratch.f0_ref = Some(f0);
            Ok(None)
        }
        (JobType::EnrollSinging, StageName::FeatureExtraction) => {
            let prepared = StageScratch::take(&scratch.prepared_ref, "prepared samples")?;
            // Features depend on the pitch contours extracted above.
            StageScratch::take(&scratch.f0_ref, "pitch contours")?;
            let features = engine
                .extract_features(ctx.job_id, &prepared, progress)
                .await?;
            scratch.features_ref = Some(features);
            Ok(None)
        }
        (JobType::EnrollSinging, StageName::ModelTraining) => {
            let features = StageScratch::take(&scratch.features_ref, "acoustic features")?;
            let model = engine.train_singing(ctx.job_id, &features, progress).await?;
            scratch.model_ref = Some(model);
            Ok(None)
        }
        (JobType::EnrollSinging, StageName::IndexBuilding) => {
            let model = StageScratch::take(&scratch.model_ref, "trained model")?;
            let bundle = engine.build_index(ctx.job_id, &model, progress).await?;
            let key = output_key(ctx);
            copy_blob(blobs, &bundle, &key, no_progress()).await?;
            Ok(Some(key))
        }

        // -- tts ----------------------------------------------------------------
        (JobType::Tts, StageName::Downloading) => {
            let model = require_model(ctx)?;
            require_blob(blobs, &model, progress).await?;
            Ok(None)
        }
        (JobType::Tts, StageName::Synthesizing) => {
            let model = require_model(ctx)?;
            let JobInput::Tts { text } = &ctx.input else {
                return Err(mismatched_input(ctx));
            };
            let audio = engine
                .synthesize(ctx.job_id, &model, text, progress)
                .await?;
            scratch.audio_ref = Some(audio);
            Ok(None)
        }
        (JobType::Tts, StageName::Uploading) => {
            let audio = StageScratch::take(&scratch.audio_ref, "synthesized audio")?;
            let key = output_key(ctx);
            copy_blob(blobs, &audio, &key, progress).await?;
            Ok(Some(key))
        }

        // -- cover ---------------------------------------------------------------
        (JobType::Cover, StageName::Downloading) => {
            let JobInput::Cover { song_ref, .. } = &ctx.input else {
                return Err(mismatched_input(ctx));
            };
            let model = require_model(ctx)?;
            // Two fetches: source song, then the voice model.
            require_blob(blobs, song_ref, fraction_progress(&progress, 1, 2)).await?;
            require_blob(blobs, &model, fraction_progress(&progress, 2, 2)).await?;
            Ok(None)
        }
        (JobType::Cover, StageName::Separating) => {
            let JobInput::Cover { song_ref, .. } = &ctx.input else {
                return Err(mismatched_input(ctx));
            };
            let tracks = engine.separate(ctx.job_id, song_ref, progress).await?;
            scratch.vocals_ref = Some(tracks.vocals_ref);
            scratch.instrumental_ref = Some(tracks.instrumental_ref);
            Ok(None)
        }
        (JobType::Cover, StageName::Converting) => {
            let model = require_model(ctx)?;
            let vocals = StageScratch::take(&scratch.vocals_ref, "separated vocals")?;
            let JobInput::Cover { pitch_shift, .. } = &ctx.input else {
                return Err(mismatched_input(ctx));
            };
            let converted = engine
                .convert_vocals(ctx.job_id, &model, &vocals, *pitch_shift, progress)
                .await?;
            scratch.converted_ref = Some(converted);
            Ok(None)
        }
        (JobType::Cover, StageName::Mixing) => {
            let converted = StageScratch::take(&scratch.converted_ref, "converted vocals")?;
            let instrumental =
                StageScratch::take(&scratch.instrumental_ref, "instrumental track")?;
            let JobInput::Cover {
                vocal_volume,
                instrumental_volume,
                ..
            } = &ctx.input
            else {
                return Err(mismatched_input(ctx));
            };
            let mixed = engine
                .mix(
                    ctx.job_id,
                    &converted,
                    &instrumental,
                    *vocal_volume,
                    *instrumental_volume,
                    progress,
                )
                .await?;
            let key = output_key(ctx);
            copy_blob(blobs, &mixed, &key, no_progress()).await?;
            Ok(Some(key))
        }

        (job_type, stage) => Err(CollabError::Permanent(format!(
            "stage {stage} is not part of the {job_type} pipeline"
        ))),
    }
}

fn require_model(ctx: &JobContext) -> Result<String, CollabError> {
    ctx.model_ref
        .clone()
        .ok_or_else(|| CollabError::Permanent("no enrolled voice model for this profile".into()))
}

fn mismatched_input(ctx: &JobContext) -> CollabError {
    CollabError::Permanent(format!("job input does not match job type {}", ctx.job_type))
}

fn no_progress() -> ProgressFn {
    std::sync::Arc::new(|_| {})
}

/// Wrap a progress callback so completing this call reports the
/// `done`-of-`total` file fraction.
fn fraction_progress(progress: &ProgressFn, done: usize, total: usize) -> ProgressFn {
    let progress = progress.clone();
    std::sync::Arc::new(move |inner: f64| {
        progress(file_fraction(done - 1, total) + inner * (1.0 / total as f64))
    })
}

/// Verify a blob exists, reporting completion through `progress`.
async fn require_blob(
    blobs: &dyn BlobStore,
    key: &str,
    progress: ProgressFn,
) -> Result<(), CollabError> {
    if !blobs.exists(key).await? {
        return Err(CollabError::NotFound(key.to_string()));
    }
    progress(1.0);
    Ok(())
}

/// Copy a blob to a durable key, reporting completion through `progress`.
async fn copy_blob(
    blobs: &dyn BlobStore,
    from: &str,
    to: &str,
    progress: ProgressFn,
) -> Result<(), CollabError> {
    let bytes = blobs.get(from).await?;
    blobs.put(to, &bytes).await?;
    progress(1.0);
    Ok(())
}
