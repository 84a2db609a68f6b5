//! Static pipeline definitions and the cost-weighted progress model.
//!
//! Each job type maps to an ordered list of `(stage, weight)` pairs whose
//! weights sum to 100. Weights reflect real relative cost (seconds for a
//! download, hours for model training), not step count, so a waiting user
//! sees meaningful progress.

use serde::{Deserialize, Serialize};

use crate::job::JobType;

/// Every named unit of work across all pipelines.
///
/// A stage is atomic with respect to cancellation and preemption; the
/// executor only acts between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StageName {
    // Shared I/O stages
    Downloading,
    Uploading,
    // TTS
    Synthesizing,
    // Cover
    Separating,
    Converting,
    Mixing,
    // Speaking enrollment
    Processing,
    TrainingChatterbox,
    // Singing enrollment
    Preprocessing,
    F0Extraction,
    FeatureExtraction,
    ModelTraining,
    IndexBuilding,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Downloading => "downloading",
            StageName::Uploading => "uploading",
            StageName::Synthesizing => "synthesizing",
            StageName::Separating => "separating",
            StageName::Converting => "converting",
            StageName::Mixing => "mixing",
            StageName::Processing => "processing",
            StageName::TrainingChatterbox => "training_chatterbox",
            StageName::Preprocessing => "preprocessing",
            StageName::F0Extraction => "f0_extraction",
            StageName::FeatureExtraction => "feature_extraction",
            StageName::ModelTraining => "model_training",
            StageName::IndexBuilding => "index_building",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage of a pipeline and its share of total job progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageWeight {
    pub stage: StageName,
    pub weight: u8,
}

const fn sw(stage: StageName, weight: u8) -> StageWeight {
    StageWeight { stage, weight }
}

const COVER_STAGES: [StageWeight; 4] = [
    sw(StageName::Downloading, 10),
    sw(StageName::Separating, 30),
    sw(StageName::Converting, 50),
    sw(StageName::Mixing, 10),
];

const TTS_STAGES: [StageWeight; 3] = [
    sw(StageName::Downloading, 20),
    sw(StageName::Synthesizing, 60),
    sw(StageName::Uploading, 20),
];

const ENROLL_SPEAKING_STAGES: [StageWeight; 3] = [
    sw(StageName::Processing, 40),
    sw(StageName::TrainingChatterbox, 50),
    sw(StageName::Uploading, 10),
];

const ENROLL_SINGING_STAGES: [StageWeight; 5] = [
    sw(StageName::Preprocessing, 10),
    sw(StageName::F0Extraction, 15),
    sw(StageName::FeatureExtraction, 20),
    sw(StageName::ModelTraining, 45),
    sw(StageName::IndexBuilding, 10),
];

/// The ordered, weighted stage list for a job type.
pub fn stages(job_type: JobType) -> &'static [StageWeight] {
    match job_type {
        JobType::Cover => &COVER_STAGES,
        JobType::Tts => &TTS_STAGES,
        JobType::EnrollSpeaking => &ENROLL_SPEAKING_STAGES,
        JobType::EnrollSinging => &ENROLL_SINGING_STAGES,
    }
}

/// Sum of the weights of all stages strictly before `stage`.
///
/// Returns `None` if `stage` is not part of the pipeline for `job_type`.
pub fn completed_weight_before(job_type: JobType, stage: StageName) -> Option<u8> {
    let mut acc: u8 = 0;
    for sw in stages(job_type) {
        if sw.stage == stage {
            return Some(acc);
        }
        acc += sw.weight;
    }
    None
}

/// The weight of `stage` within the pipeline for `job_type`.
pub fn weight_of(job_type: JobType, stage: StageName) -> Option<u8> {
    stages(job_type)
        .iter()
        .find(|sw| sw.stage == stage)
        .map(|sw| sw.weight)
}

/// Cost-weighted overall progress:
/// `completed_weight + stage_weight * local_fraction`.
///
/// `local_fraction` is clamped to `[0, 1]`. The result is capped at 99:
/// `progress_percent = 100` is written only by the completion transition,
/// so 100 holds if and only if the job is `completed`.
pub fn overall_percent(completed_weight: u8, stage_weight: u8, local_fraction: f64) -> u8 {
    let fraction = local_fraction.clamp(0.0, 1.0);
    let raw = completed_weight as f64 + stage_weight as f64 * fraction;
    (raw.floor() as u8).min(99)
}

/// Local fraction for the `done`-th of `total` equally-weighted files.
///
/// Multi-file fetches inside a stage report progress through the same
/// weighted-accumulation model as stages themselves.
pub fn file_fraction(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (done.min(total) as f64) / (total as f64)
}
