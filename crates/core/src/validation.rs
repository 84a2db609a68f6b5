//! Submission-time validation rules.
//!
//! Everything here runs synchronously at upload or job-creation time and
//! produces [`CoreError::Validation`]; once a job record exists it is
//! guaranteed to have passed these checks, so the executor never
//! re-validates mid-pipeline.

use crate::error::CoreError;
use crate::job::SampleType;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum size of one uploaded voice sample.
pub const MAX_SAMPLE_BYTES: u64 = 50 * 1024 * 1024;

/// Maximum size of an uploaded source song for a cover job.
pub const MAX_SONG_BYTES: u64 = 100 * 1024 * 1024;

/// Accepted audio container extensions for uploads.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["wav", "mp3", "flac"];

/// Minimum duration of a single sample.
pub const MIN_SAMPLE_SECONDS: f64 = 0.5;

/// Maximum duration of a single sample.
pub const MAX_SAMPLE_SECONDS: f64 = 300.0;

/// Minimum number of samples required before enrollment may start.
/// Recommended durations differ per type (speaking 5-15 s, singing
/// 15-60 s) but are not enforced.
pub const MIN_ENROLL_SAMPLES: i64 = 3;

/// Pitch shift bounds for cover jobs, in semitones.
pub const MIN_PITCH_SHIFT: i64 = -12;
pub const MAX_PITCH_SHIFT: i64 = 12;

/// Maximum length of TTS input text, in characters.
pub const MAX_TTS_CHARS: usize = 5_000;

// ---------------------------------------------------------------------------
// Upload validation
// ---------------------------------------------------------------------------

/// Lower-cased extension of a filename, if any.
fn extension(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Validate an uploaded audio file's name and size against the cap for
/// its use (`max_bytes` is [`MAX_SAMPLE_BYTES`] or [`MAX_SONG_BYTES`]).
pub fn validate_audio_upload(
    filename: &str,
    size_bytes: u64,
    max_bytes: u64,
) -> Result<(), CoreError> {
    match extension(filename) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => {}
        _ => {
            return Err(CoreError::Validation(format!(
                "Unsupported audio format. Allowed: {}",
                ALLOWED_EXTENSIONS.join(", ")
            )))
        }
    }
    if size_bytes == 0 {
        return Err(CoreError::Validation("Uploaded file is empty".to_string()));
    }
    if size_bytes > max_bytes {
        return Err(CoreError::Validation(format!(
            "File too large. Maximum size is {} MB",
            max_bytes / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Validate the inspected duration of an uploaded sample.
pub fn validate_sample_duration(duration_seconds: f64) -> Result<(), CoreError> {
    if duration_seconds < MIN_SAMPLE_SECONDS {
        return Err(CoreError::Validation(format!(
            "Audio must be at least {MIN_SAMPLE_SECONDS} seconds long"
        )));
    }
    if duration_seconds > MAX_SAMPLE_SECONDS {
        return Err(CoreError::Validation(
            "Audio must be less than 5 minutes long".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Job preconditions
// ---------------------------------------------------------------------------

/// Enrollment requires a minimum number of samples of the matching type,
/// enforced at job creation, never mid-pipeline.
pub fn validate_enroll_sample_count(
    sample_type: SampleType,
    count: i64,
) -> Result<(), CoreError> {
    if count < MIN_ENROLL_SAMPLES {
        return Err(CoreError::Validation(format!(
            "{sample_type} enrollment requires at least {MIN_ENROLL_SAMPLES} samples, found {count}"
        )));
    }
    Ok(())
}

/// TTS input text must be non-empty (after trimming) and bounded.
pub fn validate_tts_text(text: &str) -> Result<(), CoreError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "Input text cannot be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_TTS_CHARS {
        return Err(CoreError::Validation(format!(
            "Input text must not exceed {MAX_TTS_CHARS} characters"
        )));
    }
    Ok(())
}

/// Cover pitch shift must stay within one octave either way.
pub fn validate_pitch_shift(semitones: i64) -> Result<(), CoreError> {
    if !(MIN_PITCH_SHIFT..=MAX_PITCH_SHIFT).contains(&semitones) {
        return Err(CoreError::Validation(format!(
            "pitch_shift must be between {MIN_PITCH_SHIFT} and {MAX_PITCH_SHIFT} semitones"
        )));
    }
    Ok(())
}
