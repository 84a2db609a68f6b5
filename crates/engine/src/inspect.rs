//! WAV header inspection.
//!
//! Parses just enough RIFF to validate uploads: the `fmt ` chunk for
//! sample rate and channel count, the `data` chunk for duration. Non-WAV
//! uploads (mp3, flac) are accepted on extension alone with no probed
//! metadata, matching what the ingest layer can check without a decoder.

use crate::collaborators::{AudioInfo, AudioInspector, CollabError};

pub struct WavInspector;

impl WavInspector {
    fn parse_wav(bytes: &[u8]) -> Result<AudioInfo, CollabError> {
        let malformed = |what: &str| CollabError::Permanent(format!("malformed wav: {what}"));

        if bytes.len() < 44 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(malformed("missing RIFF/WAVE header"));
        }

        let mut sample_rate: Option<u32> = None;
        let mut channels: Option<u16> = None;
        let mut bits_per_sample: Option<u16> = None;
        let mut data_len: Option<u32> = None;

        // Walk the chunk list after the 12-byte RIFF header.
        let mut offset = 12usize;
        while offset + 8 <= bytes.len() {
            let chunk_id = &bytes[offset..offset + 4];
            let chunk_len =
                u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap()) as usize;
            let body = offset + 8;

            match chunk_id {
                b"fmt " => {
                    if body + 16 > bytes.len() {
                        return Err(malformed("truncated fmt chunk"));
                    }
                    channels = Some(u16::from_le_bytes(
                        bytes[body + 2..body + 4].try_into().unwrap(),
                    ));
                    sample_rate = Some(u32::from_le_bytes(
                        bytes[body + 4..body + 8].try_into().unwrap(),
                    ));
                    bits_per_sample = Some(u16::from_le_bytes(
                        bytes[body + 14..body + 16].try_into().unwrap(),
                    ));
                }
                b"data" => {
                    data_len = Some(chunk_len as u32);
                }
                _ => {}
            }

            // Chunks are word-aligned.
            offset = body + chunk_len + (chunk_len & 1);
        }

        let (Some(sample_rate), Some(channels), Some(bits), Some(data_len)) =
            (sample_rate, channels, bits_per_sample, data_len)
        else {
            return Err(malformed("missing fmt or data chunk"));
        };
        if sample_rate == 0 || channels == 0 || bits == 0 {
            return Err(malformed("zeroed fmt fields"));
        }

        let bytes_per_second = sample_rate as f64 * channels as f64 * (bits as f64 / 8.0);
        Ok(AudioInfo {
            duration_seconds: Some(data_len as f64 / bytes_per_second),
            sample_rate: Some(sample_rate),
            channels: Some(channels),
        })
    }
}

impl AudioInspector for WavInspector {
    fn inspect(&self, filename: &str, bytes: &[u8]) -> Result<AudioInfo, CollabError> {
        let extension = filename
            .rsplit('.')
            .next()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "wav" => Self::parse_wav(bytes),
            // Compressed formats are validated downstream by the engine.
            "mp3" | "flac" => Ok(AudioInfo::default()),
            other => Err(CollabError::Permanent(format!(
                "unsupported audio format: {other}"
            ))),
        }
    }
}
