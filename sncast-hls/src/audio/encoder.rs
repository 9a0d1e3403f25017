//! Segment encoder
//!
//! Turns a decoded range into the bytes served for one segment. The default
//! encoder writes 16-bit PCM WAV in memory, which standard players accept as
//! an HLS media segment for audio-only streams.

use crate::audio::types::DecodedAudio;
use crate::error::{Error, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

/// Encoder seam used by the segment endpoint
pub trait SegmentEncoder: Send + Sync {
    fn encode(&self, audio: &DecodedAudio) -> Result<Vec<u8>>;

    /// MIME type of the encoded payload
    fn content_type(&self) -> &'static str;

    /// File extension used in playlist segment URIs
    fn extension(&self) -> &'static str;
}

/// 16-bit PCM WAV encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct WavSegmentEncoder;

impl WavSegmentEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl SegmentEncoder for WavSegmentEncoder {
    fn encode(&self, audio: &DecodedAudio) -> Result<Vec<u8>> {
        let spec = WavSpec {
            channels: audio.channels(),
            sample_rate: audio.sample_rate(),
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        // 44-byte header plus two bytes per sample
        let mut cursor = Cursor::new(Vec::with_capacity(44 + audio.samples().len() * 2));
        {
            let mut writer = WavWriter::new(&mut cursor, spec)
                .map_err(|e| Error::Internal(format!("WAV header: {}", e)))?;
            for &sample in audio.samples() {
                writer
                    .write_sample(to_i16(sample))
                    .map_err(|e| Error::Internal(format!("WAV write: {}", e)))?;
            }
            writer
                .finalize()
                .map_err(|e| Error::Internal(format!("WAV finalize: {}", e)))?;
        }

        Ok(cursor.into_inner())
    }

    fn content_type(&self) -> &'static str {
        "audio/wav"
    }

    fn extension(&self) -> &'static str {
        "wav"
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}
