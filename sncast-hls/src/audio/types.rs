//! Decoded audio data
//!
//! `DecodedAudio` is the in-memory form of an episode (or a slice of one):
//! interleaved f32 PCM at the source's native sample rate and channel count.
//! It is never mutated once built; slicing copies out a new value.

/// Convert a time offset to a frame index at `sample_rate`
///
/// Every producer of frame boundaries goes through this function so that a
/// slice of a full decode and a direct range decode agree to the frame.
pub fn secs_to_frame(secs: f64, sample_rate: u32) -> usize {
    if secs <= 0.0 {
        return 0;
    }
    (secs * sample_rate as f64).round() as usize
}

/// Decoded PCM audio
///
/// **Format:**
/// - Samples are f32 (-1.0 to 1.0)
/// - Interleaved: [c0, c1, .., c0, c1, ..]
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl DecodedAudio {
    /// Build from interleaved samples
    ///
    /// A trailing partial frame is dropped so `samples.len()` is always a
    /// multiple of the channel count.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Silent, zero-length audio in the given format
    pub fn empty(sample_rate: u32, channels: u16) -> Self {
        Self::new(Vec::new(), sample_rate, channels)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Total duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Copy out the range `[offset, offset + duration)`, clamped to the data
    pub fn slice(&self, offset_secs: f64, duration_secs: f64) -> DecodedAudio {
        let total = self.frames();
        let start = secs_to_frame(offset_secs, self.sample_rate).min(total);
        let end = secs_to_frame(offset_secs + duration_secs.max(0.0), self.sample_rate)
            .clamp(start, total);

        let ch = self.channels as usize;
        DecodedAudio {
            samples: self.samples[start * ch..end * ch].to_vec(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Heap footprint in bytes (allocated capacity, not just the samples in use)
    pub fn size_bytes(&self) -> usize {
        self.samples.capacity() * std::mem::size_of::<f32>()
    }
}
