//! Deterministic WAV fixtures
//!
//! Episodes in tests are short stereo sine waves at a low sample rate, so
//! that full decodes stay fast while segment arithmetic still spans several
//! 10-second segments.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;
use std::path::Path;

/// Sample rate used by all fixtures
pub const TEST_SAMPLE_RATE: u32 = 8000;

fn spec() -> WavSpec {
    WavSpec {
        channels: 2,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn write_sine<W: std::io::Write + std::io::Seek>(
    writer: &mut WavWriter<W>,
    duration_ms: u64,
    frequency_hz: f32,
) -> Result<(), hound::Error> {
    let total_frames = (TEST_SAMPLE_RATE as u64 * duration_ms) / 1000;
    for frame in 0..total_frames {
        let t = frame as f32 / TEST_SAMPLE_RATE as f32;
        let value = ((2.0 * PI * frequency_hz * t).sin() * 0.5 * i16::MAX as f32) as i16;
        // Right channel inverted so the two channels differ
        writer.write_sample(value)?;
        writer.write_sample(value.saturating_neg())?;
    }
    Ok(())
}

/// Write a stereo sine wave WAV file
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    frequency_hz: f32,
) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, spec())?;
    write_sine(&mut writer, duration_ms, frequency_hz)?;
    writer.finalize()
}

/// Same content as [`generate_sine_wav`], in memory (for the fake episode host)
pub fn sine_wav_bytes(duration_ms: u64, frequency_hz: f32) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec()).unwrap();
        write_sine(&mut writer, duration_ms, frequency_hz).unwrap();
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
