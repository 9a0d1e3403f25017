//! Audio decoder using symphonia
//!
//! Decodes episode files (MP3, AAC/M4A, FLAC, Vorbis, WAV) to interleaved f32
//! PCM at the file's native rate and channel count.
//!
//! Two decode shapes are offered:
//! - full decode (background cache population)
//! - range decode: seek close to the offset, decode only until the range end,
//!   trim to the frame. Containers that cannot seek fall back to
//!   decode-and-skip from the start.
//!
//! Frame positions come from packet timestamps in both shapes, so a slice of
//! a full decode matches a range decode of the same window.

use crate::audio::types::{secs_to_frame, DecodedAudio};
use crate::error::{Error, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, warn};

/// Decoder seam used by the segment cache and the HTTP layer
///
/// All failures (missing file, unsupported format, corrupt stream) are
/// reported as [`Error::Decode`].
pub trait AudioDecoder: Send + Sync {
    /// Decode the whole file
    fn decode_full(&self, path: &Path) -> Result<DecodedAudio>;

    /// Decode only `[offset, offset + duration)`
    fn decode_range(&self, path: &Path, offset_secs: f64, duration_secs: f64) -> Result<DecodedAudio>;

    /// Total duration in seconds, from container metadata when available
    fn duration_of(&self, path: &Path) -> Result<f64>;
}

/// symphonia-backed [`AudioDecoder`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode_full(&self, path: &Path) -> Result<DecodedAudio> {
        debug!("Decoding entire file: {}", path.display());

        let mut track = OpenTrack::open(path)?;
        let audio = track.collect(FrameWindow { start: 0, end: None })?;

        debug!(
            "Decoded {} frames ({:.1}s) from {}",
            audio.frames(),
            audio.duration_secs(),
            path.display()
        );
        Ok(audio)
    }

    fn decode_range(&self, path: &Path, offset_secs: f64, duration_secs: f64) -> Result<DecodedAudio> {
        debug!(
            "Decoding range {:.3}s+{:.3}s from {}",
            offset_secs,
            duration_secs,
            path.display()
        );

        let mut track = OpenTrack::open(path)?;

        let Some(sample_rate) = track.sample_rate else {
            // Cannot place frames before decoding; slice a full decode instead
            let full = track.collect(FrameWindow { start: 0, end: None })?;
            return Ok(full.slice(offset_secs, duration_secs));
        };

        let start = secs_to_frame(offset_secs, sample_rate);
        let end = secs_to_frame(offset_secs + duration_secs.max(0.0), sample_rate);
        if end <= start {
            return Ok(DecodedAudio::empty(sample_rate, track.channels.unwrap_or(2)));
        }

        if start > 0 {
            let seek_to = SeekTo::Time {
                time: Time::from(offset_secs),
                track_id: Some(track.track_id),
            };
            match track.format.seek(SeekMode::Accurate, seek_to) {
                Ok(seeked) => {
                    debug!(
                        "Seeked {} to ts {} (requested {})",
                        path.display(),
                        seeked.actual_ts,
                        seeked.required_ts
                    );
                    track.decoder.reset();
                }
                Err(e) => {
                    debug!(
                        "Seek not supported for {} ({}), decoding from start",
                        path.display(),
                        e
                    );
                    track = OpenTrack::open(path)?;
                }
            }
        }

        track.collect(FrameWindow {
            start,
            end: Some(end),
        })
    }

    fn duration_of(&self, path: &Path) -> Result<f64> {
        let mut track = OpenTrack::open(path)?;

        if let Some(n_frames) = track.n_frames {
            if let Some(secs) = track.ts_to_secs(n_frames) {
                if secs > 0.0 {
                    return Ok(secs);
                }
            }
        }

        // No frame count in the container: sum packet durations without decoding
        let mut total_ts: u64 = 0;
        loop {
            match track.format.next_packet() {
                Ok(packet) if packet.track_id() == track.track_id => total_ts += packet.dur(),
                Ok(_) => continue,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break
                }
                Err(e) => {
                    warn!("Error reading packet from {}: {}", path.display(), e);
                    break;
                }
            }
        }

        match track.ts_to_secs(total_ts) {
            Some(secs) if secs > 0.0 => Ok(secs),
            _ => Err(Error::Decode(format!(
                "Could not determine duration of {}",
                path.display()
            ))),
        }
    }
}

/// Frame window `[start, end)`; `end = None` means to the end of the stream
#[derive(Debug, Clone, Copy)]
struct FrameWindow {
    start: usize,
    end: Option<usize>,
}

/// An opened file: format reader plus decoder for its first audio track
struct OpenTrack {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: Option<u32>,
    channels: Option<u16>,
    time_base: Option<TimeBase>,
    n_frames: Option<u64>,
}

impl OpenTrack {
    fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Decode(format!("Failed to open file {}: {}", path.display(), e)))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe {}: {}", path.display(), e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode(format!("No audio track found in {}", path.display())))?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate: params.sample_rate,
            channels: params.channels.map(|c| c.count() as u16),
            time_base: params.time_base,
            n_frames: params.n_frames,
        })
    }

    /// Timestamp (track time base units) to seconds
    fn ts_to_secs(&self, ts: u64) -> Option<f64> {
        match (self.time_base, self.sample_rate) {
            (Some(tb), _) => {
                let t = tb.calc_time(ts);
                Some(t.seconds as f64 + t.frac)
            }
            (None, Some(sr)) => Some(ts as f64 / sr as f64),
            (None, None) => None,
        }
    }

    /// Timestamp to frame index at the native sample rate
    fn ts_to_frame(&self, ts: u64) -> usize {
        match (self.time_base, self.sample_rate) {
            (Some(_), Some(sr)) => self
                .ts_to_secs(ts)
                .map(|secs| secs_to_frame(secs, sr))
                .unwrap_or(ts as usize),
            _ => ts as usize,
        }
    }

    /// Last frame (exclusive) a decode of `window` must reach
    ///
    /// Windows reaching past the container's frame count are clamped to it.
    fn expected_end(&self, window: FrameWindow) -> Option<usize> {
        let stream_end = self.n_frames.map(|n| self.ts_to_frame(n));
        match (window.end, stream_end) {
            (Some(end), Some(total)) => Some(end.min(total)),
            (Some(end), None) => Some(end),
            (None, total) => total,
        }
    }

    /// Decode packets from the current reader position, keeping the frames
    /// that fall inside `window`
    ///
    /// A read error, or a stream that stops well short of the window end,
    /// is a decode error rather than a short result.
    fn collect(&mut self, window: FrameWindow) -> Result<DecodedAudio> {
        let expected_end = self.expected_end(window);
        let mut sample_rate = self.sample_rate;
        let mut timeline = self
            .channels
            .map(|ch| Timeline::new(window, ch as usize, expected_end));

        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(Error::Decode(format!("Failed to read packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let packet_start = self.ts_to_frame(packet.ts());
            if matches!(window.end, Some(end) if packet_start >= end) {
                break;
            }
            let packet_frames = self
                .ts_to_frame(packet.ts() + packet.dur())
                .saturating_sub(packet_start);

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Undecodable packet at frame {}, leaving silence: {}", packet_start, e);
                    if let Some(timeline) = timeline.as_mut() {
                        timeline.silence(packet_start, packet_frames);
                    }
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Decode failed: {}", e))),
            };

            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let ch = spec.channels.count();
            sample_rate.get_or_insert(spec.rate);
            let timeline =
                timeline.get_or_insert_with(|| Timeline::new(window, ch, expected_end));

            if ch != timeline.channels {
                warn!(
                    "Channel count changed mid-stream ({} -> {}), leaving silence",
                    timeline.channels, ch
                );
                timeline.silence(packet_start, decoded.frames());
                continue;
            }

            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buf.copy_interleaved_ref(decoded);
            timeline.write(packet_start, buf.samples());
        }

        let sample_rate =
            sample_rate.ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
        let timeline = match timeline {
            Some(timeline) => timeline,
            None => Timeline::new(window, 2, None),
        };

        if let Some(expected) = expected_end {
            if timeline.is_short_of(expected) {
                return Err(Error::Decode(format!(
                    "Stream ended at frame {} of {}",
                    timeline.reached,
                    expected
                )));
            }
        }

        Ok(timeline.into_audio(sample_rate))
    }
}

/// Decoded samples laid out by packet timestamp
///
/// A packet's frames land at the position its timestamp names, relative to
/// the window start, with silence filling any gap before it. A slice of a
/// full decode therefore lines up with a range decode of the same window
/// even when some packets could not be decoded.
struct Timeline {
    window: FrameWindow,
    channels: usize,
    samples: Vec<f32>,
    /// Longest packet seen, in frames
    longest_packet: usize,
    /// First absolute frame past the last packet seen, in or out of the window
    reached: usize,
}

impl Timeline {
    fn new(window: FrameWindow, channels: usize, expected_end: Option<usize>) -> Self {
        let channels = channels.max(1);
        let mut samples = Vec::new();
        if let Some(end) = expected_end {
            samples.reserve_exact(end.saturating_sub(window.start) * channels);
        }
        Self {
            window,
            channels,
            samples,
            longest_packet: 0,
            reached: 0,
        }
    }

    /// `[start, start + frames)` clipped to the window, or None when disjoint
    fn clip(&self, start: usize, frames: usize) -> Option<(usize, usize)> {
        let lo = self.window.start.max(start);
        let hi = match self.window.end {
            Some(end) => end.min(start + frames),
            None => start + frames,
        };
        (lo < hi).then_some((lo, hi))
    }

    /// Move the write position to absolute frame `frame`
    fn seat(&mut self, frame: usize) {
        let at = (frame - self.window.start) * self.channels;
        if self.samples.len() < at {
            self.samples.resize(at, 0.0);
        } else {
            self.samples.truncate(at);
        }
    }

    fn note_packet(&mut self, packet_start: usize, frames: usize) {
        self.longest_packet = self.longest_packet.max(frames);
        self.reached = self.reached.max(packet_start + frames);
    }

    /// Place a decoded packet's interleaved samples
    fn write(&mut self, packet_start: usize, data: &[f32]) {
        let frames = data.len() / self.channels;
        self.note_packet(packet_start, frames);
        let Some((lo, hi)) = self.clip(packet_start, frames) else {
            return;
        };
        self.seat(lo);
        let ch = self.channels;
        self.samples
            .extend_from_slice(&data[(lo - packet_start) * ch..(hi - packet_start) * ch]);
    }

    /// Hold a packet's place with silence
    fn silence(&mut self, packet_start: usize, frames: usize) {
        self.note_packet(packet_start, frames);
        let Some((lo, hi)) = self.clip(packet_start, frames) else {
            return;
        };
        self.seat(lo);
        self.samples
            .resize((hi - self.window.start) * self.channels, 0.0);
    }

    /// True when the stream stopped more than two packets before
    /// `expected` (encoder delay and padding stay within that)
    fn is_short_of(&self, expected: usize) -> bool {
        self.reached + 2 * self.longest_packet < expected
    }

    fn into_audio(mut self, sample_rate: u32) -> DecodedAudio {
        self.samples.shrink_to_fit();
        DecodedAudio::new(self.samples, sample_rate, self.channels as u16)
    }
}
