//! Segment addressing and playlist generation
//!
//! An episode of duration D is cut into `ceil(D / 10)` segments. Segment `i`
//! covers `[i * 10, min((i + 1) * 10, D))`, so the segments of one episode
//! are contiguous, do not overlap and cover exactly `[0, D)`.
//!
//! Playlists are always complete (VOD): they end with `#EXT-X-ENDLIST` and
//! never grow.

use crate::audio::decoder::AudioDecoder;
use crate::error::{Error, Result};
use serde::Serialize;
use sncast_common::EpisodeKey;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use crate::sync::lock;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Fixed segment length in seconds
pub const SEGMENT_DURATION: f64 = 10.0;

/// Number of segments for an episode of `total_duration_secs`
pub fn segment_count(total_duration_secs: f64) -> u32 {
    if total_duration_secs.is_nan() || total_duration_secs <= 0.0 {
        return 0;
    }
    (total_duration_secs / SEGMENT_DURATION).ceil() as u32
}

/// Time range of one segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentDescriptor {
    pub episode_key: EpisodeKey,
    pub index: u32,
    pub offset_seconds: f64,
    pub duration_seconds: f64,
}

/// Map a segment index to its time range
///
/// Fails with [`Error::OutOfRange`] when the segment would start at or past
/// the end of the episode.
pub fn resolve(episode_key: EpisodeKey, total_duration_secs: f64, index: u32) -> Result<SegmentDescriptor> {
    let offset = index as f64 * SEGMENT_DURATION;
    if offset >= total_duration_secs {
        return Err(Error::OutOfRange(format!(
            "segment {} of {} ({} segments)",
            index,
            episode_key,
            segment_count(total_duration_secs)
        )));
    }

    Ok(SegmentDescriptor {
        episode_key,
        index,
        offset_seconds: offset,
        duration_seconds: SEGMENT_DURATION.min(total_duration_secs - offset),
    })
}

/// Ordered segment list for one episode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Playlist {
    pub episode_key: EpisodeKey,
    pub total_duration_secs: f64,
    pub segments: Vec<SegmentDescriptor>,
    /// Always true: playlists never grow once generated
    pub complete: bool,
}

impl Playlist {
    pub fn new(episode_key: EpisodeKey, total_duration_secs: f64) -> Self {
        let segments = (0..segment_count(total_duration_secs))
            .filter_map(|i| resolve(episode_key, total_duration_secs, i).ok())
            .collect();

        Self {
            episode_key,
            total_duration_secs,
            segments,
            complete: true,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Render as an HLS media playlist with segment URIs `segments/<i>.<ext>`
    pub fn render_m3u8(&self, extension: &str) -> String {
        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        out.push_str("#EXT-X-VERSION:3\n");
        let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", SEGMENT_DURATION.ceil() as u32);
        out.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");
        out.push_str("#EXT-X-PLAYLIST-TYPE:VOD\n");

        for segment in &self.segments {
            let _ = writeln!(out, "#EXTINF:{:.3},", segment.duration_seconds);
            let _ = writeln!(out, "segments/{}.{}", segment.index, extension);
        }

        if self.complete {
            out.push_str("#EXT-X-ENDLIST\n");
        }
        out
    }
}

/// Memoized episode durations
///
/// Duration comes from file metadata, which is cheap but still file I/O, and
/// every segment request needs it.
pub struct DurationIndex {
    decoder: Arc<dyn AudioDecoder>,
    known: Mutex<HashMap<EpisodeKey, f64>>,
}

impl DurationIndex {
    pub fn new(decoder: Arc<dyn AudioDecoder>) -> Self {
        Self {
            decoder,
            known: Mutex::new(HashMap::new()),
        }
    }

    /// Duration of the episode stored at `path` (blocking)
    pub fn duration(&self, key: EpisodeKey, path: &Path) -> Result<f64> {
        if let Some(secs) = self.cached(key) {
            return Ok(secs);
        }

        let secs = self.decoder.duration_of(path)?;
        debug!("Duration of {} is {:.3}s", key, secs);
        lock(&self.known).insert(key, secs);
        Ok(secs)
    }

    pub fn cached(&self, key: EpisodeKey) -> Option<f64> {
        lock(&self.known).get(&key).copied()
    }
}
