//! Test helper modules for sncast-hls integration tests
//!
//! - audio_generator: deterministic WAV episodes
//! - episode_host: local HTTP server standing in for the podcast CDN

#![allow(dead_code)]

pub mod audio_generator;
pub mod episode_host;

pub use audio_generator::{generate_sine_wav, sine_wav_bytes, TEST_SAMPLE_RATE};
pub use episode_host::EpisodeHost;

use std::time::{Duration, Instant};

/// Poll `cond` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// Async variant of [`wait_until`] that yields to the runtime between polls
pub async fn wait_until_async(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
