//! # sncast HLS service (sncast-hls)
//!
//! Serves podcast episodes as 10-second HLS segments.
//!
//! **Components:**
//! - `audio`: symphonia decoder adapter, WAV segment encoder, decoded audio type
//! - `cache`: bounded LRU cache of decoded episodes with a background loader,
//!   and a deduplicating downloader for source files
//! - `playlist`: segment addressing and playlist rendering
//! - `prefetch`: warms episode N+1 whenever episode N is accessed
//! - `api`: axum routes

pub mod api;
pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod playlist;
pub mod prefetch;
mod sync;

pub use error::{Error, Result};
