//! Process-wide caches shared by the request handlers

pub mod download_cache;
pub mod segment_cache;

pub use download_cache::DownloadCache;
pub use segment_cache::{CacheStats, SegmentCache};
