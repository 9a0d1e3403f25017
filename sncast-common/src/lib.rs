//! # sncast Common Library
//!
//! Shared code for the sncast podcast service:
//! - Error type
//! - Configuration loading and root folder resolution
//! - Episode catalog (extended M3U playlist)
//! - Playback position persistence

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;

pub use catalog::{Catalog, Episode, EpisodeKey};
pub use error::{Error, Result};
