//! HTTP API
//!
//! Catalog browsing, the HLS playlist and segment endpoints, playback
//! position records and cache diagnostics.

pub mod handlers;
pub mod server;

pub use server::{build_router, run, AppContext};
