//! HTTP request handlers

use crate::api::server::AppContext;
use crate::cache::CacheStats;
use crate::error::{Error, Result};
use crate::playlist::{self, Playlist};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sncast_common::db::{self, PlaybackRecord};
use sncast_common::{Episode, EpisodeKey};
use std::sync::Arc;
use tracing::{debug, warn};

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const DEFAULT_PAGE_SIZE: usize = 20;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    port: u16,
    episodes: usize,
}

#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    page: Option<usize>,
    per_page: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EpisodeSummary {
    number: u32,
    key: String,
    title: String,
    description: String,
    url: String,
    /// Source file present in the episodes directory
    downloaded: bool,
    /// Fully decoded in the segment cache
    cached: bool,
}

#[derive(Debug, Serialize)]
pub struct EpisodeListResponse {
    page: usize,
    per_page: usize,
    total: usize,
    episodes: Vec<EpisodeSummary>,
}

#[derive(Debug, Serialize)]
pub struct CurrentEpisodeResponse {
    episode: EpisodeSummary,
    position: i64,
}

#[derive(Debug, Deserialize)]
pub struct PositionRequest {
    /// Seconds from the start of the episode
    position: i64,
}

#[derive(Debug, Serialize)]
pub struct CacheStatusResponse {
    capacity: usize,
    /// Least recently used first
    loaded: Vec<EpisodeKey>,
    loading: Vec<EpisodeKey>,
    memory_bytes: usize,
    stats: CacheStats,
    downloading: Vec<String>,
    fetches: u64,
    prefetching: Vec<EpisodeKey>,
}

fn summarize(ctx: &AppContext, episode: &Episode) -> EpisodeSummary {
    EpisodeSummary {
        number: episode.number,
        key: episode.key().to_string(),
        title: episode.title.clone(),
        description: episode.description.clone(),
        url: episode.url.clone(),
        downloaded: ctx.downloads.is_present(&episode.file_name()),
        cached: ctx.segments.is_loaded(episode.key()),
    }
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "sncast-hls".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        port: ctx.port,
        episodes: ctx.catalog.len(),
    })
}

/// GET /build_info
pub async fn build_info() -> Json<BuildInfo> {
    Json(BuildInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
    })
}

// ============================================================================
// Catalog
// ============================================================================

/// GET /episodes?page=&per_page=
pub async fn list_episodes(
    State(ctx): State<AppContext>,
    Query(query): Query<PageQuery>,
) -> Json<EpisodeListResponse> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, sncast_common::catalog::MAX_PAGE_SIZE);

    let episodes = ctx
        .catalog
        .list(page, per_page)
        .into_iter()
        .map(|e| summarize(&ctx, e))
        .collect();

    Json(EpisodeListResponse {
        page,
        per_page,
        total: ctx.catalog.len(),
        episodes,
    })
}

/// GET /episodes/:number
pub async fn get_episode(
    State(ctx): State<AppContext>,
    Path(number): Path<String>,
) -> Result<Json<EpisodeSummary>> {
    let episode = ctx.episode(&number)?;
    Ok(Json(summarize(&ctx, episode)))
}

/// GET /episodes/:number/next
pub async fn next_episode(
    State(ctx): State<AppContext>,
    Path(number): Path<String>,
) -> Result<Json<EpisodeSummary>> {
    let key = ctx.episode(&number)?.key();
    let next = ctx
        .catalog
        .next_key(key)
        .and_then(|k| ctx.catalog.get(k))
        .ok_or_else(|| Error::NotFound(format!("No episode after {}", key)))?;
    Ok(Json(summarize(&ctx, next)))
}

/// GET /episodes/:number/previous
///
/// Episode 1 is its own predecessor.
pub async fn previous_episode(
    State(ctx): State<AppContext>,
    Path(number): Path<String>,
) -> Result<Json<EpisodeSummary>> {
    let key = ctx.episode(&number)?.key();
    let previous = ctx
        .catalog
        .previous_key(key)
        .and_then(|k| ctx.catalog.get(k))
        .ok_or_else(|| Error::NotFound(format!("No episode before {}", key)))?;
    Ok(Json(summarize(&ctx, previous)))
}

/// GET /current - episode last opened, with its saved position
pub async fn current_episode(State(ctx): State<AppContext>) -> Result<Json<CurrentEpisodeResponse>> {
    let key = db::get_current_episode(&ctx.db_pool).await?;
    let episode = ctx
        .catalog
        .get(key)
        .ok_or_else(|| Error::NotFound(format!("Episode {}", key)))?;
    let record = db::get_or_create_position(&ctx.db_pool, key).await?;

    Ok(Json(CurrentEpisodeResponse {
        episode: summarize(&ctx, episode),
        position: record.playback_position,
    }))
}

// ============================================================================
// Streaming
// ============================================================================

/// GET /episodes/:number/playlist.m3u8
///
/// Downloads the source if needed (waiting for it), then lists the episode's
/// 10-second segments. Also records the episode as current and starts
/// warming the next one.
pub async fn get_playlist(
    State(ctx): State<AppContext>,
    Path(number): Path<String>,
) -> Result<Response> {
    let episode = ctx.episode(&number)?.clone();
    let key = episode.key();

    let path = ctx.source_file(&episode).await?;
    let total = ctx.duration(key, path).await?;
    let playlist = Playlist::new(key, total);
    debug!("Playlist for {}: {} segments ({:.1}s)", key, playlist.len(), total);

    if let Err(e) = db::set_current_episode(&ctx.db_pool, key).await {
        warn!("Failed to record current episode {}: {}", key, e);
    }
    ctx.prefetch.on_access(key);

    let body = playlist.render_m3u8(ctx.encoder.extension());
    Ok(([(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)], body).into_response())
}

/// GET /episodes/:number/segments/:file (`<index>.<ext>`)
pub async fn get_segment(
    State(ctx): State<AppContext>,
    Path((number, file)): Path<(String, String)>,
) -> Result<Response> {
    let episode = ctx.episode(&number)?.clone();
    let key = episode.key();
    let index = parse_segment_file(&file, ctx.encoder.extension())?;

    let path = ctx.source_file(&episode).await?;
    let total = ctx.duration(key, path.clone()).await?;
    let segment = playlist::resolve(key, total, index)?;

    let segments = Arc::clone(&ctx.segments);
    let encoder = Arc::clone(&ctx.encoder);
    let bytes = tokio::task::spawn_blocking(move || {
        let audio = segments.get_segment(key, &path, segment.offset_seconds, segment.duration_seconds)?;
        encoder.encode(&audio)
    })
    .await
    .map_err(|e| Error::Internal(format!("Segment task failed: {}", e)))??;

    ctx.prefetch.on_access(key);

    Ok(([(header::CONTENT_TYPE, ctx.encoder.content_type())], bytes).into_response())
}

/// Parse `<index>.<ext>`; a wrong extension is a missing resource
fn parse_segment_file(file: &str, extension: &str) -> Result<u32> {
    let (stem, ext) = file
        .rsplit_once('.')
        .ok_or_else(|| Error::BadRequest(format!("Invalid segment name: {}", file)))?;
    if ext != extension {
        return Err(Error::NotFound(format!("Segment {}", file)));
    }
    stem.parse()
        .map_err(|_| Error::BadRequest(format!("Invalid segment index: {}", stem)))
}

// ============================================================================
// Playback Position
// ============================================================================

/// GET /episodes/:number/position
pub async fn get_position(
    State(ctx): State<AppContext>,
    Path(number): Path<String>,
) -> Result<Json<PlaybackRecord>> {
    let key = ctx.episode(&number)?.key();
    let record = db::get_or_create_position(&ctx.db_pool, key).await?;
    Ok(Json(record))
}

/// POST /episodes/:number/position - body `{"position": <seconds>}`
pub async fn set_position(
    State(ctx): State<AppContext>,
    Path(number): Path<String>,
    Json(request): Json<PositionRequest>,
) -> Result<Json<PlaybackRecord>> {
    let key = ctx.episode(&number)?.key();
    db::set_position(&ctx.db_pool, key, request.position).await?;
    debug!("Saved position {}s for {}", request.position, key);

    Ok(Json(PlaybackRecord {
        episode_number: key.number(),
        playback_position: request.position,
    }))
}

// ============================================================================
// Diagnostics
// ============================================================================

/// GET /cache/status
pub async fn cache_status(State(ctx): State<AppContext>) -> Json<CacheStatusResponse> {
    Json(CacheStatusResponse {
        capacity: ctx.segments.capacity(),
        loaded: ctx.segments.loaded_keys(),
        loading: ctx.segments.loading_keys(),
        memory_bytes: ctx.segments.memory_bytes(),
        stats: ctx.segments.stats(),
        downloading: ctx.downloads.downloading(),
        fetches: ctx.downloads.fetch_count(),
        prefetching: ctx.prefetch.pending(),
    })
}
