//! HTTP server setup and routing

use crate::audio::{AudioDecoder, SegmentEncoder};
use crate::cache::{DownloadCache, SegmentCache};
use crate::error::{Error, Result};
use crate::playlist::DurationIndex;
use crate::prefetch::PrefetchCoordinator;
use axum::{
    routing::get,
    Router,
};
use sncast_common::{Catalog, Episode, EpisodeKey};
use sqlx::SqlitePool;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;

/// Shared application context passed to all handlers
///
/// Every field is a cheap handle, so cloning per request is fine.
#[derive(Clone)]
pub struct AppContext {
    pub catalog: Arc<Catalog>,
    pub segments: Arc<SegmentCache>,
    pub downloads: DownloadCache,
    pub prefetch: Arc<PrefetchCoordinator>,
    pub durations: Arc<DurationIndex>,
    pub encoder: Arc<dyn SegmentEncoder>,
    pub db_pool: SqlitePool,
    pub port: u16,
}

impl AppContext {
    /// Wire the caches and the prefetch coordinator together
    pub fn new(
        catalog: Catalog,
        downloads: DownloadCache,
        decoder: Arc<dyn AudioDecoder>,
        encoder: Arc<dyn SegmentEncoder>,
        max_episodes: usize,
        db_pool: SqlitePool,
        port: u16,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let segments = Arc::new(SegmentCache::new(Arc::clone(&decoder), max_episodes));
        let prefetch = Arc::new(PrefetchCoordinator::new(
            Arc::clone(&catalog),
            downloads.clone(),
            Arc::clone(&segments),
        ));

        Self {
            catalog,
            segments,
            downloads,
            prefetch,
            durations: Arc::new(DurationIndex::new(decoder)),
            encoder,
            db_pool,
            port,
        }
    }

    /// Look up a catalog entry from a path parameter (`42` or `E0042`)
    pub fn episode(&self, number: &str) -> Result<&Episode> {
        let key: EpisodeKey = number
            .parse()
            .map_err(|_| Error::BadRequest(format!("Invalid episode number: {}", number)))?;
        self.catalog
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("Episode {}", key)))
    }

    /// Local path of an episode's source file, downloading it first if needed
    pub async fn source_file(&self, episode: &Episode) -> Result<PathBuf> {
        self.downloads
            .ensure_downloaded(&episode.url, &episode.file_name())
            .await
    }

    /// Episode duration, read off the request thread on first use
    pub async fn duration(&self, key: EpisodeKey, path: PathBuf) -> Result<f64> {
        if let Some(secs) = self.durations.cached(key) {
            return Ok(secs);
        }

        let durations = Arc::clone(&self.durations);
        tokio::task::spawn_blocking(move || durations.duration(key, &path))
            .await
            .map_err(|e| Error::Internal(format!("Duration task failed: {}", e)))?
    }
}

/// Build the application router
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/build_info", get(handlers::build_info))

        // Catalog
        .route("/episodes", get(handlers::list_episodes))
        .route("/current", get(handlers::current_episode))
        .route("/episodes/:number", get(handlers::get_episode))
        .route("/episodes/:number/next", get(handlers::next_episode))
        .route("/episodes/:number/previous", get(handlers::previous_episode))

        // Streaming
        .route("/episodes/:number/playlist.m3u8", get(handlers::get_playlist))
        .route("/episodes/:number/segments/:file", get(handlers::get_segment))

        // Playback position
        .route(
            "/episodes/:number/position",
            get(handlers::get_position).post(handlers::set_position),
        )

        .route("/cache/status", get(handlers::cache_status))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until Ctrl+C or SIGTERM
pub async fn run(ctx: AppContext) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.port));
    let app = build_router(ctx);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
