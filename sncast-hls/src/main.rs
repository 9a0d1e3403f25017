//! sncast HLS service - main entry point
//!
//! Loads the episode catalog, opens the database, starts the caches and
//! serves the HTTP API until Ctrl+C or SIGTERM. On shutdown the background
//! decode worker is drained and joined.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sncast_common::config::{RootFolderInitializer, TomlConfig};
use sncast_common::Catalog;
use sncast_hls::api::{self, AppContext};
use sncast_hls::audio::{SymphoniaDecoder, WavSegmentEncoder};
use sncast_hls::cache::DownloadCache;
use sncast_hls::config::{CliOverrides, Config};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for sncast-hls
#[derive(Parser, Debug)]
#[command(name = "sncast-hls")]
#[command(about = "HLS segment server for podcast episodes")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SNCAST_PORT")]
    port: Option<u16>,

    /// Root folder holding episodes/ and sncast.db
    #[arg(short, long, env = "SNCAST_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Extended M3U episode catalog
    #[arg(long, env = "SNCAST_PLAYLIST")]
    playlist: Option<PathBuf>,

    /// TOML config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sncast_hls=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting sncast-hls v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let toml = TomlConfig::load_or_default(args.config.as_deref());
    let config = Config::resolve(
        CliOverrides {
            root_folder: args.root_folder,
            playlist: args.playlist,
            port: args.port,
        },
        &toml,
    );

    info!("Root folder: {}", config.root_folder.display());
    RootFolderInitializer::new(config.root_folder.clone())
        .ensure_directory_exists()
        .context("Failed to create root folder")?;

    let catalog = Catalog::load(&config.playlist_path).with_context(|| {
        format!("Failed to load episode catalog {}", config.playlist_path.display())
    })?;
    if catalog.is_empty() {
        warn!("Episode catalog {} is empty", config.playlist_path.display());
    }
    info!("Catalog: {} episodes", catalog.len());

    let db_pool = sncast_common::db::init_database(&config.db_path)
        .await
        .context("Failed to initialize database")?;

    let downloads = DownloadCache::new(
        config.episodes_dir.clone(),
        config.max_concurrent_downloads,
        config.download_timeout,
    )
    .context("Failed to initialize download cache")?;

    let ctx = AppContext::new(
        catalog,
        downloads,
        Arc::new(SymphoniaDecoder::new()),
        Arc::new(WavSegmentEncoder::new()),
        config.max_episodes,
        db_pool.clone(),
        config.port,
    );
    let segments = Arc::clone(&ctx.segments);

    let served = api::run(ctx).await;

    info!("Draining segment cache worker");
    segments.shutdown();
    db_pool.close().await;

    served.context("Server error")?;
    info!("Server shutdown complete");
    Ok(())
}
