//! sncast-hls runtime configuration
//!
//! Merges command-line overrides with `config.toml` and the compiled
//! defaults. Command-line values already include their environment variable
//! fallbacks (clap `env`), so the priority is CLI > env > TOML > default.

use sncast_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig, DEFAULT_PORT};
use std::path::PathBuf;
use std::time::Duration;

/// Values taken from the command line (or their environment variables)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub playlist: Option<PathBuf>,
    pub port: Option<u16>,
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub root_folder: PathBuf,
    pub episodes_dir: PathBuf,
    pub db_path: PathBuf,
    pub playlist_path: PathBuf,
    pub port: u16,
    pub max_episodes: usize,
    pub max_concurrent_downloads: usize,
    pub download_timeout: Duration,
}

impl Config {
    pub fn resolve(cli: CliOverrides, toml: &TomlConfig) -> Self {
        let root_folder = RootFolderResolver::new()
            .with_cli_arg(cli.root_folder)
            .with_toml(toml)
            .resolve();
        let layout = RootFolderInitializer::new(root_folder.clone());

        let playlist_path = cli
            .playlist
            .or_else(|| toml.playlist.clone())
            .unwrap_or_else(|| layout.default_playlist_path());

        Self {
            episodes_dir: layout.episodes_dir(),
            db_path: layout.database_path(),
            root_folder,
            playlist_path,
            port: cli.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            max_episodes: toml.max_episodes(),
            max_concurrent_downloads: toml.max_concurrent_downloads(),
            download_timeout: Duration::from_secs(toml.download_timeout_secs()),
        }
    }
}
