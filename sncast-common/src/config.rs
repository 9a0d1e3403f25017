//! Configuration loading and root folder resolution
//!
//! Root folder resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SNCAST_ROOT_FOLDER`)
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: it is logged and the
//! compiled defaults are used instead.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "SNCAST_ROOT_FOLDER";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 9170;

/// Default number of fully decoded episodes kept in memory
pub const DEFAULT_MAX_EPISODES: usize = 4;

/// Default number of downloads allowed to run at once
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 2;

/// Default whole-download timeout in seconds
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 600;

/// Contents of the optional `config.toml`
///
/// Every key is optional; absent keys fall back to compiled defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// Root folder holding `episodes/` and `sncast.db`
    pub root_folder: Option<PathBuf>,
    /// Extended M3U catalog produced by the playlist generator
    pub playlist: Option<PathBuf>,
    /// HTTP listen port
    pub port: Option<u16>,
    /// Capacity of the decoded-audio cache (episodes)
    pub max_episodes: Option<usize>,
    /// Size of the download worker pool
    pub max_concurrent_downloads: Option<usize>,
    /// Whole-download timeout in seconds
    pub download_timeout_secs: Option<u64>,
}

impl TomlConfig {
    /// Parse a config file, failing on I/O or syntax errors
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse config text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load a config file, degrading to defaults when it is missing or broken
    ///
    /// With no explicit path the platform config location is tried.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
            Some(p) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => {
                info!("Loaded config file {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Cache capacity, clamped to at least one episode
    pub fn max_episodes(&self) -> usize {
        self.max_episodes.unwrap_or(DEFAULT_MAX_EPISODES).max(1)
    }

    /// Download pool size, clamped to at least one worker
    pub fn max_concurrent_downloads(&self) -> usize {
        self.max_concurrent_downloads
            .unwrap_or(DEFAULT_MAX_CONCURRENT_DOWNLOADS)
            .max(1)
    }

    /// Download timeout in seconds
    pub fn download_timeout_secs(&self) -> u64 {
        self.download_timeout_secs
            .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS)
    }
}

/// Platform location of `config.toml` (e.g. `~/.config/sncast/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sncast").join("config.toml"))
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("sncast"))
        .unwrap_or_else(|| PathBuf::from("./sncast_data"))
}

/// Resolves the root folder from CLI, environment, TOML and defaults
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value given on the command line
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Value read from `config.toml`
    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_value = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            return path.clone();
        }

        default_root_folder()
    }
}

/// Creates the root folder layout and names the files inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder and the `episodes/` download directory
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(self.episodes_dir())?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Directory receiving downloaded episode files
    pub fn episodes_dir(&self) -> PathBuf {
        self.root_folder.join("episodes")
    }

    /// SQLite database path
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("sncast.db")
    }

    /// Catalog path used when none is configured
    pub fn default_playlist_path(&self) -> PathBuf {
        self.root_folder.join("security_now_podcast.m3u")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_toml() {
        let config = TomlConfig::parse("port = 8080\nmax_episodes = 6\n").unwrap();
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.max_episodes(), 6);
        assert_eq!(config.max_concurrent_downloads(), DEFAULT_MAX_CONCURRENT_DOWNLOADS);
        assert!(config.root_folder.is_none());
    }

    #[test]
    fn test_parse_invalid_toml_is_config_error() {
        let result = TomlConfig::parse("port = \"not a number\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let config = TomlConfig {
            max_episodes: Some(0),
            max_concurrent_downloads: Some(0),
            ..Default::default()
        };
        assert_eq!(config.max_episodes(), 1);
        assert_eq!(config.max_concurrent_downloads(), 1);
    }

    #[test]
    fn test_initializer_paths() {
        let init = RootFolderInitializer::new(PathBuf::from("/srv/sncast"));
        assert_eq!(init.episodes_dir(), PathBuf::from("/srv/sncast/episodes"));
        assert_eq!(init.database_path(), PathBuf::from("/srv/sncast/sncast.db"));
    }
}
