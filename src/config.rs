use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub plex: PlexConfig,
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlexConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Humantime duration, e.g. `"30s"` or `"1m 30s"`.
    pub request_timeout: String,
    pub retry_attempts: usize,
    pub page_size: u32,
}

impl Default for PlexConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            token: None,
            request_timeout: "30s".to_string(),
            retry_attempts: 3,
            page_size: 1000,
        }
    }
}

impl PlexConfig {
    pub fn request_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.request_timeout)
            .wrap_err_with(|| format!("Invalid plex.request_timeout: {}", self.request_timeout))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Playlists to sync. Empty syncs every playlist.
    pub playlists: Vec<String>,
    pub prepend_parent: bool,
    pub skip_unmatched: bool,
    /// Drive letter or volume id to a drive letter or mount point.
    pub volume_overrides: HashMap<String, String>,
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("mm-playlist-sync").join("config.toml"))
    }

    /// Load the default config file, or defaults when it doesn't exist.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            Some(path) => {
                log::debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Create a default config file, if it doesn't exist.
    pub fn create_default() -> Result<PathBuf> {
        let Some(path) = Self::config_path() else {
            bail!("No config directory on this platform");
        };
        Self::create_default_at(&path)?;
        Ok(path)
    }

    /// Returns false when a file was already there.
    pub fn create_default_at(path: &Path) -> Result<bool> {
        if path.exists() {
            log::info!("Config file already exists at {}", path.display());
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
        }

        let contents =
            toml::to_string_pretty(&Self::default()).wrap_err("Failed to serialize config")?;
        std::fs::write(path, contents)
            .wrap_err_with(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(true)
    }

    fn validate(&self) -> Result<()> {
        self.plex.request_timeout()?;
        if self.plex.retry_attempts == 0 {
            bail!("plex.retry_attempts must be at least 1");
        }
        if self.plex.page_size == 0 {
            bail!("plex.page_size must be at least 1");
        }
        Ok(())
    }
}
