//! Configuration module for hal-downloader
//!
//! Loads config from `$XDG_CONFIG_HOME/hal-downloader/config.toml` or `~/.config/hal-downloader/config.toml`.
//! Falls back to embedded defaults if file doesn't exist.
//! Partial configs are merged with defaults using serde's default attributes.
//!
//! # Example
//!
//! ```no_run
//! use hal_downloader::config::Config;
//!
//! let config = Config::load().expect("Failed to load config");
//! println!("Listening on: {}", config.server.bind_addr());
//! println!("Catalog: {}", config.storage.catalog_path.display());
//! ```

pub mod schema;

use crate::error::{DownloaderError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub use schema::Config;

impl Config {
    /// Load config from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DownloaderError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;

        Self::parse(&content)
    }

    /// Parse TOML, filling anything missing from defaults
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DownloaderError::Config(format!("Failed to parse config: {e}")))
    }

    /// `$XDG_CONFIG_HOME/hal-downloader/config.toml`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hal-downloader").join("config.toml"))
    }

    /// `HAL_DOWNLOADER_HOST` / `HAL_DOWNLOADER_PORT` override the listener
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HAL_DOWNLOADER_HOST") {
            if !host.trim().is_empty() {
                self.server.host = host.trim().to_string();
            }
        }

        if let Ok(raw) = std::env::var("HAL_DOWNLOADER_PORT") {
            match raw.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(
                    "Invalid HAL_DOWNLOADER_PORT='{}', keeping {}",
                    raw,
                    self.server.port
                ),
            }
        }
    }
}
