use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub downloads: DownloadConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct StorageConfig {
    /// Holds `active_config.json`, `session.json` and the hub cache
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    /// Catalog `local_path` values are resolved against this directory
    #[serde(default = "default_models_root")]
    pub models_root: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct HubConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_revision")]
    pub revision: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DownloadConfig {
    #[serde(default = "default_true")]
    pub skip_existing: bool,
    #[serde(default = "default_disk_buffer_mb")]
    pub disk_buffer_mb: u64,
    /// Finished background jobs kept for polling
    #[serde(default = "default_job_history")]
    pub job_history: usize,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8189
}
fn default_base_path() -> String {
    "/hal-fun-downloader".to_string()
}
fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("hal-downloader")
}
fn default_catalog_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("hal-downloader")
        .join("model_config.json")
}
fn default_models_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_endpoint() -> String {
    "https://huggingface.co".to_string()
}
fn default_revision() -> String {
    "main".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_disk_buffer_mb() -> u64 {
    100
}
fn default_job_history() -> usize {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_path: default_base_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            catalog_path: default_catalog_path(),
            models_root: default_models_root(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            revision: default_revision(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            skip_existing: default_true(),
            disk_buffer_mb: default_disk_buffer_mb(),
            job_history: default_job_history(),
        }
    }
}

impl ServerConfig {
    /// Base path without a trailing slash; empty when routes live at the root
    #[must_use]
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL the client commands talk to
    #[must_use]
    pub fn client_base_url(&self) -> String {
        let host = if self.host == "0.0.0.0" {
            "127.0.0.1"
        } else {
            self.host.as_str()
        };
        format!("http://{host}:{}{}", self.port, self.normalized_base_path())
    }
}

impl StorageConfig {
    #[must_use]
    pub fn active_config_path(&self) -> PathBuf {
        self.state_dir.join("active_config.json")
    }

    #[must_use]
    pub fn session_path(&self) -> PathBuf {
        self.state_dir.join("session.json")
    }

    #[must_use]
    pub fn hub_cache_dir(&self) -> PathBuf {
        self.state_dir.join("hub-cache")
    }
}
