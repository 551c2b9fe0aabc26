use crate::config::schema::HubConfig;
use crate::error::{DownloaderError, HubError, Result};
use async_trait::async_trait;
use hf_hub::api::tokio::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Account behind a validated hub token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubAccount {
    pub name: String,
}

/// One file to fetch from the hub
#[derive(Clone)]
pub struct FetchRequest {
    pub repo_id: String,
    pub revision: String,
    /// Path inside the repository, subfolder included
    pub path_in_repo: String,
    pub token: Option<String>,
}

impl std::fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchRequest")
            .field("repo_id", &self.repo_id)
            .field("revision", &self.revision)
            .field("path_in_repo", &self.path_in_repo)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Remote model hub
#[async_trait]
pub trait ModelHub: Send + Sync {
    /// Validate a token, returning the account it belongs to
    ///
    /// A rejected token must surface as `HubError::InvalidToken`.
    async fn whoami(&self, token: &str) -> Result<HubAccount>;

    /// Fetch a file and return where it landed locally
    ///
    /// The caller takes the returned file over and may move it away.
    async fn fetch(&self, request: &FetchRequest) -> Result<PathBuf>;

    /// Get hub name for logging/debugging
    fn hub_name(&self) -> &str;
}

/// Hugging Face Hub
pub struct HfHub {
    client: reqwest::Client,
    endpoint: String,
    cache_dir: PathBuf,
    timeout: Duration,
}

impl std::fmt::Debug for HfHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfHub")
            .field("client", &"Client { ... }")
            .field("endpoint", &self.endpoint)
            .field("cache_dir", &self.cache_dir)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HfHub {
    /// Create hub client from config
    pub fn new(config: &HubConfig, cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            cache_dir,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// hf-hub handle for the request's repository on the configured endpoint
    fn repo(&self, request: &FetchRequest) -> Result<ApiRepo> {
        let api = ApiBuilder::new()
            .with_endpoint(self.endpoint.clone())
            .with_progress(false)
            .with_token(request.token.clone())
            .with_cache_dir(self.cache_dir.clone())
            .build()
            .map_err(|e| HubError::Api(format!("Failed to initialize HuggingFace API: {e}")))?;

        Ok(api.repo(Repo::with_revision(
            request.repo_id.clone(),
            RepoType::Model,
            request.revision.clone(),
        )))
    }
}

#[async_trait]
impl ModelHub for HfHub {
    async fn whoami(&self, token: &str) -> Result<HubAccount> {
        let response = self
            .client
            .get(format!("{}/api/whoami-v2", self.endpoint))
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| HubError::Network(e.to_string()))?;

        let status = response.status();

        match status {
            StatusCode::OK => {
                let json: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| HubError::Api(format!("Failed to parse whoami response: {e}")))?;

                let name = json["name"]
                    .as_str()
                    .ok_or_else(|| {
                        HubError::Api("Missing 'name' field in whoami response".to_string())
                    })?
                    .to_string();

                Ok(HubAccount { name })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HubError::InvalidToken.into()),
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                Err(HubError::Api(format!("Token validation failed ({status}): {error_body}")).into())
            }
        }
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<PathBuf> {
        tracing::info!(
            "Fetching {}/{} ({}) from {}...",
            request.repo_id,
            request.path_in_repo,
            request.revision,
            self.endpoint
        );

        let path = self
            .repo(request)?
            .get(&request.path_in_repo)
            .await
            .map_err(|e| {
                HubError::Fetch(format!("Failed to download {}: {e}", request.path_in_repo))
            })?;

        Ok(path)
    }

    fn hub_name(&self) -> &'static str {
        "huggingface"
    }
}

/// Check if enough disk space is available under `dir`
pub fn check_disk_space(dir: &Path, required_mb: u64, buffer_mb: u64) -> Result<()> {
    // Get filesystem stats for the target directory
    let stats = nix::sys::statvfs::statvfs(dir).map_err(|e| {
        DownloaderError::ServiceUnavailable(format!("Failed to check disk space: {e}"))
    })?;

    #[allow(clippy::useless_conversion)]
    let available_bytes = u64::from(stats.blocks_available()) * u64::from(stats.block_size());
    let required_with_buffer = required_mb
        .saturating_add(buffer_mb)
        .saturating_mul(1_024 * 1_024);

    if available_bytes < required_with_buffer {
        let available_mb = available_bytes / (1_024 * 1_024);
        let required_mb_with_buffer = required_with_buffer / (1_024 * 1_024);

        return Err(DownloaderError::ServiceUnavailable(format!(
            "Not enough disk space: {required_mb_with_buffer} MB required, {available_mb} MB available"
        )));
    }

    Ok(())
}

/// Format bytes as human-readable string
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
