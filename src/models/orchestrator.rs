use crate::auth::SessionStore;
use crate::config::schema::{DownloadConfig, HubConfig};
use crate::error::{DownloaderError, Result};
use crate::models::activation::ActivationStore;
use crate::models::catalog::{CatalogStore, ModelEntry};
use crate::models::download::{check_disk_space, format_bytes, FetchRequest, ModelHub};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Download policy knobs
#[derive(Debug, Clone)]
pub struct DownloadPolicy {
    pub skip_existing: bool,
    pub disk_buffer_mb: u64,
    pub default_revision: String,
}

impl DownloadPolicy {
    #[must_use]
    pub fn from_config(downloads: &DownloadConfig, hub: &HubConfig) -> Self {
        Self {
            skip_existing: downloads.skip_existing,
            disk_buffer_mb: downloads.disk_buffer_mb,
            default_revision: hub.revision.clone(),
        }
    }
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        Self::from_config(&DownloadConfig::default(), &HubConfig::default())
    }
}

/// Outcome for one requested model
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub model_name: String,
    pub ok: bool,
    pub message: String,
}

/// Outcome of a whole download request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub status: String,
    pub results: Vec<ItemResult>,
}

impl DownloadReport {
    #[must_use]
    pub fn from_results(results: Vec<ItemResult>) -> Self {
        let status = match results.as_slice() {
            [single] => single.message.clone(),
            _ => {
                let ok = results.iter().filter(|r| r.ok).count();
                let failed: Vec<&str> = results
                    .iter()
                    .filter(|r| !r.ok)
                    .map(|r| r.model_name.as_str())
                    .collect();

                if failed.is_empty() {
                    format!("Downloaded {ok} of {} models", results.len())
                } else {
                    format!(
                        "Downloaded {ok} of {} models; failed: {}",
                        results.len(),
                        failed.join(", ")
                    )
                }
            }
        };

        Self { status, results }
    }

    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.results.iter().all(|r| r.ok)
    }
}

/// Request resolved against the catalog and cleared for gating
///
/// The plan holds no token: each item reads the live session when it runs.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    entries: Vec<ModelEntry>,
}

impl DownloadPlan {
    #[must_use]
    pub fn model_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.identifier().to_string())
            .collect()
    }
}

/// Resolves, gates and performs model downloads
pub struct DownloadOrchestrator {
    catalog: CatalogStore,
    activation: Arc<ActivationStore>,
    sessions: Arc<SessionStore>,
    hub: Arc<dyn ModelHub>,
    models_root: PathBuf,
    policy: DownloadPolicy,
    /// One transfer at a time per destination file
    in_flight: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl DownloadOrchestrator {
    #[must_use]
    pub fn new(
        catalog: CatalogStore,
        activation: Arc<ActivationStore>,
        sessions: Arc<SessionStore>,
        hub: Arc<dyn ModelHub>,
        models_root: PathBuf,
        policy: DownloadPolicy,
    ) -> Self {
        Self {
            catalog,
            activation,
            sessions,
            hub,
            models_root,
            policy,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve names and check gating before anything is transferred
    pub async fn plan(&self, names: &[String]) -> Result<DownloadPlan> {
        let catalog = self.catalog.load()?;

        let entries = names
            .iter()
            .map(|name| catalog.resolve(name).cloned())
            .collect::<Result<Vec<_>>>()?;

        if !self.sessions.is_logged_in().await {
            let gated: Vec<String> = entries
                .iter()
                .filter(|e| e.is_gated())
                .map(|e| match e.license.as_ref().and_then(|l| l.url.as_deref()) {
                    Some(url) => format!("{} (accept the license at {url})", e.identifier()),
                    None => e.identifier().to_string(),
                })
                .collect();

            if !gated.is_empty() {
                tracing::warn!("Rejected gated download without session: {:?}", gated);
                return Err(DownloaderError::AuthRequired(format!(
                    "Log in with a hub token to download {}",
                    gated.join(", ")
                )));
            }
        }

        Ok(DownloadPlan { entries })
    }

    /// Download every planned model in order
    pub async fn execute(&self, plan: DownloadPlan) -> DownloadReport {
        let mut results = Vec::with_capacity(plan.entries.len());

        for entry in &plan.entries {
            let model_name = entry.identifier().to_string();
            let result = match self.download_one(entry).await {
                Ok(message) => {
                    tracing::info!("{}", message);
                    ItemResult {
                        model_name,
                        ok: true,
                        message,
                    }
                }
                Err(e) => {
                    tracing::error!("Error downloading {}: {e}", model_name);
                    ItemResult {
                        message: format!("Error downloading {model_name}: {e}"),
                        model_name,
                        ok: false,
                    }
                }
            };
            results.push(result);
        }

        DownloadReport::from_results(results)
    }

    /// Plan and execute in one call
    pub async fn download(&self, names: &[String]) -> Result<DownloadReport> {
        let plan = self.plan(names).await?;
        Ok(self.execute(plan).await)
    }

    async fn download_one(&self, entry: &ModelEntry) -> Result<String> {
        let name = entry.identifier();
        let dest = entry.destination(&self.models_root)?;
        let _guard = self.destination_lock(&dest).lock_owned().await;

        if self.policy.skip_existing && dest.exists() {
            self.activation.mark_downloaded(name).await?;
            return Ok(format!("File already exists at {}", entry.local_path));
        }

        // The session may have ended since planning
        let token = self.sessions.token().await;
        if entry.is_gated() {
            let token = token.as_deref().ok_or_else(|| {
                DownloaderError::AuthRequired(format!("Log in with a hub token to download {name}"))
            })?;
            self.sessions.revalidate(token).await?;
        }

        let repo_id = entry.repo_id.clone().ok_or_else(|| {
            DownloaderError::ServiceUnavailable(format!(
                "Catalog entry '{}' has no repo_id",
                entry.local_path
            ))
        })?;

        let parent = dest
            .parent()
            .unwrap_or(self.models_root.as_path())
            .to_path_buf();
        tokio::fs::create_dir_all(&parent).await?;

        if let Some(size_mb) = entry.size_mb {
            check_disk_space(&parent, size_mb, self.policy.disk_buffer_mb)?;
        }

        let request = FetchRequest {
            repo_id,
            revision: entry
                .revision
                .clone()
                .unwrap_or_else(|| self.policy.default_revision.clone()),
            path_in_repo: entry.hub_path(),
            token,
        };
        let fetched = self.hub.fetch(&request).await?;

        if fetched != dest {
            // Stage next to the destination so a partial file never sits at `dest`
            let part = PartFile::new(&parent, name);
            take_fetched(&fetched, part.path()).await?;
            tokio::fs::rename(part.path(), &dest).await?;
        }

        let size_bytes = tokio::fs::metadata(&dest).await.map_or(0, |m| m.len());
        self.activation.mark_downloaded(name).await?;

        Ok(format!(
            "Successfully downloaded {} to {} ({})",
            entry.hub_filename(),
            entry.local_path,
            format_bytes(size_bytes)
        ))
    }

    fn destination_lock(&self, dest: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(in_flight.entry(dest.to_path_buf()).or_default())
    }

    /// Report on-disk presence for entries whose path contains `needle`
    pub fn check(&self, needle: &str) -> Result<String> {
        let catalog = self.catalog.load()?;

        let mut status = Vec::new();
        for entry in catalog.matching(needle) {
            let present = entry
                .destination(&self.models_root)
                .is_ok_and(|path| path.exists());
            if present {
                status.push(format!("✓ {} is downloaded", entry.identifier()));
            } else {
                status.push(format!("✗ {} is not downloaded", entry.identifier()));
            }
        }

        if status.is_empty() {
            return Err(DownloaderError::NotFound(format!(
                "No matching models found for {needle}"
            )));
        }

        Ok(status.join("\n"))
    }
}

/// Staging file removed on drop unless it was renamed away
struct PartFile {
    path: PathBuf,
}

impl PartFile {
    fn new(dir: &Path, name: &str) -> Self {
        let n = PART_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            path: dir.join(format!(".{name}.{}.{n}.part", std::process::id())),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.path.symlink_metadata().is_ok() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("Failed to remove {}: {e}", self.path.display());
            }
        }
    }
}

/// Move a fetched file to `to`, leaving nothing behind in the hub cache
///
/// `fetched` may be a cache snapshot symlink; the blob it points at is moved
/// (or copied and removed across filesystems) and the dangling link dropped.
async fn take_fetched(fetched: &Path, to: &Path) -> std::io::Result<()> {
    let blob = tokio::fs::canonicalize(fetched).await?;

    if let Err(e) = tokio::fs::rename(&blob, to).await {
        tracing::debug!("Rename from cache failed ({e}), copying instead");
        tokio::fs::copy(&blob, to).await?;
        tokio::fs::remove_file(&blob).await?;
    }

    if blob != fetched {
        match tokio::fs::remove_file(fetched).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {e}", fetched.display()),
        }
    }

    Ok(())
}
