use crate::error::{DownloaderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

/// Download status of one model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    #[serde(default)]
    pub downloaded: bool,
}

/// Which models are enabled and which have been downloaded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationState {
    pub enabled_models: Vec<String>,
    #[serde(default)]
    pub model_status: BTreeMap<String, ModelStatus>,
}

impl ActivationState {
    /// Parse a posted body, rejecting anything off-schema
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let state: Self = serde_json::from_slice(body)
            .map_err(|e| DownloaderError::InvalidRequest(format!("Malformed active config: {e}")))?;
        state.validate()?;
        Ok(state)
    }

    /// `enabled_models` must not contain duplicates
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for name in &self.enabled_models {
            if !seen.insert(name.as_str()) {
                return Err(DownloaderError::InvalidRequest(format!(
                    "Model '{name}' is listed twice in enabled_models"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled_models.iter().any(|m| m == name)
    }

    /// Enable a model; no-op if already enabled
    pub fn enable(&mut self, name: &str) {
        if !self.is_enabled(name) {
            self.enabled_models.push(name.to_string());
        }
    }

    pub fn disable(&mut self, name: &str) {
        self.enabled_models.retain(|m| m != name);
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) {
        if enabled {
            self.enable(name);
        } else {
            self.disable(name);
        }
    }

    #[must_use]
    pub fn is_downloaded(&self, name: &str) -> bool {
        self.model_status.get(name).is_some_and(|s| s.downloaded)
    }

    pub fn mark_downloaded(&mut self, name: &str) {
        self.model_status.entry(name.to_string()).or_default().downloaded = true;
    }
}

/// Durable owner of the activation state
///
/// Writes are serialized and land atomically (tmp + rename) before the
/// in-memory copy is swapped, so a failed write changes nothing.
#[derive(Debug)]
pub struct ActivationStore {
    path: PathBuf,
    state: RwLock<ActivationState>,
    write_lock: Mutex<()>,
}

impl ActivationStore {
    /// Open the store, creating a default state file if none exists
    pub fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            load_state(&path)?
        } else {
            let state = ActivationState::default();
            save_state(&path, &state)?;
            tracing::info!("Created empty active config at {}", path.display());
            state
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state snapshot
    pub async fn get(&self) -> ActivationState {
        self.state.read().await.clone()
    }

    /// Replace the whole state (last writer wins)
    pub async fn replace(&self, new_state: ActivationState) -> Result<()> {
        new_state.validate()?;

        let _guard = self.write_lock.lock().await;
        save_state(&self.path, &new_state)?;
        *self.state.write().await = new_state;
        Ok(())
    }

    /// Record a finished download
    pub async fn mark_downloaded(&self, name: &str) -> Result<ActivationState> {
        let _guard = self.write_lock.lock().await;

        let mut next = self.state.read().await.clone();
        if next.is_downloaded(name) {
            return Ok(next);
        }
        next.mark_downloaded(name);

        save_state(&self.path, &next)?;
        *self.state.write().await = next.clone();
        tracing::debug!("Marked {} as downloaded", name);
        Ok(next)
    }
}

fn load_state(path: &Path) -> Result<ActivationState> {
    let content = fs::read_to_string(path).map_err(|e| {
        DownloaderError::ServiceUnavailable(format!(
            "Failed to read active config at {}: {e}",
            path.display()
        ))
    })?;

    let state: ActivationState = serde_json::from_str(&content).map_err(|e| {
        DownloaderError::ServiceUnavailable(format!("Failed to parse active config: {e}"))
    })?;

    state
        .validate()
        .map_err(|e| DownloaderError::ServiceUnavailable(e.to_string()))?;
    Ok(state)
}

/// Save state atomically (tmp + rename)
fn save_state(path: &Path, state: &ActivationState) -> Result<()> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, path)
    };

    write().map_err(|e| {
        tracing::error!("Failed to write active config {}: {e}", path.display());
        DownloaderError::ServiceUnavailable(format!("Failed to save active config: {e}"))
    })
}
