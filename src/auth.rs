//! Hub authentication session
//!
//! At most one session exists per installation. It is created by a
//! successful login, persisted to `session.json`, and destroyed by logout
//! or when the hub rejects its token.

use crate::error::{DownloaderError, HubError, Result};
use crate::models::download::ModelHub;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Validated hub session
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    token: String,
    pub account: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"***")
            .field("account", &self.account)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl Session {
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Owner of the single hub session
pub struct SessionStore {
    path: PathBuf,
    session: RwLock<Option<Session>>,
    hub: Arc<dyn ModelHub>,
}

impl SessionStore {
    /// Open the store, restoring a persisted session if present
    pub fn open(path: PathBuf, hub: Arc<dyn ModelHub>) -> Self {
        let session = match load_session(&path) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Ignoring unreadable session file: {e}");
                None
            }
        };

        if let Some(session) = &session {
            tracing::info!("Restored hub session for {}", session.account);
        }

        Self {
            path,
            session: RwLock::new(session),
            hub,
        }
    }

    pub async fn is_logged_in(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.token.clone())
    }

    /// Validate `token` against the hub and start a session
    pub async fn login(&self, token: &str) -> Result<Session> {
        let token = token.trim();
        if token.is_empty() {
            return Err(DownloaderError::InvalidRequest(
                "Please enter a token".to_string(),
            ));
        }

        let account = self.hub.whoami(token).await?;

        let session = Session {
            token: token.to_string(),
            account: account.name,
            created_at: Utc::now(),
        };

        let mut current = self.session.write().await;
        save_session(&self.path, &session)?;
        *current = Some(session.clone());

        tracing::info!(
            "Logged in to {} as {}",
            self.hub.hub_name(),
            session.account
        );
        Ok(session)
    }

    /// Drop the session; succeeds even when logged out
    pub async fn logout(&self) {
        let mut current = self.session.write().await;
        if current.take().is_some() {
            tracing::info!("Logged out of {}", self.hub.hub_name());
        }
        remove_session_file(&self.path);
    }

    /// Drop the session if it still holds `token`
    pub async fn invalidate(&self, token: &str) -> bool {
        let mut current = self.session.write().await;
        if current.as_ref().is_some_and(|s| s.token == token) {
            *current = None;
            remove_session_file(&self.path);
            tracing::warn!("Hub rejected the session token, logged out");
            true
        } else {
            false
        }
    }

    /// Re-check the session token with the hub
    ///
    /// A rejected token ends the session and reports `AuthRequired`.
    pub async fn revalidate(&self, token: &str) -> Result<()> {
        match self.hub.whoami(token).await {
            Ok(_) => Ok(()),
            Err(DownloaderError::Hub(HubError::InvalidToken)) => {
                self.invalidate(token).await;
                Err(DownloaderError::AuthRequired(
                    "Hub token was rejected, please log in again".to_string(),
                ))
            }
            Err(e) => Err(e),
        }
    }
}

fn load_session(path: &Path) -> Result<Option<Session>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    let session = serde_json::from_str(&content)
        .map_err(|e| DownloaderError::ServiceUnavailable(format!("Failed to parse session: {e}")))?;
    Ok(Some(session))
}

/// Save session atomically (tmp + rename)
fn save_session(path: &Path, session: &Session) -> Result<()> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(session)?)?;
        fs::rename(&tmp_path, path)
    };

    write().map_err(|e| {
        DownloaderError::ServiceUnavailable(format!("Failed to save session: {e}"))
    })
}

fn remove_session_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove session file {}: {e}", path.display()),
    }
}
