use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::{
    DownloadRequest, DownloadResponse, ErrorBody, JobAccepted, LoginRequest, LoginResponse,
    LoginStatus, StatusMessage,
};
use crate::error::{DownloaderError, HubError, Result};
use crate::models::{ActivationState, DownloadJob, ModelEntry};

/// HTTP client for the downloader API
#[derive(Debug, Clone)]
pub struct DownloaderClient {
    http: reqwest::Client,
    base_url: Url,
}

impl DownloaderClient {
    /// Create client for the service mounted at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_http(reqwest::Client::new(), base_url)
    }

    pub fn with_http(http: reqwest::Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            DownloaderError::Config(format!("Invalid service URL '{base_url}': {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(DownloaderError::Config(format!(
                "Invalid service URL '{base_url}'"
            )));
        }
        Ok(Self { http, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn config(&self) -> Result<Vec<ModelEntry>> {
        self.get(&["config"]).await
    }

    pub async fn active(&self) -> Result<ActivationState> {
        self.get(&["active"]).await
    }

    /// Replace the stored activation state
    pub async fn update_active(&self, state: &ActivationState) -> Result<()> {
        let _: StatusMessage = self.post(&["active"], Some(state)).await?;
        Ok(())
    }

    /// Blocking download
    ///
    /// Returns the per-item report even when some items failed; the
    /// response's `error` is set in that case.
    pub async fn download(&self, names: &[String]) -> Result<DownloadResponse> {
        let request = match names {
            [name] => DownloadRequest::single(name.clone()),
            _ => DownloadRequest::batch(names.to_vec()),
        };

        let response = self.send(self.http.post(self.url(&["download"])?).json(&request)).await?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;

        if status == StatusCode::BAD_GATEWAY {
            if let Ok(report) = serde_json::from_slice::<DownloadResponse>(&body) {
                return Ok(report);
            }
        }
        decode(status, &body)
    }

    /// Start a background download job
    pub async fn download_detached(&self, names: &[String]) -> Result<JobAccepted> {
        let request = DownloadRequest::batch(names.to_vec()).detached();
        self.post(&["download"], Some(&request)).await
    }

    pub async fn job(&self, id: u64) -> Result<DownloadJob> {
        self.get(&["download", "jobs", &id.to_string()]).await
    }

    pub async fn cancel_job(&self, id: u64) -> Result<DownloadJob> {
        self.post::<(), _>(&["download", "jobs", &id.to_string(), "cancel"], None)
            .await
    }

    /// On-disk status of models whose path contains `model_name`
    pub async fn check(&self, model_name: &str) -> Result<String> {
        let message: StatusMessage = self.get(&["check", model_name]).await?;
        Ok(message.status)
    }

    pub async fn login_status(&self) -> Result<bool> {
        let status: LoginStatus = self.get(&["login-status"]).await?;
        Ok(status.logged_in)
    }

    /// Log in with a hub token; blank tokens are rejected locally
    pub async fn login(&self, token: &str) -> Result<LoginResponse> {
        let token = token.trim();
        if token.is_empty() {
            return Err(DownloaderError::InvalidRequest(
                "Please enter a token".to_string(),
            ));
        }

        let request = LoginRequest {
            token: token.to_string(),
        };
        self.post(&["login"], Some(&request)).await
    }

    pub async fn logout(&self) -> Result<()> {
        let _: StatusMessage = self.post::<(), _>(&["logout"], None).await?;
        Ok(())
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| DownloaderError::Config(format!("Invalid service URL '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let response = self.send(self.http.get(self.url(segments)?)).await?;
        read(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T> {
        let mut request = self.http.post(self.url(segments)?);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = self.send(request).await?;
        read(response).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request.send().await.map_err(|e| {
            DownloaderError::ServiceUnavailable(format!(
                "Cannot reach downloader service at {}: {e}",
                self.base_url
            ))
        })
    }
}

fn transport_error(e: reqwest::Error) -> DownloaderError {
    DownloaderError::ServiceUnavailable(format!("Failed to read response: {e}"))
}

async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await.map_err(transport_error)?;
    decode(status, &body)
}

fn decode<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T> {
    if !status.is_success() {
        return Err(status_error(status, body));
    }

    serde_json::from_slice(body).map_err(|e| {
        DownloaderError::ServiceUnavailable(format!("Unexpected response from service: {e}"))
    })
}

/// Map a non-2xx response back onto the error taxonomy
fn status_error(status: StatusCode, body: &[u8]) -> DownloaderError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.status))
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());
    let message = if message.is_empty() {
        status.to_string()
    } else {
        message
    };

    match status {
        StatusCode::BAD_REQUEST => DownloaderError::InvalidRequest(message),
        StatusCode::UNAUTHORIZED => DownloaderError::AuthRequired(message),
        StatusCode::NOT_FOUND => DownloaderError::NotFound(message),
        StatusCode::BAD_GATEWAY => DownloaderError::Hub(HubError::Api(message)),
        _ => DownloaderError::ServiceUnavailable(message),
    }
}

/// One row of the panel's model table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRow {
    pub name: String,
    pub local_path: String,
    pub enabled: bool,
    pub downloaded: bool,
    pub gated: bool,
}

/// Client-side snapshot of the service, passed to every panel operation
pub struct PanelContext {
    client: DownloaderClient,
    catalog: Vec<ModelEntry>,
    active: ActivationState,
    logged_in: bool,
    status: Option<String>,
}

impl PanelContext {
    /// Empty context; call [`PanelContext::refresh`] to populate it
    #[must_use]
    pub fn new(client: DownloaderClient) -> Self {
        Self {
            client,
            catalog: Vec::new(),
            active: ActivationState::default(),
            logged_in: false,
            status: None,
        }
    }

    /// Fetch catalog, active state and login status concurrently
    pub async fn load(client: DownloaderClient) -> Result<Self> {
        let mut context = Self::new(client);
        context.refresh().await?;
        Ok(context)
    }

    pub async fn refresh(&mut self) -> Result<()> {
        let (catalog, active, logged_in) = tokio::try_join!(
            self.client.config(),
            self.client.active(),
            self.client.login_status()
        )?;

        self.catalog = catalog;
        self.active = active;
        self.logged_in = logged_in;
        Ok(())
    }

    #[must_use]
    pub fn client(&self) -> &DownloaderClient {
        &self.client
    }

    #[must_use]
    pub fn catalog(&self) -> &[ModelEntry] {
        &self.catalog
    }

    #[must_use]
    pub fn active(&self) -> &ActivationState {
        &self.active
    }

    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    #[must_use]
    pub fn status_message(&self) -> Option<&str> {
        self.status.as_deref()
    }

    #[must_use]
    pub fn rows(&self) -> Vec<ModelRow> {
        self.catalog
            .iter()
            .map(|entry| {
                let name = entry.identifier();
                ModelRow {
                    name: name.to_string(),
                    local_path: entry.local_path.clone(),
                    enabled: self.active.is_enabled(name),
                    downloaded: self.active.is_downloaded(name),
                    gated: entry.is_gated(),
                }
            })
            .collect()
    }

    /// Toggle a model and push the full state; restores the snapshot on failure
    pub async fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let previous = self.active.clone();
        self.active.set_enabled(name, enabled);

        match self.client.update_active(&self.active).await {
            Ok(()) => {
                tracing::info!(
                    "{} {}",
                    if enabled { "Enabled" } else { "Disabled" },
                    name
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to update active config, rolling back: {e}");
                self.active = previous;
                self.status = Some(format!("Error: {e}"));
                Err(e)
            }
        }
    }

    /// Download and record the server's status string
    pub async fn download(&mut self, names: &[String]) -> Result<DownloadResponse> {
        match self.client.download(names).await {
            Ok(response) => {
                self.status = Some(response.status.clone());
                match self.client.active().await {
                    Ok(active) => self.active = active,
                    Err(e) => tracing::warn!("Failed to refresh active config: {e}"),
                }
                Ok(response)
            }
            Err(e) => {
                self.status = Some(format!("Error: {e}"));
                Err(e)
            }
        }
    }

    pub async fn login(&mut self, token: &str) -> Result<LoginResponse> {
        match self.client.login(token).await {
            Ok(response) => {
                self.logged_in = true;
                self.status = Some(response.status.clone());
                Ok(response)
            }
            Err(e) => {
                self.status = Some(format!("Error: {e}"));
                Err(e)
            }
        }
    }

    pub async fn logout(&mut self) -> Result<()> {
        self.client.logout().await?;
        self.logged_in = false;
        self.status = Some("Successfully logged out".to_string());
        Ok(())
    }
}
