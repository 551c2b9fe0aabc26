pub mod client;
pub mod error;
pub mod handlers;
pub mod server;

use crate::error::{DownloaderError, Result};
use crate::models::orchestrator::{DownloadReport, ItemResult};
use serde::{Deserialize, Serialize};

/// Body of `POST download`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_names: Option<Vec<String>>,
    /// `false` runs the download as a background job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<bool>,
}

impl DownloadRequest {
    #[must_use]
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            model_name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn batch(names: Vec<String>) -> Self {
        Self {
            model_names: Some(names),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn detached(mut self) -> Self {
        self.wait = Some(false);
        self
    }

    #[must_use]
    pub fn waits(&self) -> bool {
        self.wait.unwrap_or(true)
    }

    /// Requested names, deduplicated in request order
    pub fn names(&self) -> Result<Vec<String>> {
        let names = match (&self.model_name, &self.model_names) {
            (Some(_), Some(_)) => {
                return Err(DownloaderError::InvalidRequest(
                    "Provide either model_name or model_names, not both".to_string(),
                ))
            }
            (Some(name), None) => vec![name.clone()],
            (None, Some(names)) => names.clone(),
            (None, None) => Vec::new(),
        };

        let mut unique: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.trim();
            if name.is_empty() {
                return Err(DownloaderError::InvalidRequest(
                    "Error: No model name provided".to_string(),
                ));
            }
            if !unique.iter().any(|n| n == name) {
                unique.push(name.to_string());
            }
        }

        if unique.is_empty() {
            return Err(DownloaderError::InvalidRequest(
                "Error: No model name provided".to_string(),
            ));
        }

        Ok(unique)
    }
}

/// Response of a blocking `POST download`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DownloadResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<ItemResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<DownloadReport> for DownloadResponse {
    fn from(report: DownloadReport) -> Self {
        let error = (!report.all_ok()).then(|| report.status.clone());
        Self {
            status: report.status,
            results: report.results,
            error,
        }
    }
}

/// Response of a detached `POST download`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JobAccepted {
    pub job_id: u64,
    pub status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub status: String,
    pub account: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginStatus {
    pub logged_in: bool,
}

/// Plain `{ "status": ... }` body
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub status: String,
}

impl StatusMessage {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

/// Error payload of every non-2xx response
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}
