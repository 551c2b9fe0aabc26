//! Endpoint handlers
//!
//! Request bodies are taken as raw bytes and parsed here, since the panel
//! posts JSON without a `Content-Type` header.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::error::ApiError;
use crate::api::server::AppState;
use crate::api::{
    DownloadRequest, DownloadResponse, JobAccepted, LoginRequest, LoginResponse, LoginStatus,
    StatusMessage,
};
use crate::error::DownloaderError;
use crate::models::{ActivationState, DownloadJob, ModelEntry};

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("Rejected malformed request body: {e}");
        ApiError::bad_request(format!("Malformed request body: {e}"))
    })
}

pub async fn health() -> Json<StatusMessage> {
    Json(StatusMessage::new("ok"))
}

/// List the catalog
pub async fn get_config(State(state): State<AppState>) -> Result<Json<Vec<ModelEntry>>, ApiError> {
    let catalog = state.catalog.load()?;
    debug!("Serving {} catalog entries", catalog.entries.len());
    Ok(Json(catalog.entries))
}

pub async fn get_active(State(state): State<AppState>) -> Json<ActivationState> {
    Json(state.activation.get().await)
}

/// Replace the activation state wholesale
pub async fn update_active(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StatusMessage>, ApiError> {
    let new_state = ActivationState::from_json(&body).map_err(|e| {
        warn!("Rejected active config update: {e}");
        ApiError::from(e)
    })?;

    info!(
        "Updating active config: {} enabled models",
        new_state.enabled_models.len()
    );
    state.activation.replace(new_state).await?;

    Ok(Json(StatusMessage::new("success")))
}

/// Download one or more models, blocking unless `wait` is false
pub async fn download(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: DownloadRequest = parse_body(&body)?;
    let names = request.names()?;
    info!("Download requested for {:?}", names);

    let plan = state.orchestrator.plan(&names).await.map_err(|e| {
        warn!("Download of {:?} rejected: {e}", names);
        ApiError::from(e)
    })?;

    if !request.waits() {
        let job = state
            .jobs
            .spawn(Arc::clone(&state.orchestrator), plan)
            .await;
        let accepted = JobAccepted {
            job_id: job.id,
            status: format!("Download of {} started in background", names.join(", ")),
        };
        return Ok((StatusCode::ACCEPTED, Json(accepted)).into_response());
    }

    let report = state.orchestrator.execute(plan).await;
    let status = if report.all_ok() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };

    Ok((status, Json(DownloadResponse::from(report))).into_response())
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<DownloadJob>, ApiError> {
    Ok(Json(state.jobs.get(id).await?))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<DownloadJob>, ApiError> {
    info!("Cancel requested for download job {}", id);
    Ok(Json(state.jobs.cancel(id).await?))
}

/// Report which matching models are present on disk
pub async fn check(
    State(state): State<AppState>,
    Path(model_name): Path<String>,
) -> Result<Json<StatusMessage>, ApiError> {
    info!("Checking downloads matching '{}'", model_name);
    Ok(Json(StatusMessage::new(state.orchestrator.check(&model_name)?)))
}

pub async fn login_status(State(state): State<AppState>) -> Json<LoginStatus> {
    Json(LoginStatus {
        logged_in: state.sessions.is_logged_in().await,
    })
}

/// Validate a hub token and start a session
pub async fn login(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<LoginResponse>, ApiError> {
    let request: LoginRequest = parse_body(&body)?;

    match state.sessions.login(&request.token).await {
        Ok(session) => Ok(Json(LoginResponse {
            status: "Successfully logged in".to_string(),
            account: session.account,
        })),
        Err(e) => {
            warn!("Login failed: {e}");
            Err(match e {
                DownloaderError::Hub(crate::error::HubError::InvalidToken) => {
                    ApiError::unauthorized("Login failed: invalid or expired hub token")
                }
                other => ApiError::from(other),
            })
        }
    }
}

pub async fn logout(State(state): State<AppState>) -> Json<StatusMessage> {
    state.sessions.logout().await;
    Json(StatusMessage::new("Successfully logged out"))
}

/// Fallback for unknown routes
pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "No such endpoint" })),
    )
        .into_response()
}
