//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::{DownloaderError, HubError};

/// API error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: msg.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<DownloaderError> for ApiError {
    fn from(err: DownloaderError) -> Self {
        match &err {
            DownloaderError::InvalidRequest(msg) => Self::bad_request(msg.clone()),
            DownloaderError::AuthRequired(_) => Self::unauthorized(err.to_string()),
            DownloaderError::NotFound(msg) => Self::not_found(msg.clone()),
            DownloaderError::ServiceUnavailable(msg) => {
                Self::unavailable(format!("Service unavailable: {msg}"))
            }
            DownloaderError::Hub(HubError::InvalidToken) => {
                Self::unauthorized("Invalid or expired hub token")
            }
            DownloaderError::Hub(_) => Self::bad_gateway(err.to_string()),
            DownloaderError::Config(_) | DownloaderError::Io(_) => Self::internal(err.to_string()),
        }
    }
}
