//! Request error taxonomy and its registry-shaped HTTP rendering.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chartport_helm::HelmError;
use chartport_oci::OciError;
use chartport_storage::StorageError;
use serde::Serialize;
use tracing::{debug, error, warn};

/// One entry of a registry error document.
#[derive(Debug, Serialize)]
pub struct ErrorEntry {
    pub code: &'static str,
    pub message: &'static str,
}

/// `{"errors":[{"code":..., "message":...}]}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorEntry>,
}

/// Everything a registry request can fail with.
///
/// The payload is the internal cause; it is logged, never sent to the client.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("invalid chart: {0}")]
    InvalidChart(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ProxyError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "NAME_INVALID",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::InvalidChart(_) => "INVALID_CHART",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Client-visible message. Fixed per category.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid registry path",
            Self::NotFound(_) => "not found",
            Self::Upstream(_) => "chart repository request failed",
            Self::InvalidChart(_) => "chart archive is invalid",
            Self::Storage(_) => "storage failure",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) | Self::InvalidChart(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<HelmError> for ProxyError {
    fn from(err: HelmError) -> Self {
        match err {
            HelmError::NotFound(msg) => Self::NotFound(msg),
            HelmError::Upstream(msg) => Self::Upstream(msg),
            HelmError::InvalidChart(msg) => Self::InvalidChart(msg),
            HelmError::Io(msg) => Self::Storage(msg),
        }
    }
}

impl From<StorageError> for ProxyError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => Self::NotFound(format!("blob {key}")),
            StorageError::InvalidKey(msg) => Self::InvalidRequest(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<OciError> for ProxyError {
    fn from(err: OciError) -> Self {
        match err {
            OciError::InvalidLayer(msg) => Self::InvalidChart(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), cause = %self, "request failed");
        } else if status == StatusCode::NOT_FOUND {
            debug!(status = status.as_u16(), cause = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), cause = %self, "request failed");
        }

        let body = ErrorResponse {
            errors: vec![ErrorEntry {
                code: self.code(),
                message: self.public_message(),
            }],
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for registry handlers.
pub type ProxyResult<T> = std::result::Result<T, ProxyError>;
