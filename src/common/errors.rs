//! Service error taxonomy and HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by the registry and the HTTP handlers.
///
/// Internal and transport failures are logged server-side and answered
/// with a generic message; everything else carries its text to the caller.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    NotReady(String),
    #[error("instance limit reached")]
    CapacityExhausted,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::NotReady(_) => "not_ready",
            AppError::CapacityExhausted => "capacity",
            AppError::Transport(_) => "transport",
            AppError::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotReady(_) | AppError::CapacityExhausted => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Transport(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Transport(err) => {
                tracing::error!("transport failure: {err}");
                "transport failure".to_string()
            }
            AppError::Internal(err) => {
                tracing::error!("internal error: {err:#}");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "type": self.kind(),
                "message": message,
            }
        }));

        (self.status_code(), body).into_response()
    }
}
