use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

// ---

/// Error type for the dashboard routes.
///
/// Internal causes are logged, never returned to the caller.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(&'static str),

    #[error("invalid API key")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(what) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": what }))).into_response()
            }
            AppError::Unauthorized => {
                warn!("Request rejected: invalid API key");
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "Invalid API key" })),
                )
                    .into_response()
            }
            AppError::BadRequest(reason) => {
                warn!("Request rejected: {}", reason);
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "Invalid buoy profile" })),
                )
                    .into_response()
            }
            AppError::Internal(e) => {
                error!("Request failed: {:#}", e);
                internal_error()
            }
        }
    }
}

/// The only 500 body the service ever sends.
pub fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}
