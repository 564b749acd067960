use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::{errors::internal_error, AppState};
use crate::{IngestError, IngestRequest, ReadingStore, WaterStatus};

// ---

pub fn router<S: ReadingStore>() -> Router<AppState<S>> {
    // ---
    Router::new().route(
        "/ingest",
        post(handler::<S>)
            .options(preflight)
            .fallback(method_not_allowed),
    )
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    success: bool,
    whi: i64,
    status: WaterStatus,
    message: &'static str,
}

async fn handler<S: ReadingStore>(State(state): State<AppState<S>>, body: Bytes) -> Response {
    // ---
    debug!("POST /ingest - {} bytes", body.len());

    let request = match IngestRequest::from_body(&body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    match state.ingestor.ingest(request).await {
        Ok(accepted) => {
            info!(
                "POST /ingest - accepted whi={} status={} duplicate={} treatment={}",
                accepted.whi, accepted.status, accepted.duplicate, accepted.treatment_triggered
            );
            let message = if accepted.duplicate {
                "Reading already ingested"
            } else {
                "Data ingested successfully"
            };
            (
                StatusCode::OK,
                Json(IngestResponse {
                    success: true,
                    whi: accepted.whi,
                    status: accepted.status,
                    message,
                }),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        // ---
        match &self {
            IngestError::Unauthorized => {
                warn!("POST /ingest - rejected: {}", self);
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "Invalid API key" })),
                )
                    .into_response()
            }
            IngestError::InvalidData(_) => {
                warn!("POST /ingest - rejected: {}", self);
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "Invalid sensor data" })),
                )
                    .into_response()
            }
            IngestError::Store(_) => {
                error!("Error ingesting data: {}", self);
                internal_error()
            }
        }
    }
}

/// CORS preflight: headers only, no body.
async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
        .into_response()
}
