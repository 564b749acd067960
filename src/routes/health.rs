// src/routes/health.rs
//! Liveness endpoint for the Jal Darpan backend.
//!
//! Used by container orchestrators and the dashboard to check that the
//! service is up. Follows the Explicit Module Boundary Pattern (EMBP): the
//! handler stays private and only a subrouter is exported to the gateway.

use axum::{routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Handle `GET /health`. Does not touch the reading store.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Subrouter with the `/health` route, generic over the gateway state.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
