//! Dashboard endpoints: buoy summaries, reading history, treatment log and
//! fleet metrics. The only write here is the operator-maintained profile.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use super::{errors::AppError, AppState};
use crate::models::{BuoyProfile, BuoySummary, KeyMetrics, StoredReading, TreatmentEvent};
use crate::store::{ReadingRange, DEFAULT_EVENTS_LIMIT};
use crate::ReadingStore;

// ---

pub fn router<S: ReadingStore>() -> Router<AppState<S>> {
    // ---
    Router::new()
        .route("/buoys", get(list_buoys::<S>))
        .route("/buoys/{buoy_id}", get(get_buoy::<S>).put(put_profile::<S>))
        .route("/buoys/{buoy_id}/readings", get(get_readings::<S>))
        .route("/buoys/{buoy_id}/events", get(get_events::<S>))
        .route("/metrics", get(get_metrics::<S>))
}

/// Query parameters for a buoy's reading history
#[derive(Debug, Deserialize)]
pub struct ReadingsQuery {
    /// Inclusive lower bound (RFC 3339)
    from: Option<DateTime<Utc>>,
    /// Inclusive upper bound (RFC 3339)
    to: Option<DateTime<Utc>>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    limit: Option<u32>,
}

async fn list_buoys<S: ReadingStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<BuoySummary>>, AppError> {
    Ok(Json(state.store.list_buoys().await?))
}

async fn get_buoy<S: ReadingStore>(
    State(state): State<AppState<S>>,
    Path(buoy_id): Path<String>,
) -> Result<Json<BuoySummary>, AppError> {
    // ---
    state
        .store
        .get_buoy(&buoy_id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Buoy not found"))
}

/// Replace a buoy's name and location. Takes the ingestion key.
async fn put_profile<S: ReadingStore>(
    State(state): State<AppState<S>>,
    Path(buoy_id): Path<String>,
    body: Bytes,
) -> Result<Json<BuoySummary>, AppError> {
    // ---
    let mut envelope: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("body is not JSON: {e}")))?;
    let Some(fields) = envelope.as_object_mut() else {
        return Err(AppError::BadRequest("body is not a JSON object".to_string()));
    };
    let api_key = fields.remove("api_key");
    state
        .ingestor
        .authorize(api_key.as_ref())
        .map_err(|_| AppError::Unauthorized)?;

    let profile: BuoyProfile =
        serde_json::from_value(envelope).map_err(|e| AppError::BadRequest(e.to_string()))?;
    profile
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    info!("PUT /buoys/{} - profile {:?}", buoy_id, profile);
    state
        .store
        .update_profile(&buoy_id, profile)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Buoy not found"))
}

async fn get_readings<S: ReadingStore>(
    State(state): State<AppState<S>>,
    Path(buoy_id): Path<String>,
    Query(params): Query<ReadingsQuery>,
) -> Result<Json<Vec<StoredReading>>, AppError> {
    // ---
    debug!("GET /buoys/{}/readings - {:?}", buoy_id, params);
    let range = ReadingRange {
        from: params.from,
        to: params.to,
        limit: params.limit,
    };
    Ok(Json(state.store.readings(&buoy_id, &range).await?))
}

async fn get_events<S: ReadingStore>(
    State(state): State<AppState<S>>,
    Path(buoy_id): Path<String>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<Vec<TreatmentEvent>>, AppError> {
    // ---
    let limit = params.limit.unwrap_or(DEFAULT_EVENTS_LIMIT);
    Ok(Json(state.store.events(&buoy_id, limit).await?))
}

async fn get_metrics<S: ReadingStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<KeyMetrics>, AppError> {
    // ---
    let summaries = state.store.list_buoys().await?;
    Ok(Json(KeyMetrics::from_summaries(&summaries)))
}
