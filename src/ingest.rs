//! Telemetry ingestion: authorize, validate, score, persist.
//!
//! [`Ingestor`] owns the decision logic behind `POST /ingest`. It is
//! stateless per call; everything durable goes through the injected
//! [`ReadingStore`] in a single atomic [`IngestionBatch`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{BuoySummary, RawSensorReading, SensorReading, StoredReading, TreatmentEvent};
use crate::store::{CommitOutcome, IngestionBatch, ReadingStore};
use crate::whi::{self, WaterStatus};

// ---

/// Readings scoring strictly below this trigger an automatic treatment.
pub const TREATMENT_THRESHOLD: i64 = 50;

/// Why an ingestion did not complete.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid API key")]
    Unauthorized,

    #[error("invalid sensor data: {0}")]
    InvalidData(String),

    #[error("store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Request envelope as posted by a buoy.
///
/// Both fields are kept loose so a wrong-typed key is still "unauthorized"
/// and the sensor data is only inspected after the key has been checked.
#[derive(Debug, Default, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub api_key: Option<serde_json::Value>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl IngestRequest {
    /// Parse a raw request body. Anything but a JSON object is invalid data.
    pub fn from_body(body: &[u8]) -> Result<Self, IngestError> {
        // ---
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| IngestError::InvalidData(format!("body is not JSON: {e}")))?;
        if !value.is_object() {
            return Err(IngestError::InvalidData("body is not a JSON object".to_string()));
        }
        serde_json::from_value(value).map_err(|e| IngestError::InvalidData(e.to_string()))
    }
}

/// Successful ingestion result.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestAccepted {
    pub whi: i64,
    pub status: WaterStatus,
    /// The reading had already been ingested; nothing new was written.
    pub duplicate: bool,
    pub treatment_triggered: bool,
}

/// Ingestion service, constructed once with its store and shared secret.
#[derive(Clone)]
pub struct Ingestor<S> {
    store: S,
    api_key: Arc<str>,
}

impl<S: ReadingStore> Ingestor<S> {
    pub fn new(store: S, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            store,
            api_key: api_key.into(),
        }
    }

    /// Run one ingestion end to end.
    ///
    /// Nothing is written unless authorization and validation both pass.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestAccepted, IngestError> {
        // ---
        self.authorize(request.api_key.as_ref())?;
        let reading = decode_reading(request.data, Utc::now())?;
        self.ingest_reading(reading).await
    }

    /// Score and persist an already validated reading.
    pub async fn ingest_reading(&self, reading: SensorReading) -> Result<IngestAccepted, IngestError> {
        // ---
        let batch = plan_ingestion(&reading);
        let whi = batch.reading.whi;
        let status = batch.summary.last_status;
        let treatment_triggered = batch.treatment.is_some();

        debug!(
            "Scored buoy {} at {}: whi={} status={}",
            reading.buoy_id, reading.timestamp, whi, status
        );

        match self.store.commit_ingestion(batch).await? {
            CommitOutcome::Applied => {
                if treatment_triggered {
                    info!(
                        "Treatment dispatched for buoy {}: microbe_mix, whi={}",
                        reading.buoy_id, whi
                    );
                }
                Ok(IngestAccepted {
                    whi,
                    status,
                    duplicate: false,
                    treatment_triggered,
                })
            }
            CommitOutcome::Duplicate { whi } => {
                info!(
                    "Reading {:?} for buoy {} already ingested",
                    reading.reading_id, reading.buoy_id
                );
                Ok(IngestAccepted {
                    whi,
                    status: whi::classify(whi),
                    duplicate: true,
                    treatment_triggered: false,
                })
            }
        }
    }

    /// Check a caller-supplied key against the configured secret.
    pub fn authorize(&self, api_key: Option<&serde_json::Value>) -> Result<(), IngestError> {
        match api_key.and_then(|k| k.as_str()) {
            Some(key) if key == &*self.api_key => Ok(()),
            _ => Err(IngestError::Unauthorized),
        }
    }
}

/// Decode and validate the `data` object of a request.
///
/// `now` is used when the reading carries no timestamp.
pub fn decode_reading(
    data: Option<serde_json::Value>,
    now: DateTime<Utc>,
) -> Result<SensorReading, IngestError> {
    // ---
    let data = data.ok_or_else(|| IngestError::InvalidData("missing data object".to_string()))?;
    let raw: RawSensorReading =
        serde_json::from_value(data).map_err(|e| IngestError::InvalidData(e.to_string()))?;

    if raw.buoy_id.is_empty() {
        return Err(IngestError::InvalidData("buoy_id is empty".to_string()));
    }
    if raw.buoy_id.contains('/') {
        return Err(IngestError::InvalidData(format!(
            "buoy_id {:?} contains '/'",
            raw.buoy_id
        )));
    }
    if raw.reading_id.as_deref() == Some("") {
        return Err(IngestError::InvalidData("reading_id is empty".to_string()));
    }

    let timestamp = resolve_timestamp(raw.timestamp.as_ref(), now)?;
    let measurements = raw.measurements();

    Ok(SensorReading {
        buoy_id: raw.buoy_id,
        timestamp,
        measurements,
        reading_id: raw.reading_id,
    })
}

/// Epoch milliseconds to a UTC instant.
///
/// Falsy values (absent, `null`, `false`, `0`, `""`) mean `now`. Any other
/// non-number, or a number outside the representable range, is rejected.
fn resolve_timestamp(
    value: Option<&serde_json::Value>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, IngestError> {
    // ---
    use serde_json::Value;

    let ms = match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return Ok(now),
        Some(Value::String(s)) if s.is_empty() => return Ok(now),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| IngestError::InvalidData(format!("timestamp {n} is not a number")))?,
        Some(other) => {
            return Err(IngestError::InvalidData(format!(
                "timestamp {other} is not epoch milliseconds"
            )))
        }
    };

    if ms == 0.0 {
        return Ok(now);
    }
    DateTime::from_timestamp_millis(ms.trunc() as i64)
        .ok_or_else(|| IngestError::InvalidData(format!("timestamp {ms} out of range")))
}

/// Build everything one reading writes: history row, summary, and the
/// treatment event when the score is low enough.
///
/// The reading and the summary share the same timestamp.
pub fn plan_ingestion(reading: &SensorReading) -> IngestionBatch {
    // ---
    let whi = whi::compute_whi(&reading.measurements);

    IngestionBatch {
        reading: StoredReading::new(reading, whi),
        summary: BuoySummary::new(reading.buoy_id.as_str(), whi, reading.timestamp, true),
        treatment: needs_treatment(whi)
            .then(|| TreatmentEvent::microbe_mix(&reading.buoy_id, reading.timestamp, whi)),
    }
}

pub fn needs_treatment(whi: i64) -> bool {
    whi < TREATMENT_THRESHOLD
}
