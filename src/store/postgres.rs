//! PostgreSQL-backed [`ReadingStore`].
//!
//! Tables are created by [`crate::schema::create_schema`]. Each ingestion is
//! one transaction: summary upsert, reading insert, optional treatment event.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::{CommitOutcome, IngestionBatch, ReadingRange, ReadingStore};
use crate::models::{BuoyProfile, BuoySummary, Location, Measurements, StoredReading, TreatmentEvent};
use crate::whi;

// ---

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct BuoyRow {
    buoy_id: String,
    name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    last_whi: i64,
    last_updated: DateTime<Utc>,
    is_active: bool,
}

impl From<BuoyRow> for BuoySummary {
    fn from(r: BuoyRow) -> Self {
        // Stored last_status is ignored; it is re-derived from the score.
        let location = r
            .latitude
            .zip(r.longitude)
            .map(|(latitude, longitude)| Location {
                latitude,
                longitude,
            });
        BuoySummary::new(r.buoy_id, r.last_whi, r.last_updated, r.is_active).with_profile(BuoyProfile {
            name: r.name,
            location,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReadingRow {
    id: Uuid,
    buoy_id: String,
    reading_id: Option<String>,
    recorded_at: DateTime<Utc>,
    ph: f64,
    turbidity: f64,
    dissolved_oxygen: f64,
    orp: f64,
    temperature: f64,
    whi: i64,
}

impl From<ReadingRow> for StoredReading {
    fn from(r: ReadingRow) -> Self {
        Self {
            id: r.id,
            buoy_id: r.buoy_id,
            reading_id: r.reading_id,
            timestamp: r.recorded_at,
            measurements: Measurements {
                ph: r.ph,
                turbidity: r.turbidity,
                dissolved_oxygen: r.dissolved_oxygen,
                orp: r.orp,
                temperature: r.temperature,
            },
            whi: r.whi,
            status: whi::classify(r.whi),
        }
    }
}

#[derive(Debug, FromRow)]
struct EventRow {
    id: Uuid,
    buoy_id: String,
    recorded_at: DateTime<Utc>,
    event_type: String,
    description: String,
    dosage: Option<f64>,
    duration_minutes: Option<i32>,
}

impl TryFrom<EventRow> for TreatmentEvent {
    type Error = anyhow::Error;

    fn try_from(r: EventRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            event_type: r
                .event_type
                .parse()
                .with_context(|| format!("treatment event {}", r.id))?,
            buoy_id: r.buoy_id,
            timestamp: r.recorded_at,
            description: r.description,
            dosage: r.dosage,
            duration: r.duration_minutes,
        })
    }
}

impl ReadingStore for PgStore {
    async fn commit_ingestion(&self, batch: IngestionBatch) -> Result<CommitOutcome> {
        // ---
        let IngestionBatch {
            reading,
            summary,
            treatment,
        } = batch;

        let mut tx = self.pool.begin().await?;

        // Profile columns are left out so operator edits survive ingestion
        sqlx::query(
            r#"
            INSERT INTO buoys (buoy_id, last_whi, last_status, last_updated, is_active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (buoy_id) DO UPDATE SET
                last_whi     = EXCLUDED.last_whi,
                last_status  = EXCLUDED.last_status,
                last_updated = EXCLUDED.last_updated,
                is_active    = EXCLUDED.is_active
            "#,
        )
        .bind(&summary.buoy_id)
        .bind(summary.last_whi)
        .bind(summary.last_status.as_str())
        .bind(summary.last_updated)
        .bind(summary.is_active)
        .execute(&mut *tx)
        .await?;

        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO readings (
                id, buoy_id, reading_id, recorded_at,
                ph, turbidity, dissolved_oxygen, orp, temperature, whi
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (buoy_id, reading_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(reading.id)
        .bind(&reading.buoy_id)
        .bind(&reading.reading_id)
        .bind(reading.timestamp)
        .bind(reading.measurements.ph)
        .bind(reading.measurements.turbidity)
        .bind(reading.measurements.dissolved_oxygen)
        .bind(reading.measurements.orp)
        .bind(reading.measurements.temperature)
        .bind(reading.whi)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            let whi: i64 = sqlx::query_scalar(
                "SELECT whi FROM readings WHERE buoy_id = $1 AND reading_id = $2",
            )
            .bind(&reading.buoy_id)
            .bind(&reading.reading_id)
            .fetch_one(&mut *tx)
            .await?;

            // The summary upsert above already ran in this transaction.
            // Rolling back discards it, so a re-delivery moves nothing.
            tx.rollback().await?;
            debug!(
                "Duplicate reading {:?} for buoy {}, nothing written",
                reading.reading_id, reading.buoy_id
            );
            return Ok(CommitOutcome::Duplicate { whi });
        }

        if let Some(event) = &treatment {
            sqlx::query(
                r#"
                INSERT INTO treatment_events (
                    id, buoy_id, recorded_at, event_type, description, dosage, duration_minutes
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(event.id)
            .bind(&event.buoy_id)
            .bind(event.timestamp)
            .bind(event.event_type.as_str())
            .bind(&event.description)
            .bind(event.dosage)
            .bind(event.duration)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(CommitOutcome::Applied)
    }

    async fn list_buoys(&self) -> Result<Vec<BuoySummary>> {
        // ---
        let rows: Vec<BuoyRow> = sqlx::query_as(
            r#"
            SELECT buoy_id, name, latitude, longitude, last_whi, last_updated, is_active
            FROM buoys
            ORDER BY buoy_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_buoy(&self, buoy_id: &str) -> Result<Option<BuoySummary>> {
        // ---
        let row: Option<BuoyRow> = sqlx::query_as(
            r#"
            SELECT buoy_id, name, latitude, longitude, last_whi, last_updated, is_active
            FROM buoys
            WHERE buoy_id = $1
            "#,
        )
        .bind(buoy_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn update_profile(&self, buoy_id: &str, profile: BuoyProfile) -> Result<Option<BuoySummary>> {
        // ---
        let row: Option<BuoyRow> = sqlx::query_as(
            r#"
            UPDATE buoys SET name = $2, latitude = $3, longitude = $4
            WHERE buoy_id = $1
            RETURNING buoy_id, name, latitude, longitude, last_whi, last_updated, is_active
            "#,
        )
        .bind(buoy_id)
        .bind(&profile.name)
        .bind(profile.location.map(|l| l.latitude))
        .bind(profile.location.map(|l| l.longitude))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn readings(&self, buoy_id: &str, range: &ReadingRange) -> Result<Vec<StoredReading>> {
        // ---
        let rows: Vec<ReadingRow> = sqlx::query_as(
            r#"
            SELECT * FROM (
                SELECT id, buoy_id, reading_id, recorded_at,
                       ph, turbidity, dissolved_oxygen, orp, temperature, whi
                FROM readings
                WHERE buoy_id = $1
                  AND ($2::timestamptz IS NULL OR recorded_at >= $2)
                  AND ($3::timestamptz IS NULL OR recorded_at <= $3)
                ORDER BY recorded_at DESC
                LIMIT $4
            ) recent
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(buoy_id)
        .bind(range.from)
        .bind(range.to)
        .bind(i64::from(range.limit()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn events(&self, buoy_id: &str, limit: u32) -> Result<Vec<TreatmentEvent>> {
        // ---
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT id, buoy_id, recorded_at, event_type, description, dosage, duration_minutes
            FROM treatment_events
            WHERE buoy_id = $1
            ORDER BY recorded_at DESC
            LIMIT $2
            "#,
        )
        .bind(buoy_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
