//! Database schema management for `jal-darpan`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `buoys` summary table, the append-only `readings` history and
/// the append-only `treatment_events` log. Safe to call on every startup;
/// no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // One row per buoy, upserted by every ingestion
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS buoys (
            buoy_id      TEXT PRIMARY KEY,
            name         TEXT,
            latitude     DOUBLE PRECISION,
            longitude    DOUBLE PRECISION,
            last_whi     BIGINT      NOT NULL,
            last_status  TEXT        NOT NULL,
            last_updated TIMESTAMPTZ NOT NULL,
            is_active    BOOLEAN     NOT NULL DEFAULT TRUE
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Tables created before buoy profiles existed
    sqlx::query(
        r#"
        ALTER TABLE buoys
            ADD COLUMN IF NOT EXISTS name      TEXT,
            ADD COLUMN IF NOT EXISTS latitude  DOUBLE PRECISION,
            ADD COLUMN IF NOT EXISTS longitude DOUBLE PRECISION;
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Reading history served by `/buoys/{buoy_id}/readings`
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS readings (
            id               UUID PRIMARY KEY,
            buoy_id          TEXT             NOT NULL REFERENCES buoys (buoy_id),
            reading_id       TEXT,
            recorded_at      TIMESTAMPTZ      NOT NULL,
            ph               DOUBLE PRECISION NOT NULL,
            turbidity        DOUBLE PRECISION NOT NULL,
            dissolved_oxygen DOUBLE PRECISION NOT NULL,
            orp              DOUBLE PRECISION NOT NULL,
            temperature      DOUBLE PRECISION NOT NULL,
            whi              BIGINT           NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS treatment_events (
            id               UUID PRIMARY KEY,
            buoy_id          TEXT             NOT NULL REFERENCES buoys (buoy_id),
            recorded_at      TIMESTAMPTZ      NOT NULL,
            event_type       TEXT             NOT NULL,
            description      TEXT             NOT NULL,
            dosage           DOUBLE PRECISION,
            duration_minutes INTEGER
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // NULL reading_ids never collide, so readings without one are always appended
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_readings_buoy_reading_id
            ON readings (buoy_id, reading_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_buoy_recorded_at
            ON readings (buoy_id, recorded_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_treatment_events_buoy_recorded_at
            ON treatment_events (buoy_id, recorded_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
