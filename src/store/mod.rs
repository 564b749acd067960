//! Reading store gateway.
//!
//! The ingestion path and the dashboard read endpoints only talk to the
//! [`ReadingStore`] trait. Two backends are provided: PostgreSQL for real
//! deployments and an in-memory map for tests and store-less runs.

use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{BuoyProfile, BuoySummary, StoredReading, TreatmentEvent};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---

/// Default number of readings returned by a history query.
pub const DEFAULT_READINGS_LIMIT: u32 = 1000;

/// Upper bound on a single history query.
pub const MAX_READINGS_LIMIT: u32 = 10_000;

/// Default number of treatment events returned by an event query.
pub const DEFAULT_EVENTS_LIMIT: u32 = 100;

/// Everything one ingestion writes. Applied all-or-nothing.
#[derive(Debug, Clone)]
pub struct IngestionBatch {
    pub reading: StoredReading,
    pub summary: BuoySummary,
    pub treatment: Option<TreatmentEvent>,
}

/// Result of committing an [`IngestionBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Applied,
    /// A reading with the same `(buoy_id, reading_id)` already exists;
    /// nothing was written. Carries the stored reading's WHI.
    Duplicate { whi: i64 },
}

/// Filter for a buoy's reading history.
#[derive(Debug, Clone, Default)]
pub struct ReadingRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl ReadingRange {
    /// Effective limit, defaulted and capped.
    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_READINGS_LIMIT)
            .min(MAX_READINGS_LIMIT)
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| *ts >= from) && self.to.map_or(true, |to| *ts <= to)
    }
}

/// Keyed-by-buoy document store backing the service.
///
/// `commit_ingestion` must apply the reading append, the summary upsert and
/// the optional treatment event atomically: a concurrent reader never sees
/// one without the others. It must also leave the buoy's profile as it was.
pub trait ReadingStore: Clone + Send + Sync + 'static {
    fn commit_ingestion(
        &self,
        batch: IngestionBatch,
    ) -> impl Future<Output = Result<CommitOutcome>> + Send;

    /// All buoy summaries ordered by buoy id.
    fn list_buoys(&self) -> impl Future<Output = Result<Vec<BuoySummary>>> + Send;

    fn get_buoy(&self, buoy_id: &str) -> impl Future<Output = Result<Option<BuoySummary>>> + Send;

    /// Replace a buoy's profile. `None` when the buoy has never reported.
    fn update_profile(
        &self,
        buoy_id: &str,
        profile: BuoyProfile,
    ) -> impl Future<Output = Result<Option<BuoySummary>>> + Send;

    /// Most recent readings matching `range`, returned oldest first.
    fn readings(
        &self,
        buoy_id: &str,
        range: &ReadingRange,
    ) -> impl Future<Output = Result<Vec<StoredReading>>> + Send;

    /// Treatment events, newest first.
    fn events(
        &self,
        buoy_id: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<TreatmentEvent>>> + Send;
}
