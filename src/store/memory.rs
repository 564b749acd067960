use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use tokio::sync::RwLock;

use super::{CommitOutcome, IngestionBatch, ReadingRange, ReadingStore};
use crate::models::{BuoyProfile, BuoySummary, StoredReading, TreatmentEvent};

// ---

#[derive(Debug, Default)]
struct BuoyDocument {
    summary: Option<BuoySummary>,
    readings: Vec<StoredReading>,
    events: Vec<TreatmentEvent>,
}

/// In-memory store, one document per buoy.
///
/// Wrapped in `Arc` so it can be cheaply cloned into router state.
/// A whole ingestion is applied under a single write lock, so readers
/// always observe either none or all of it.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<BTreeMap<String, BuoyDocument>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadingStore for MemoryStore {
    async fn commit_ingestion(&self, batch: IngestionBatch) -> Result<CommitOutcome> {
        // ---
        let mut buoys = self.inner.write().await;
        let doc = buoys.entry(batch.reading.buoy_id.clone()).or_default();

        if let Some(reading_id) = batch.reading.reading_id.as_deref() {
            let existing = doc
                .readings
                .iter()
                .find(|r| r.reading_id.as_deref() == Some(reading_id));
            if let Some(existing) = existing {
                return Ok(CommitOutcome::Duplicate { whi: existing.whi });
            }
        }

        let profile = doc.summary.take().map(|s| s.profile).unwrap_or_default();
        doc.readings.push(batch.reading);
        doc.summary = Some(batch.summary.with_profile(profile));
        if let Some(event) = batch.treatment {
            doc.events.push(event);
        }

        Ok(CommitOutcome::Applied)
    }

    async fn list_buoys(&self) -> Result<Vec<BuoySummary>> {
        Ok(self
            .inner
            .read()
            .await
            .values()
            .filter_map(|doc| doc.summary.clone())
            .collect())
    }

    async fn get_buoy(&self, buoy_id: &str) -> Result<Option<BuoySummary>> {
        Ok(self
            .inner
            .read()
            .await
            .get(buoy_id)
            .and_then(|doc| doc.summary.clone()))
    }

    async fn update_profile(&self, buoy_id: &str, profile: BuoyProfile) -> Result<Option<BuoySummary>> {
        // ---
        let mut buoys = self.inner.write().await;
        let Some(summary) = buoys.get_mut(buoy_id).and_then(|doc| doc.summary.as_mut()) else {
            return Ok(None);
        };
        summary.profile = profile;
        Ok(Some(summary.clone()))
    }

    async fn readings(&self, buoy_id: &str, range: &ReadingRange) -> Result<Vec<StoredReading>> {
        // ---
        let buoys = self.inner.read().await;
        let Some(doc) = buoys.get(buoy_id) else {
            return Ok(Vec::new());
        };

        let mut matching: Vec<StoredReading> = doc
            .readings
            .iter()
            .filter(|r| range.contains(&r.timestamp))
            .cloned()
            .collect();
        // Stable sort keeps arrival order for equal timestamps.
        matching.sort_by_key(|r| r.timestamp);

        let limit = range.limit() as usize;
        if matching.len() > limit {
            matching.drain(..matching.len() - limit);
        }
        Ok(matching)
    }

    async fn events(&self, buoy_id: &str, limit: u32) -> Result<Vec<TreatmentEvent>> {
        // ---
        let buoys = self.inner.read().await;
        let Some(doc) = buoys.get(buoy_id) else {
            return Ok(Vec::new());
        };

        let mut events = doc.events.clone();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit as usize);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{Location, Measurements, SensorReading};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 12, 0, 0).unwrap()
    }

    fn batch(buoy_id: &str, minutes: i64, whi: i64, reading_id: Option<&str>) -> IngestionBatch {
        // ---
        let timestamp = base() + Duration::minutes(minutes);
        let reading = SensorReading {
            buoy_id: buoy_id.to_string(),
            timestamp,
            measurements: Measurements {
                ph: 7.0,
                turbidity: 0.0,
                dissolved_oxygen: 10.0,
                orp: 200.0,
                temperature: 25.0,
            },
            reading_id: reading_id.map(str::to_string),
        };
        IngestionBatch {
            reading: StoredReading::new(&reading, whi),
            summary: BuoySummary::new(buoy_id, whi, timestamp, true),
            treatment: (whi < 50).then(|| TreatmentEvent::microbe_mix(buoy_id, timestamp, whi)),
        }
    }

    #[tokio::test]
    async fn test_commit_creates_summary_and_history() {
        // ---
        let store = MemoryStore::new();
        assert!(store.get_buoy("1").await.unwrap().is_none());

        let outcome = store.commit_ingestion(batch("1", 0, 87, None)).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Applied);

        let summary = store.get_buoy("1").await.unwrap().unwrap();
        assert_eq!(summary.last_whi, 87);
        assert!(summary.is_active);
        assert_eq!(store.readings("1", &ReadingRange::default()).await.unwrap().len(), 1);
        assert!(store.events("1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_reading_id_writes_nothing() {
        // ---
        let store = MemoryStore::new();
        store.commit_ingestion(batch("1", 0, 40, Some("r-1"))).await.unwrap();

        let outcome = store.commit_ingestion(batch("1", 5, 40, Some("r-1"))).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Duplicate { whi: 40 });

        assert_eq!(store.readings("1", &ReadingRange::default()).await.unwrap().len(), 1);
        assert_eq!(store.events("1", 10).await.unwrap().len(), 1);
        assert_eq!(store.get_buoy("1").await.unwrap().unwrap().last_updated, base());

        // Same id on another buoy is a different reading.
        let other = store.commit_ingestion(batch("2", 0, 40, Some("r-1"))).await.unwrap();
        assert_eq!(other, CommitOutcome::Applied);
    }

    #[tokio::test]
    async fn test_ingestion_keeps_profile() {
        // ---
        let store = MemoryStore::new();
        let profile = BuoyProfile {
            name: Some("Sukhna Lake - East".to_string()),
            location: Some(Location {
                latitude: 30.742,
                longitude: 76.818,
            }),
        };

        assert!(store.update_profile("1", profile.clone()).await.unwrap().is_none());

        store.commit_ingestion(batch("1", 0, 87, None)).await.unwrap();
        let updated = store.update_profile("1", profile.clone()).await.unwrap().unwrap();
        assert_eq!(updated.profile, profile);
        assert_eq!(updated.last_whi, 87);

        store.commit_ingestion(batch("1", 5, 40, None)).await.unwrap();
        let summary = store.get_buoy("1").await.unwrap().unwrap();
        assert_eq!(summary.profile, profile);
        assert_eq!(summary.last_whi, 40);
        assert_eq!(summary.last_updated, base() + Duration::minutes(5));
    }

    #[tokio::test]
    async fn test_readings_range_and_limit() {
        // ---
        let store = MemoryStore::new();
        for minutes in [30, 0, 10, 20] {
            store.commit_ingestion(batch("1", minutes, 80, None)).await.unwrap();
        }

        let all = store.readings("1", &ReadingRange::default()).await.unwrap();
        let times: Vec<_> = all.iter().map(|r| r.timestamp).collect();
        assert_eq!(
            times,
            vec![
                base(),
                base() + Duration::minutes(10),
                base() + Duration::minutes(20),
                base() + Duration::minutes(30),
            ]
        );

        let windowed = store
            .readings(
                "1",
                &ReadingRange {
                    from: Some(base() + Duration::minutes(10)),
                    to: Some(base() + Duration::minutes(20)),
                    limit: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(windowed.len(), 2);

        let latest = store
            .readings(
                "1",
                &ReadingRange {
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].timestamp, base() + Duration::minutes(30));

        assert!(store.readings("missing", &ReadingRange::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_newest_first() {
        // ---
        let store = MemoryStore::new();
        for minutes in [0, 20, 10] {
            store.commit_ingestion(batch("1", minutes, 30, None)).await.unwrap();
        }

        let events = store.events("1", 2).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, base() + Duration::minutes(20));
        assert_eq!(events[1].timestamp, base() + Duration::minutes(10));
    }

    #[test]
    fn test_list_buoys_sorted_by_id() {
        // ---
        let store = MemoryStore::new();
        tokio_test::block_on(async {
            for id in ["3", "1", "2"] {
                store.commit_ingestion(batch(id, 0, 70, None)).await.unwrap();
            }
            let ids: Vec<String> = store
                .list_buoys()
                .await
                .unwrap()
                .into_iter()
                .map(|s| s.buoy_id)
                .collect();
            assert_eq!(ids, vec!["1", "2", "3"]);
        });
    }
}
