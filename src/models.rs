//! Data models for buoy telemetry, summaries and treatment events.

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::whi::{self, WaterStatus};

// ---

/// Grams of microbe mix dispensed per automatic treatment.
pub const MICROBE_MIX_DOSAGE_GRAMS: f64 = 5.0;

/// The five measurements that feed the Water Health Index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    // ---
    pub ph: f64,
    /// NTU.
    pub turbidity: f64,
    /// mg/L.
    pub dissolved_oxygen: f64,
    /// Oxidation-reduction potential, mV.
    pub orp: f64,
    /// °C.
    pub temperature: f64,
}

/// Raw `data` object as posted by a buoy.
///
/// Only shape is enforced here; semantic checks (empty ids, timestamp range)
/// happen in [`crate::ingest`].
#[derive(Debug, Deserialize)]
pub struct RawSensorReading {
    // ---
    pub buoy_id: String,
    pub ph: f64,
    pub turbidity: f64,
    pub dissolved_oxygen: f64,
    pub orp: f64,
    pub temperature: f64,
    /// Epoch milliseconds. Kept loose because any falsy value (`null`,
    /// `false`, `0`, `""`) means "now"; see [`crate::ingest`].
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
    /// Client-assigned identifier used to drop re-deliveries.
    #[serde(default)]
    pub reading_id: Option<String>,
}

impl RawSensorReading {
    pub fn measurements(&self) -> Measurements {
        Measurements {
            ph: self.ph,
            turbidity: self.turbidity,
            dissolved_oxygen: self.dissolved_oxygen,
            orp: self.orp,
            temperature: self.temperature,
        }
    }
}

/// A validated reading, ready to be scored and persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub buoy_id: String,
    pub timestamp: DateTime<Utc>,
    pub measurements: Measurements,
    pub reading_id: Option<String>,
}

/// A reading as kept in a buoy's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReading {
    // ---
    pub id: Uuid,
    pub buoy_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub measurements: Measurements,
    pub whi: i64,
    pub status: WaterStatus,
}

impl StoredReading {
    pub fn new(reading: &SensorReading, whi: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            buoy_id: reading.buoy_id.clone(),
            reading_id: reading.reading_id.clone(),
            timestamp: reading.timestamp,
            measurements: reading.measurements,
            whi,
            status: whi::classify(whi),
        }
    }
}

/// Where a buoy is moored, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Operator-maintained description of a buoy. Ingestion never touches it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuoyProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl BuoyProfile {
    pub fn validate(&self) -> anyhow::Result<()> {
        // ---
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(anyhow!("name is blank"));
        }
        if let Some(Location {
            latitude,
            longitude,
        }) = self.location
        {
            if !(-90.0..=90.0).contains(&latitude) {
                return Err(anyhow!("latitude {latitude} out of range"));
            }
            if !(-180.0..=180.0).contains(&longitude) {
                return Err(anyhow!("longitude {longitude} out of range"));
            }
        }
        Ok(())
    }
}

/// Latest known state of a buoy.
///
/// `last_status` is always derived from `last_whi`, never read back from
/// storage on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuoySummary {
    // ---
    pub buoy_id: String,
    #[serde(flatten)]
    pub profile: BuoyProfile,
    pub last_whi: i64,
    pub last_status: WaterStatus,
    pub last_updated: DateTime<Utc>,
    pub is_active: bool,
}

impl BuoySummary {
    /// Summary with an empty profile.
    pub fn new(buoy_id: impl Into<String>, last_whi: i64, last_updated: DateTime<Utc>, is_active: bool) -> Self {
        Self {
            buoy_id: buoy_id.into(),
            profile: BuoyProfile::default(),
            last_whi,
            last_status: whi::classify(last_whi),
            last_updated,
            is_active,
        }
    }

    pub fn with_profile(mut self, profile: BuoyProfile) -> Self {
        self.profile = profile;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MicrobeMix,
    /// Logged by operators; never emitted by ingestion.
    Aeration,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MicrobeMix => "microbe_mix",
            EventType::Aeration => "aeration",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "microbe_mix" => Ok(Self::MicrobeMix),
            "aeration" => Ok(Self::Aeration),
            other => Err(anyhow!("unknown treatment event type: {other:?}")),
        }
    }
}

/// Append-only record of a remedial action taken on a buoy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreatmentEvent {
    // ---
    pub id: Uuid,
    pub buoy_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub description: String,
    /// Grams.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dosage: Option<f64>,
    /// Minutes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
}

impl TreatmentEvent {
    /// Automatic microbe-mix dose triggered by a low WHI.
    pub fn microbe_mix(buoy_id: &str, timestamp: DateTime<Utc>, whi: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            buoy_id: buoy_id.to_string(),
            timestamp,
            event_type: EventType::MicrobeMix,
            description: format!("Shuddhi Mix dispensed due to low WHI ({whi})"),
            dosage: Some(MICROBE_MIX_DOSAGE_GRAMS),
            duration: None,
        }
    }
}

/// Fleet-wide figures shown at the top of the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyMetrics {
    pub overall_whi: i64,
    pub active_buoys: u64,
    pub recent_alerts: u64,
}

impl KeyMetrics {
    /// Aggregate over buoy summaries. Inactive buoys are ignored.
    pub fn from_summaries(summaries: &[BuoySummary]) -> Self {
        // ---
        let active: Vec<&BuoySummary> = summaries.iter().filter(|s| s.is_active).collect();

        let overall_whi = if active.is_empty() {
            0
        } else {
            let total: f64 = active.iter().map(|s| s.last_whi as f64).sum();
            whi::round_half_up(total / active.len() as f64)
        };

        KeyMetrics {
            overall_whi,
            active_buoys: active.len() as u64,
            recent_alerts: active
                .iter()
                .filter(|s| s.last_status == WaterStatus::Poor)
                .count() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap()
    }

    #[test]
    fn test_raw_reading_accepts_integers_for_measurements() {
        // ---
        let raw: RawSensorReading = serde_json::from_value(serde_json::json!({
            "buoy_id": "1",
            "ph": 7,
            "turbidity": 0,
            "dissolved_oxygen": 10,
            "orp": 200,
            "temperature": 25
        }))
        .unwrap();

        assert_eq!(raw.measurements().ph, 7.0);
        assert!(raw.timestamp.is_none());
        assert!(raw.reading_id.is_none());
    }

    #[test]
    fn test_raw_reading_rejects_string_measurement() {
        // ---
        let result = serde_json::from_value::<RawSensorReading>(serde_json::json!({
            "buoy_id": "1",
            "ph": 7.0,
            "turbidity": "15.5",
            "dissolved_oxygen": 8.0,
            "orp": 150.0,
            "temperature": 24.0
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_microbe_mix_event() {
        // ---
        let event = TreatmentEvent::microbe_mix("buoy-2", ts(), 45);

        assert_eq!(event.event_type, EventType::MicrobeMix);
        assert_eq!(event.dosage, Some(5.0));
        assert_eq!(event.duration, None);
        assert_eq!(event.description, "Shuddhi Mix dispensed due to low WHI (45)");
        assert_eq!(event.timestamp, ts());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "microbe_mix");
        assert!(json.get("duration").is_none());
    }

    #[test]
    fn test_summary_status_follows_whi() {
        // ---
        assert_eq!(BuoySummary::new("a", 85, ts(), true).last_status, WaterStatus::Good);
        assert_eq!(BuoySummary::new("a", 65, ts(), true).last_status, WaterStatus::Moderate);
        assert_eq!(BuoySummary::new("a", 45, ts(), true).last_status, WaterStatus::Poor);
    }

    #[test]
    fn test_stored_reading_serializes_flat() {
        // ---
        let reading = SensorReading {
            buoy_id: "buoy-1".to_string(),
            timestamp: ts(),
            measurements: Measurements {
                ph: 7.2,
                turbidity: 15.5,
                dissolved_oxygen: 8.2,
                orp: 150.0,
                temperature: 24.5,
            },
            reading_id: None,
        };
        let stored = StoredReading::new(&reading, 87);
        let json = serde_json::to_value(&stored).unwrap();

        assert_eq!(json["ph"], 7.2);
        assert_eq!(json["whi"], 87);
        assert_eq!(json["status"], "Good");
        assert!(json.get("reading_id").is_none());
    }

    #[test]
    fn test_summary_serializes_profile() {
        // ---
        let bare = serde_json::to_value(BuoySummary::new("1", 87, ts(), true)).unwrap();
        assert_eq!(bare["name"], serde_json::Value::Null);
        assert_eq!(bare["location"], serde_json::Value::Null);

        let profile = BuoyProfile {
            name: Some("Hauz Khas Lake - North".to_string()),
            location: Some(Location {
                latitude: 28.5535,
                longitude: 77.1944,
            }),
        };
        let json = serde_json::to_value(BuoySummary::new("1", 87, ts(), true).with_profile(profile)).unwrap();
        assert_eq!(json["name"], "Hauz Khas Lake - North");
        assert_eq!(json["location"]["latitude"], 28.5535);
        assert_eq!(json["location"]["longitude"], 77.1944);
        assert_eq!(json["last_whi"], 87);
    }

    #[test]
    fn test_profile_validation() {
        // ---
        let at = |latitude, longitude| BuoyProfile {
            name: Some("Ulsoor Lake".to_string()),
            location: Some(Location {
                latitude,
                longitude,
            }),
        };

        assert!(BuoyProfile::default().validate().is_ok());
        assert!(at(12.98, 77.62).validate().is_ok());
        assert!(at(-90.0, 180.0).validate().is_ok());
        assert!(at(90.5, 0.0).validate().is_err());
        assert!(at(0.0, -181.0).validate().is_err());

        let blank = BuoyProfile {
            name: Some("  ".to_string()),
            location: None,
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_key_metrics() {
        // ---
        let summaries = vec![
            BuoySummary::new("1", 85, ts(), true),
            BuoySummary::new("2", 45, ts(), true),
            BuoySummary::new("3", 65, ts(), true),
            BuoySummary::new("4", 10, ts(), false),
        ];
        let metrics = KeyMetrics::from_summaries(&summaries);

        assert_eq!(
            metrics,
            KeyMetrics {
                overall_whi: 65,
                active_buoys: 3,
                recent_alerts: 1,
            }
        );
        assert_eq!(KeyMetrics::from_summaries(&[]).overall_whi, 0);
    }

    #[test]
    fn test_event_type_parse() {
        // ---
        assert_eq!("aeration".parse::<EventType>().unwrap(), EventType::Aeration);
        assert_eq!("microbe_mix".parse::<EventType>().unwrap(), EventType::MicrobeMix);
        assert!("chlorine".parse::<EventType>().is_err());
    }
}
