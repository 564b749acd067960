//! Water Health Index scoring and status classification.
//!
//! The WHI is a fixed heuristic over five measurements. Each component is
//! scored independently, the five scores are averaged, and the mean is
//! rounded half-up to an integer. The clamps below are asymmetric and must
//! stay that way so recomputed scores match stored history.

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::models::Measurements;

// ---

/// Lowest WHI classified as [`WaterStatus::Good`].
pub const GOOD_THRESHOLD: i64 = 70;

/// Lowest WHI classified as [`WaterStatus::Moderate`].
pub const MODERATE_THRESHOLD: i64 = 50;

/// Ordinal water quality label derived from a WHI score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaterStatus {
    Good,
    Moderate,
    Poor,
}

impl WaterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaterStatus::Good => "Good",
            WaterStatus::Moderate => "Moderate",
            WaterStatus::Poor => "Poor",
        }
    }
}

impl fmt::Display for WaterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaterStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "Good" => Ok(Self::Good),
            "Moderate" => Ok(Self::Moderate),
            "Poor" => Ok(Self::Poor),
            other => Err(anyhow!("unknown water status: {other:?}")),
        }
    }
}

/// Per-component scores, exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentScores {
    pub ph: f64,
    pub dissolved_oxygen: f64,
    pub turbidity: f64,
    pub orp: f64,
    pub temperature: f64,
}

impl ComponentScores {
    pub fn from_measurements(m: &Measurements) -> Self {
        // ---
        Self {
            ph: (100.0 - (m.ph - 7.0).abs() * 20.0).max(0.0),
            // No lower bound: negative oxygen readings drag the score below zero.
            dissolved_oxygen: (m.dissolved_oxygen * 10.0).min(100.0),
            turbidity: (100.0 - m.turbidity * 2.0).max(0.0),
            orp: ((m.orp + 200.0) / 4.0).min(100.0).max(0.0),
            temperature: (100.0 - (m.temperature - 25.0).abs() * 2.0).max(0.0),
        }
    }

    pub fn mean(&self) -> f64 {
        (self.ph + self.dissolved_oxygen + self.turbidity + self.orp + self.temperature) / 5.0
    }
}

/// Compute the Water Health Index for a set of measurements.
///
/// Normally in `0..=100`, but extreme inputs can push it outside that range
/// (see the dissolved-oxygen component). Callers validate presence and type
/// of the inputs; no range checks happen here.
pub fn compute_whi(m: &Measurements) -> i64 {
    round_half_up(ComponentScores::from_measurements(m).mean())
}

/// Map a WHI score onto its status label. Total over all integers.
pub fn classify(whi: i64) -> WaterStatus {
    if whi >= GOOD_THRESHOLD {
        WaterStatus::Good
    } else if whi >= MODERATE_THRESHOLD {
        WaterStatus::Moderate
    } else {
        WaterStatus::Poor
    }
}

/// Round to the nearest integer, ties toward positive infinity.
///
/// `f64::round` rounds ties away from zero, which disagrees with stored
/// history for negative means (`-2.5` must become `-2`).
pub(crate) fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}
