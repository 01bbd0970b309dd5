//! Traffic-light zone classification for daily deltas
//!
//! Zones discretize how far today's resting HR and SpO2 sit from the
//! 30-day baseline. Boundaries come from `ZoneThresholds` and are strictly
//! ordered, so classification is monotonic in the input delta: a larger
//! deviation can never map to a calmer zone.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ZoneThresholds;

/// Three-level zone for a single metric's deviation from baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficZone {
    Green,
    Yellow,
    Red,
}

impl fmt::Display for TrafficZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrafficZone::Green => write!(f, "green"),
            TrafficZone::Yellow => write!(f, "yellow"),
            TrafficZone::Red => write!(f, "red"),
        }
    }
}

/// Overall readiness status from the two-zone lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Both zones green
    Ready,
    /// Mixed, no red
    Moderate,
    /// Exactly one red zone
    Compromised,
    /// Both zones red
    HighRisk,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Ready => write!(f, "ready"),
            OverallStatus::Moderate => write!(f, "moderate"),
            OverallStatus::Compromised => write!(f, "compromised"),
            OverallStatus::HighRisk => write!(f, "high_risk"),
        }
    }
}

/// Zone classification against configured boundaries
#[derive(Debug, Clone)]
pub struct ZoneClassifier {
    thresholds: ZoneThresholds,
}

impl ZoneClassifier {
    pub fn new(thresholds: ZoneThresholds) -> Self {
        ZoneClassifier { thresholds }
    }

    pub fn thresholds(&self) -> &ZoneThresholds {
        &self.thresholds
    }

    /// Classify a resting-HR delta (today minus baseline, bpm)
    ///
    /// Elevation drives the zone; a resting HR below baseline is green.
    pub fn classify_hr_delta(&self, hr_delta: f64) -> TrafficZone {
        if hr_delta <= self.thresholds.hr_green_max {
            TrafficZone::Green
        } else if hr_delta <= self.thresholds.hr_yellow_max {
            TrafficZone::Yellow
        } else {
            TrafficZone::Red
        }
    }

    /// Classify a SpO2 delta with the absolute critical floor override
    ///
    /// The delta is judged by magnitude; `today_spo2` below the critical
    /// floor is red no matter how small the delta.
    pub fn classify_spo2(&self, spo2_delta: f64, today_spo2: f64) -> TrafficZone {
        if today_spo2 < self.thresholds.spo2_critical_floor {
            return TrafficZone::Red;
        }
        let magnitude = spo2_delta.abs();
        if magnitude <= self.thresholds.spo2_green_max {
            TrafficZone::Green
        } else if magnitude <= self.thresholds.spo2_yellow_max {
            TrafficZone::Yellow
        } else {
            TrafficZone::Red
        }
    }

    /// 2x3 lookup over the two zones
    pub fn overall_status(&self, hr_zone: TrafficZone, spo2_zone: TrafficZone) -> OverallStatus {
        use TrafficZone::*;
        match (hr_zone, spo2_zone) {
            (Green, Green) => OverallStatus::Ready,
            (Red, Red) => OverallStatus::HighRisk,
            (Red, _) | (_, Red) => OverallStatus::Compromised,
            _ => OverallStatus::Moderate,
        }
    }

    /// Composite score: floor plus points per yellow/red zone, clamped
    pub fn composite_score(&self, zones: &[TrafficZone]) -> f64 {
        let mut score = self.thresholds.composite_floor;
        for zone in zones {
            score += match zone {
                TrafficZone::Green => 0.0,
                TrafficZone::Yellow => self.thresholds.composite_yellow_points,
                TrafficZone::Red => self.thresholds.composite_red_points,
            };
        }
        score.clamp(0.0, 100.0)
    }
}

impl Default for ZoneClassifier {
    fn default() -> Self {
        Self::new(ZoneThresholds::default())
    }
}
