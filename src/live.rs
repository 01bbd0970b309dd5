//! Live within-workout strain
//!
//! Lower-latency companion to the daily assessment: three normalized terms
//! (heart-rate rise, SpO2 drop, heart-rate recovery delay) blended with fixed
//! weights into a 0-100 score. Computed purely from buffered readings and
//! never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::buffer::SignalBufferStore;
use crate::config::LiveStrainSettings;
use crate::models::{Reading, SignalType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    Green,
    Yellow,
    Red,
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveStatus::Green => write!(f, "green"),
            LiveStatus::Yellow => write!(f, "yellow"),
            LiveStatus::Red => write!(f, "red"),
        }
    }
}

/// In-memory only; never reaches the storage collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStrainResult {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,

    /// Blended strain score in [0, 100]
    pub strain_score: f64,

    /// Heart-rate rise over the buffered session window, bpm
    pub hr_rise: f64,

    /// SpO2 drop from the session's best value, percentage points
    pub spo2_drop: f64,

    /// Seconds since heart rate was last near the session minimum
    pub recovery_delay_secs: f64,

    pub status: LiveStatus,

    /// Heart-rate readings the score was computed from
    pub hr_samples: usize,
}

#[derive(Debug, Clone)]
pub struct LiveStrainCalculator {
    settings: LiveStrainSettings,
}

impl LiveStrainCalculator {
    pub fn new(settings: LiveStrainSettings) -> Self {
        LiveStrainCalculator { settings }
    }

    /// Compute live strain from the user's buffered heart-rate and SpO2 rings
    ///
    /// An empty window yields score 0 with status green rather than an error.
    pub fn compute(
        &self,
        user_id: &str,
        buffer: &SignalBufferStore,
        now: DateTime<Utc>,
    ) -> LiveStrainResult {
        let hr_window = buffer.recent(user_id, SignalType::HeartRate, usize::MAX);
        let spo2_window = buffer.recent(user_id, SignalType::Spo2, usize::MAX);

        let hr_rise = Self::hr_rise(&hr_window);
        let spo2_drop = Self::spo2_drop(&spo2_window);
        let recovery_delay_secs = self.recovery_delay(&hr_window);

        let score = self.settings.hr_weight * normalize(hr_rise, self.settings.hr_rise_cap)
            + self.settings.spo2_weight * normalize(spo2_drop, self.settings.spo2_drop_cap)
            + self.settings.delay_weight
                * normalize(recovery_delay_secs, self.settings.recovery_delay_cap_secs);
        let strain_score = score.clamp(0.0, 100.0);

        let status = if strain_score <= self.settings.green_max {
            LiveStatus::Green
        } else if strain_score <= self.settings.yellow_max {
            LiveStatus::Yellow
        } else {
            LiveStatus::Red
        };

        debug!(
            user_id,
            strain_score, hr_rise, spo2_drop, recovery_delay_secs, %status,
            "live strain computed"
        );

        LiveStrainResult {
            user_id: user_id.to_string(),
            timestamp: now,
            strain_score,
            hr_rise,
            spo2_drop,
            recovery_delay_secs,
            status,
            hr_samples: hr_window.len(),
        }
    }

    /// Latest heart rate minus the session minimum, floored at zero
    fn hr_rise(window: &[Reading]) -> f64 {
        let latest = match window.last() {
            Some(r) => r.value,
            None => return 0.0,
        };
        let min = window.iter().map(|r| r.value).fold(f64::INFINITY, f64::min);
        (latest - min).max(0.0)
    }

    /// Session-best SpO2 minus the latest value, floored at zero
    fn spo2_drop(window: &[Reading]) -> f64 {
        let latest = match window.last() {
            Some(r) => r.value,
            None => return 0.0,
        };
        let max = window.iter().map(|r| r.value).fold(f64::NEG_INFINITY, f64::max);
        (max - latest).max(0.0)
    }

    /// Seconds since HR was last within the recovery margin of the minimum
    ///
    /// A latest reading already near the minimum means no pending recovery,
    /// so the delay is zero.
    fn recovery_delay(&self, window: &[Reading]) -> f64 {
        let latest = match window.last() {
            Some(r) => r,
            None => return 0.0,
        };
        let min = window.iter().map(|r| r.value).fold(f64::INFINITY, f64::min);
        let recovered_at = window
            .iter()
            .rev()
            .find(|r| r.value <= min + self.settings.recovery_margin_bpm)
            .map(|r| r.timestamp);
        match recovered_at {
            Some(t) => (latest.timestamp - t).num_seconds().max(0) as f64,
            None => (latest.timestamp - window[0].timestamp).num_seconds().max(0) as f64,
        }
    }
}

/// Rescale to 0-100 with a hard cap
fn normalize(value: f64, cap: f64) -> f64 {
    if cap <= 0.0 {
        return 0.0;
    }
    (value / cap * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceClass;
    use chrono::Duration;

    fn calculator() -> LiveStrainCalculator {
        LiveStrainCalculator::new(LiveStrainSettings::default())
    }

    fn push(buffer: &SignalBufferStore, signal: SignalType, value: f64, at: DateTime<Utc>) {
        buffer
            .ingest(Reading::new(
                "dev-1",
                "u1",
                DeviceClass::ChestStrap,
                signal,
                value,
                at,
            ))
            .unwrap();
    }

    #[test]
    fn test_hr_rise_alone_scores_40() {
        let buffer = SignalBufferStore::new(100);
        let now = Utc::now();
        // Rise of exactly the 60 bpm cap, both at the same instant so there
        // is no recovery delay, and SpO2 steady
        push(&buffer, SignalType::HeartRate, 60.0, now);
        push(&buffer, SignalType::HeartRate, 120.0, now);
        push(&buffer, SignalType::Spo2, 98.0, now);

        let result = calculator().compute("u1", &buffer, now);
        assert_eq!(result.hr_rise, 60.0);
        assert_eq!(result.spo2_drop, 0.0);
        assert!((result.strain_score - 40.0).abs() < 1e-9);
        assert_eq!(result.status, LiveStatus::Green);
    }

    #[test]
    fn test_all_terms_maxed_is_red() {
        let buffer = SignalBufferStore::new(100);
        let start = Utc::now() - Duration::seconds(300);
        let now = start + Duration::seconds(300);
        push(&buffer, SignalType::HeartRate, 60.0, start);
        // HR stays 80 bpm above the minimum for 5 minutes
        push(&buffer, SignalType::HeartRate, 140.0, start + Duration::seconds(10));
        push(&buffer, SignalType::HeartRate, 140.0, now);
        push(&buffer, SignalType::Spo2, 99.0, start);
        push(&buffer, SignalType::Spo2, 88.0, now);

        let result = calculator().compute("u1", &buffer, now);
        assert!(result.strain_score > 95.0);
        assert_eq!(result.status, LiveStatus::Red);
    }

    #[test]
    fn test_empty_buffer_scores_zero() {
        let buffer = SignalBufferStore::new(100);
        let result = calculator().compute("u1", &buffer, Utc::now());
        assert_eq!(result.strain_score, 0.0);
        assert_eq!(result.status, LiveStatus::Green);
        assert_eq!(result.hr_samples, 0);
    }

    #[test]
    fn test_recovered_heart_rate_has_no_delay() {
        let buffer = SignalBufferStore::new(100);
        let start = Utc::now() - Duration::seconds(600);
        let now = start + Duration::seconds(600);
        push(&buffer, SignalType::HeartRate, 60.0, start);
        push(&buffer, SignalType::HeartRate, 150.0, start + Duration::seconds(200));
        // Back within the margin of the minimum
        push(&buffer, SignalType::HeartRate, 65.0, now);

        let result = calculator().compute("u1", &buffer, now);
        assert_eq!(result.recovery_delay_secs, 0.0);
    }

    #[test]
    fn test_score_never_exceeds_100() {
        let buffer = SignalBufferStore::new(100);
        let start = Utc::now() - Duration::seconds(3600);
        let now = start + Duration::seconds(3600);
        push(&buffer, SignalType::HeartRate, 50.0, start);
        push(&buffer, SignalType::HeartRate, 200.0, now);
        push(&buffer, SignalType::Spo2, 99.0, start);
        push(&buffer, SignalType::Spo2, 70.0, now);

        let result = calculator().compute("u1", &buffer, now);
        assert!(result.strain_score <= 100.0);
    }
}
