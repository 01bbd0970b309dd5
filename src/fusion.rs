//! Multi-device source fusion
//!
//! When a user wears more than one device, each metric gets one canonical
//! value: walk the device-class priority order and take the first device
//! that reports it. Sleep is the exception and is averaged across all
//! reporting devices, since staging data benefits from consensus rather
//! than a single winner.
//!
//! The snapshot carries a data-completeness confidence: each of the five
//! weighted metrics contributes its fixed weight iff at least one device
//! supplied it. Missing metrics are listed by name so downstream
//! recommendations can explain themselves.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::config::FusionWeights;
use crate::models::{DeviceClass, FusedSnapshot, Reading, SignalType};

/// Resolves per-device readings into one canonical snapshot per user
#[derive(Debug, Clone)]
pub struct FusionResolver {
    weights: FusionWeights,
}

impl FusionResolver {
    pub fn new(weights: FusionWeights) -> Self {
        FusionResolver { weights }
    }

    /// Fuse the latest per-device readings into one snapshot
    ///
    /// `per_device` maps device id to that device's newest reading per
    /// signal, as produced by `SignalBufferStore::latest_per_device`.
    pub fn fuse(
        &self,
        user_id: &str,
        per_device: &HashMap<String, Vec<Reading>>,
        timestamp: DateTime<Utc>,
    ) -> FusedSnapshot {
        let mut snapshot = FusedSnapshot::empty(user_id, timestamp);
        if per_device.is_empty() {
            return snapshot;
        }

        // Flatten to (device_class, reading) sorted by priority so the first
        // hit per metric is the highest-priority source.
        let mut ranked: Vec<&Reading> = per_device.values().flatten().collect();
        ranked.sort_by_key(|r| (r.device_class.priority(), r.timestamp));

        snapshot.recovery = Self::first_by_priority(&ranked, SignalType::Recovery);
        snapshot.strain = Self::first_by_priority(&ranked, SignalType::Strain);
        snapshot.hrv = Self::first_by_priority(&ranked, SignalType::Hrv);
        snapshot.heart_rate = Self::first_by_priority(&ranked, SignalType::HeartRate);
        snapshot.steps = Self::first_by_priority(&ranked, SignalType::Steps);
        snapshot.calories = Self::first_by_priority(&ranked, SignalType::Calories);
        snapshot.sleep = Self::consensus_average(&ranked, SignalType::Sleep);

        let (confidence, missing) = self.score_confidence(&snapshot);
        snapshot.confidence = confidence;
        snapshot.missing_metrics = missing;

        let mut sources: Vec<DeviceClass> = ranked.iter().map(|r| r.device_class).collect();
        sources.sort_by_key(|c| c.priority());
        sources.dedup();
        snapshot.sources = sources;

        debug!(
            user = user_id,
            devices = per_device.len(),
            confidence = snapshot.confidence,
            missing = ?snapshot.missing_metrics,
            "Fused snapshot"
        );
        snapshot
    }

    /// Priority-pick a single metric outside the snapshot set
    ///
    /// Used for vitals the snapshot does not carry, such as today's resting
    /// heart rate and SpO2 for the daily assessment.
    pub fn resolve_latest(
        &self,
        per_device: &HashMap<String, Vec<Reading>>,
        signal: SignalType,
    ) -> Option<f64> {
        let mut ranked: Vec<&Reading> = per_device.values().flatten().collect();
        ranked.sort_by_key(|r| (r.device_class.priority(), r.timestamp));
        Self::first_by_priority(&ranked, signal)
    }

    fn first_by_priority(ranked: &[&Reading], signal: SignalType) -> Option<f64> {
        ranked
            .iter()
            .find(|r| r.signal_type == signal)
            .map(|r| r.value)
    }

    fn consensus_average(ranked: &[&Reading], signal: SignalType) -> Option<f64> {
        let values: Vec<f64> = ranked
            .iter()
            .filter(|r| r.signal_type == signal)
            .map(|r| r.value)
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// Confidence in [0,1] plus the list of missing weighted metrics
    fn score_confidence(&self, snapshot: &FusedSnapshot) -> (f64, Vec<SignalType>) {
        let mut confidence = 0.0;
        let mut missing = Vec::new();

        let contributions = [
            (snapshot.recovery, self.weights.recovery, SignalType::Recovery),
            (snapshot.hrv, self.weights.hrv, SignalType::Hrv),
            (snapshot.strain, self.weights.strain, SignalType::Strain),
            (snapshot.heart_rate, self.weights.heart_rate, SignalType::HeartRate),
            (snapshot.sleep, self.weights.sleep, SignalType::Sleep),
        ];
        for (value, weight, signal) in contributions {
            if value.is_some() {
                confidence += weight;
            } else {
                missing.push(signal);
            }
        }

        (confidence.clamp(0.0, 1.0), missing)
    }
}

impl Default for FusionResolver {
    fn default() -> Self {
        Self::new(FusionWeights::default())
    }
}
