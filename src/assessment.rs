//! Daily strain and recovery assessment
//!
//! Compares today's resting HR and SpO2 against a 30-day baseline, classifies
//! each delta into a traffic-light zone and folds the zones into an overall
//! status and a bounded composite score. Assessments are immutable once
//! produced; the storage collaborator historizes them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alerts::Alert;
use crate::config::ZoneThresholds;
use crate::models::Baseline;
use crate::zones::{OverallStatus, TrafficZone, ZoneClassifier};

/// Today's vitals as resolved from the fused snapshot
///
/// Either value may be absent; a missing vital degrades confidence and is
/// listed, it never fails the assessment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyVitals {
    pub resting_hr: Option<f64>,
    pub spo2: Option<f64>,
}

/// Immutable daily assessment result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrainAssessment {
    pub user_id: String,
    pub date: NaiveDate,
    pub assessed_at: DateTime<Utc>,

    pub baseline: Baseline,
    pub today: DailyVitals,

    /// today resting HR minus baseline, bpm; 0 when today is unknown
    pub hr_delta: f64,
    /// today SpO2 minus baseline, percentage points; 0 when today is unknown
    pub spo2_delta: f64,

    pub hr_zone: TrafficZone,
    pub spo2_zone: TrafficZone,
    pub overall_status: OverallStatus,

    /// Composite strain score in [0, 100]
    pub composite_score: f64,

    pub recommendation: String,
    pub risk_factors: Vec<String>,

    /// Vitals the fused snapshot could not supply
    pub missing_inputs: Vec<String>,

    /// Alerts outstanding at assessment time
    pub alerts: Vec<Alert>,

    /// Fusion confidence, further degraded per missing vital
    pub confidence: f64,
}

/// Weights for the richer composite session strain blend
const SESSION_BASELINE_WEIGHT: f64 = 0.4;
const SESSION_INTENSITY_WEIGHT: f64 = 0.3;
const SESSION_FATIGUE_WEIGHT: f64 = 0.2;
const SESSION_SUBJECTIVE_WEIGHT: f64 = 0.1;

/// Confidence multiplier applied per missing vital
const MISSING_VITAL_PENALTY: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct StrainScorer {
    classifier: ZoneClassifier,
}

impl StrainScorer {
    pub fn new(thresholds: ZoneThresholds) -> Self {
        StrainScorer {
            classifier: ZoneClassifier::new(thresholds),
        }
    }

    /// Build a daily assessment from baseline and today's vitals
    ///
    /// `fusion_confidence` comes from the fused snapshot; each missing vital
    /// halves it. A missing vital classifies as green so the composite score
    /// reflects only observed deviation.
    pub fn assess(
        &self,
        user_id: &str,
        date: NaiveDate,
        baseline: Baseline,
        today: DailyVitals,
        fusion_confidence: f64,
        alerts: Vec<Alert>,
        now: DateTime<Utc>,
    ) -> StrainAssessment {
        let mut missing_inputs = Vec::new();
        let mut risk_factors = Vec::new();

        let (hr_delta, hr_zone) = match today.resting_hr {
            Some(hr) => {
                let delta = hr - baseline.resting_hr;
                (delta, self.classifier.classify_hr_delta(delta))
            }
            None => {
                missing_inputs.push("resting_hr".to_string());
                (0.0, TrafficZone::Green)
            }
        };

        let (spo2_delta, spo2_zone) = match today.spo2 {
            Some(spo2) => {
                let delta = spo2 - baseline.spo2;
                (delta, self.classifier.classify_spo2(delta, spo2))
            }
            None => {
                missing_inputs.push("spo2".to_string());
                (0.0, TrafficZone::Green)
            }
        };

        if hr_zone != TrafficZone::Green {
            risk_factors.push(format!(
                "resting heart rate {:.1} bpm above baseline",
                hr_delta
            ));
        }
        if spo2_zone != TrafficZone::Green {
            risk_factors.push(format!(
                "SpO2 {:.1} points from baseline",
                spo2_delta.abs()
            ));
        }
        if let Some(spo2) = today.spo2 {
            if spo2 < self.classifier.thresholds().spo2_critical_floor {
                risk_factors.push(format!("SpO2 {:.1}% below critical floor", spo2));
            }
        }

        let overall_status = self.classifier.overall_status(hr_zone, spo2_zone);
        let composite_score = self.classifier.composite_score(&[hr_zone, spo2_zone]);

        let mut confidence = fusion_confidence.clamp(0.0, 1.0);
        for _ in &missing_inputs {
            confidence *= MISSING_VITAL_PENALTY;
        }

        debug!(
            user_id,
            %date,
            hr_delta,
            spo2_delta,
            ?overall_status,
            composite_score,
            "daily assessment computed"
        );

        StrainAssessment {
            user_id: user_id.to_string(),
            date,
            assessed_at: now,
            baseline,
            today,
            hr_delta,
            spo2_delta,
            hr_zone,
            spo2_zone,
            overall_status,
            composite_score,
            recommendation: recommendation_for(overall_status),
            risk_factors,
            missing_inputs,
            alerts,
            confidence,
        }
    }

    /// Richer composite strain when full session telemetry is available
    ///
    /// Inputs are each expected on a 0-100 scale; the blend is clamped.
    pub fn composite_session_strain(
        &self,
        baseline_comparison: f64,
        session_intensity: f64,
        fatigue_trend: f64,
        subjective_feedback: f64,
    ) -> f64 {
        let blended = SESSION_BASELINE_WEIGHT * baseline_comparison
            + SESSION_INTENSITY_WEIGHT * session_intensity
            + SESSION_FATIGUE_WEIGHT * fatigue_trend
            + SESSION_SUBJECTIVE_WEIGHT * subjective_feedback;
        blended.clamp(0.0, 100.0)
    }
}

fn recommendation_for(status: OverallStatus) -> String {
    match status {
        OverallStatus::Ready => {
            "Vitals are at baseline. Cleared for a normal or hard session.".to_string()
        }
        OverallStatus::Moderate => {
            "Mild deviation from baseline. Keep intensity moderate and reassess tomorrow."
                .to_string()
        }
        OverallStatus::Compromised => {
            "A vital sign is strongly deviated. Reduce intensity and prioritize recovery."
                .to_string()
        }
        OverallStatus::HighRisk => {
            "Multiple vital signs are strongly deviated. Rest today and monitor closely."
                .to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> StrainScorer {
        StrainScorer::new(ZoneThresholds::default())
    }

    fn assess(baseline_hr: f64, baseline_spo2: f64, hr: f64, spo2: f64) -> StrainAssessment {
        scorer().assess(
            "u1",
            NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            Baseline {
                resting_hr: baseline_hr,
                spo2: baseline_spo2,
            },
            DailyVitals {
                resting_hr: Some(hr),
                spo2: Some(spo2),
            },
            1.0,
            Vec::new(),
            Utc::now(),
        )
    }

    #[test]
    fn test_both_red_is_high_risk_with_composite_90() {
        // Baseline HR 60, today 75; baseline SpO2 98, today 93
        let result = assess(60.0, 98.0, 75.0, 93.0);
        assert_eq!(result.hr_delta, 15.0);
        assert_eq!(result.spo2_delta, -5.0);
        assert_eq!(result.hr_zone, TrafficZone::Red);
        assert_eq!(result.spo2_zone, TrafficZone::Red);
        assert_eq!(result.overall_status, OverallStatus::HighRisk);
        assert_eq!(result.composite_score, 90.0);
        assert_eq!(result.risk_factors.len(), 2);
    }

    #[test]
    fn test_at_baseline_is_ready() {
        let result = assess(60.0, 98.0, 61.0, 98.5);
        assert_eq!(result.overall_status, OverallStatus::Ready);
        assert_eq!(result.composite_score, 10.0);
        assert!(result.risk_factors.is_empty());
    }

    #[test]
    fn test_missing_vital_degrades_confidence_not_result() {
        let result = scorer().assess(
            "u1",
            NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            Baseline {
                resting_hr: 60.0,
                spo2: 98.0,
            },
            DailyVitals {
                resting_hr: Some(66.0),
                spo2: None,
            },
            0.8,
            Vec::new(),
            Utc::now(),
        );
        assert_eq!(result.missing_inputs, vec!["spo2".to_string()]);
        assert_eq!(result.spo2_zone, TrafficZone::Green);
        assert!((result.confidence - 0.4).abs() < 1e-9);
        // The HR side still classifies
        assert_eq!(result.hr_zone, TrafficZone::Yellow);
    }

    #[test]
    fn test_spo2_floor_adds_risk_factor() {
        let result = assess(60.0, 92.0, 60.0, 91.0);
        assert_eq!(result.spo2_zone, TrafficZone::Red);
        assert!(result
            .risk_factors
            .iter()
            .any(|r| r.contains("critical floor")));
    }

    #[test]
    fn test_session_strain_blend() {
        let scorer = scorer();
        let strain = scorer.composite_session_strain(50.0, 80.0, 40.0, 60.0);
        assert!((strain - (0.4 * 50.0 + 0.3 * 80.0 + 0.2 * 40.0 + 0.1 * 60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_session_strain_is_clamped() {
        let scorer = scorer();
        assert_eq!(scorer.composite_session_strain(200.0, 200.0, 200.0, 200.0), 100.0);
        assert_eq!(scorer.composite_session_strain(-50.0, -50.0, -50.0, -50.0), 0.0);
    }
}
