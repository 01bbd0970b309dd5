//! Adaptive training-load decisions
//!
//! Pure function of a fused snapshot, recent session history, and the user's
//! safety settings. Rules run top to bottom; the first applicable rule fixes
//! the intensity tier and every rule that fires appends a reason, so the
//! output always explains itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::DeloadThresholds;
use crate::models::{DeviceClass, FusedSnapshot, SafetySettings, WorkoutSessionRecord};

/// HRV deviation below the rolling baseline that extends rest
const HRV_REST_DEVIATION: f64 = 0.30;
/// HRV deviation that escalates risk to high
const HRV_HIGH_RISK_DEVIATION: f64 = 0.50;
/// Recovery below this escalates rule-1 risk to high
const CRITICAL_RECOVERY: f64 = 20.0;
/// Sleep quality score below this extends rest
const POOR_SLEEP_QUALITY: f64 = 60.0;
/// Sleep duration below this extends rest, hours
const SHORT_SLEEP_HOURS: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityTier {
    Rest,
    Light,
    Moderate,
    High,
}

impl fmt::Display for IntensityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntensityTier::Rest => write!(f, "rest"),
            IntensityTier::Light => write!(f, "light"),
            IntensityTier::Moderate => write!(f, "moderate"),
            IntensityTier::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

/// Caller-supplied context the snapshot alone cannot carry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    /// Whether the user is currently inside a planned deload week
    pub in_deload_week: bool,

    /// 7-session rolling HRV baseline, ms
    pub hrv_baseline: Option<f64>,

    /// Planned strain target for the next session
    pub target_strain: Option<f64>,

    /// Last night's sleep duration, hours
    pub sleep_duration_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecommendation {
    pub user_id: String,
    pub generated_at: DateTime<Utc>,

    pub tier: IntensityTier,

    /// Multiplier on planned inter-set and inter-session rest
    pub rest_multiplier: f64,

    /// Strain ceiling for the next session, when one applies
    pub target_strain_ceiling: Option<f64>,

    pub risk: RiskLevel,
    pub hard_stop: bool,
    pub strain_warning: bool,

    /// Every rule that fired, in evaluation order
    pub reasons: Vec<String>,

    pub should_deload: bool,
    pub deload_reason: Option<String>,

    /// Fusion confidence behind the inputs
    pub confidence: f64,

    /// Device classes whose data informed this recommendation
    pub adaptation_source: Vec<DeviceClass>,
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    deload: DeloadThresholds,
}

impl DecisionEngine {
    pub fn new(deload: DeloadThresholds) -> Self {
        DecisionEngine { deload }
    }

    /// Produce a recommendation; pure and idempotent for fixed inputs
    pub fn recommend(
        &self,
        snapshot: &FusedSnapshot,
        history: &[WorkoutSessionRecord],
        settings: &SafetySettings,
        ctx: &DecisionContext,
        now: DateTime<Utc>,
    ) -> TrainingRecommendation {
        let mut reasons = Vec::new();
        let mut rest_multiplier: f64 = 1.0;
        let mut risk = RiskLevel::Low;
        let mut hard_stop = false;
        let mut strain_warning = false;
        let mut tier: Option<IntensityTier> = None;

        // Rule 1: recovery below the configured minimum
        if let Some(recovery) = snapshot.recovery {
            if recovery < settings.recovery_minimum {
                tier = Some(IntensityTier::Rest);
                rest_multiplier = rest_multiplier.max(2.0);
                risk = if recovery < CRITICAL_RECOVERY {
                    RiskLevel::High
                } else {
                    RiskLevel::Moderate
                };
                hard_stop = settings.enable_hard_stop
                    && (!settings.hard_stop_only_during_deload || ctx.in_deload_week);
                reasons.push(format!(
                    "recovery {:.0} is below the configured minimum of {:.0}",
                    recovery, settings.recovery_minimum
                ));
            }
        }

        // Rule 2: HRV suppressed against the 7-session rolling baseline
        if let (Some(hrv), Some(baseline)) = (snapshot.hrv, ctx.hrv_baseline) {
            if baseline > 0.0 {
                let deviation = (baseline - hrv) / baseline;
                if deviation > HRV_REST_DEVIATION {
                    rest_multiplier = rest_multiplier.max(1.8);
                    if deviation > HRV_HIGH_RISK_DEVIATION {
                        risk = RiskLevel::High;
                    }
                    reasons.push(format!(
                        "HRV {:.0}ms is {:.0}% below the rolling baseline of {:.0}ms",
                        hrv,
                        deviation * 100.0,
                        baseline
                    ));
                }
            }
        }

        // Rule 3: recent strain approaching the planned target
        if let (Some(strain), Some(target)) = (snapshot.strain, ctx.target_strain) {
            if target > 0.0 && strain / target > settings.strain_warning_threshold {
                strain_warning = true;
                reasons.push(format!(
                    "recent strain {:.0} exceeds {:.0}% of the {:.0} target",
                    strain,
                    settings.strain_warning_threshold * 100.0,
                    target
                ));
            }
        }

        // Rule 4: poor or short sleep
        let poor_quality = snapshot.sleep.map(|s| s < POOR_SLEEP_QUALITY).unwrap_or(false);
        let short_sleep = ctx
            .sleep_duration_hours
            .map(|h| h < SHORT_SLEEP_HOURS)
            .unwrap_or(false);
        if poor_quality || short_sleep {
            rest_multiplier = rest_multiplier.max(1.3);
            reasons.push("sleep was poor or short; extending rest".to_string());
        }

        // Rule 5: recovery-proportional default when nothing above set a tier
        let mut target_strain_ceiling = None;
        let tier = tier.unwrap_or_else(|| match snapshot.recovery {
            Some(recovery) => {
                target_strain_ceiling = Some(recovery.clamp(0.0, 100.0));
                reasons.push(format!(
                    "recovery {:.0} supports {} intensity",
                    recovery,
                    tier_for_recovery(recovery)
                ));
                tier_for_recovery(recovery)
            }
            None => {
                reasons.push("recovery score unavailable; defaulting to light".to_string());
                IntensityTier::Light
            }
        });

        let (should_deload, deload_reason) = if settings.auto_deload_trigger {
            self.assess_deload(history)
        } else {
            (false, None)
        };

        debug!(
            user_id = %snapshot.user_id,
            %tier,
            rest_multiplier,
            ?risk,
            should_deload,
            "recommendation computed"
        );

        TrainingRecommendation {
            user_id: snapshot.user_id.clone(),
            generated_at: now,
            tier,
            rest_multiplier,
            target_strain_ceiling,
            risk,
            hard_stop,
            strain_warning,
            reasons,
            should_deload,
            deload_reason,
            confidence: snapshot.confidence,
            adaptation_source: snapshot.sources.clone(),
        }
    }

    /// Deload side computation over the most recent sessions
    fn assess_deload(&self, history: &[WorkoutSessionRecord]) -> (bool, Option<String>) {
        if history.len() < self.deload.window_sessions {
            return (false, None);
        }
        let window = &history[history.len() - self.deload.window_sessions..];

        let avg_completion =
            window.iter().map(|s| s.completion_rate()).sum::<f64>() / window.len() as f64;
        let avg_effort =
            window.iter().map(|s| s.perceived_effort).sum::<f64>() / window.len() as f64;
        let recovery_scores: Vec<f64> = window.iter().filter_map(|s| s.recovery_score).collect();
        let avg_recovery = if recovery_scores.is_empty() {
            None
        } else {
            Some(recovery_scores.iter().sum::<f64>() / recovery_scores.len() as f64)
        };

        if avg_completion < self.deload.completion_max && avg_effort > self.deload.effort_min {
            return (
                true,
                Some(format!(
                    "average completion {:.0}% with average effort {:.1} over the last {} sessions",
                    avg_completion * 100.0,
                    avg_effort,
                    window.len()
                )),
            );
        }
        if let Some(recovery) = avg_recovery {
            if recovery < self.deload.recovery_min {
                return (
                    true,
                    Some(format!(
                        "average recovery {:.0} over the last {} sessions",
                        recovery,
                        window.len()
                    )),
                );
            }
        }
        (false, None)
    }
}

fn tier_for_recovery(recovery: f64) -> IntensityTier {
    if recovery >= 80.0 {
        IntensityTier::High
    } else if recovery >= 60.0 {
        IntensityTier::Moderate
    } else if recovery >= 40.0 {
        IntensityTier::Light
    } else {
        IntensityTier::Rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(DeloadThresholds::default())
    }

    fn snapshot(recovery: Option<f64>) -> FusedSnapshot {
        let mut s = FusedSnapshot::empty("u1", Utc::now());
        s.recovery = recovery;
        s.confidence = 0.7;
        s.sources = vec![DeviceClass::SportsWatch];
        s
    }

    fn session(completion: f64, effort: f64, recovery: Option<f64>) -> WorkoutSessionRecord {
        WorkoutSessionRecord {
            session_id: "s".to_string(),
            user_id: "u1".to_string(),
            exercise_id: "squat".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            planned_reps: 100,
            actual_reps: (completion * 100.0) as u32,
            load_kg: dec!(100),
            reps_per_set: 5,
            perceived_effort: effort,
            recovery_score: recovery,
            completed: true,
        }
    }

    #[test]
    fn test_low_recovery_forces_rest() {
        let rec = engine().recommend(
            &snapshot(Some(25.0)),
            &[],
            &SafetySettings::default(),
            &DecisionContext::default(),
            Utc::now(),
        );
        assert_eq!(rec.tier, IntensityTier::Rest);
        assert_eq!(rec.rest_multiplier, 2.0);
        assert_eq!(rec.risk, RiskLevel::Moderate);
        assert!(rec.hard_stop);
        assert!(!rec.reasons.is_empty());
    }

    #[test]
    fn test_critical_recovery_is_high_risk() {
        let rec = engine().recommend(
            &snapshot(Some(15.0)),
            &[],
            &SafetySettings::default(),
            &DecisionContext::default(),
            Utc::now(),
        );
        assert_eq!(rec.risk, RiskLevel::High);
    }

    #[test]
    fn test_hard_stop_restricted_to_deload_weeks() {
        let settings = SafetySettings {
            hard_stop_only_during_deload: true,
            ..Default::default()
        };
        let outside = engine().recommend(
            &snapshot(Some(25.0)),
            &[],
            &settings,
            &DecisionContext::default(),
            Utc::now(),
        );
        assert!(!outside.hard_stop);

        let inside = engine().recommend(
            &snapshot(Some(25.0)),
            &[],
            &settings,
            &DecisionContext {
                in_deload_week: true,
                ..Default::default()
            },
            Utc::now(),
        );
        assert!(inside.hard_stop);
    }

    #[test]
    fn test_hrv_suppression_extends_rest() {
        let mut s = snapshot(Some(70.0));
        s.hrv = Some(30.0);
        let ctx = DecisionContext {
            hrv_baseline: Some(50.0),
            ..Default::default()
        };
        // 40% below baseline: multiplier raised, risk stays below high
        let rec = engine().recommend(&s, &[], &SafetySettings::default(), &ctx, Utc::now());
        assert_eq!(rec.rest_multiplier, 1.8);
        assert_ne!(rec.risk, RiskLevel::High);

        // 60% below baseline escalates risk
        let mut s = snapshot(Some(70.0));
        s.hrv = Some(20.0);
        let rec = engine().recommend(&s, &[], &SafetySettings::default(), &ctx, Utc::now());
        assert_eq!(rec.risk, RiskLevel::High);
    }

    #[test]
    fn test_strain_ratio_warns_without_stopping() {
        let mut s = snapshot(Some(70.0));
        s.strain = Some(90.0);
        let ctx = DecisionContext {
            target_strain: Some(70.0),
            ..Default::default()
        };
        let rec = engine().recommend(&s, &[], &SafetySettings::default(), &ctx, Utc::now());
        assert!(rec.strain_warning);
        assert_eq!(rec.tier, IntensityTier::Moderate);
    }

    #[test]
    fn test_poor_sleep_raises_rest_multiplier() {
        let mut s = snapshot(Some(70.0));
        s.sleep = Some(45.0);
        let rec = engine().recommend(
            &s,
            &[],
            &SafetySettings::default(),
            &DecisionContext::default(),
            Utc::now(),
        );
        assert_eq!(rec.rest_multiplier, 1.3);
        assert_eq!(rec.tier, IntensityTier::Moderate);
    }

    #[test]
    fn test_recovery_proportional_default_tiers() {
        let settings = SafetySettings::default();
        let ctx = DecisionContext::default();
        let engine = engine();
        let tier_at = |recovery: f64| {
            engine
                .recommend(&snapshot(Some(recovery)), &[], &settings, &ctx, Utc::now())
                .tier
        };
        assert_eq!(tier_at(85.0), IntensityTier::High);
        assert_eq!(tier_at(65.0), IntensityTier::Moderate);
        assert_eq!(tier_at(45.0), IntensityTier::Light);
    }

    #[test]
    fn test_missing_recovery_falls_back_to_light() {
        let rec = engine().recommend(
            &snapshot(None),
            &[],
            &SafetySettings::default(),
            &DecisionContext::default(),
            Utc::now(),
        );
        assert_eq!(rec.tier, IntensityTier::Light);
        assert!(rec.reasons.iter().any(|r| r.contains("unavailable")));
    }

    #[test]
    fn test_deload_triggers_on_low_completion_high_effort() {
        let history: Vec<WorkoutSessionRecord> =
            (0..6).map(|_| session(0.70, 8.0, Some(60.0))).collect();
        let rec = engine().recommend(
            &snapshot(Some(70.0)),
            &history,
            &SafetySettings::default(),
            &DecisionContext::default(),
            Utc::now(),
        );
        assert!(rec.should_deload);
        assert!(rec.deload_reason.is_some());
    }

    #[test]
    fn test_deload_does_not_trigger_at_adequate_completion() {
        let history: Vec<WorkoutSessionRecord> =
            (0..6).map(|_| session(0.80, 8.0, Some(60.0))).collect();
        let rec = engine().recommend(
            &snapshot(Some(70.0)),
            &history,
            &SafetySettings::default(),
            &DecisionContext::default(),
            Utc::now(),
        );
        assert!(!rec.should_deload);
    }

    #[test]
    fn test_deload_triggers_on_low_recovery_trend() {
        let history: Vec<WorkoutSessionRecord> =
            (0..6).map(|_| session(0.90, 5.0, Some(35.0))).collect();
        let rec = engine().recommend(
            &snapshot(Some(70.0)),
            &history,
            &SafetySettings::default(),
            &DecisionContext::default(),
            Utc::now(),
        );
        assert!(rec.should_deload);
    }

    #[test]
    fn test_deload_respects_opt_out() {
        let history: Vec<WorkoutSessionRecord> =
            (0..6).map(|_| session(0.70, 8.0, Some(35.0))).collect();
        let settings = SafetySettings {
            auto_deload_trigger: false,
            ..Default::default()
        };
        let rec = engine().recommend(
            &snapshot(Some(70.0)),
            &history,
            &settings,
            &DecisionContext::default(),
            Utc::now(),
        );
        assert!(!rec.should_deload);
    }

    #[test]
    fn test_idempotent_for_fixed_inputs() {
        let s = snapshot(Some(55.0));
        let now = Utc::now();
        let a = engine().recommend(&s, &[], &SafetySettings::default(), &DecisionContext::default(), now);
        let b = engine().recommend(&s, &[], &SafetySettings::default(), &DecisionContext::default(), now);
        assert_eq!(a, b);
    }
}
