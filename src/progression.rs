//! Multi-week progression analysis for a single exercise
//!
//! Looks back over recent sessions, derives completion, consistency, trend
//! and strength-gain metrics, then walks a fixed priority list of rules to
//! decide whether to add load, add reps, deload, or hold. Decisions are pure
//! and idempotent for a fixed session window.

use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::config::ProgressionSettings;
use crate::models::WorkoutSessionRecord;

/// Rep count at or above which load progression is preferred over volume
const LOAD_PROGRESSION_REP_FLOOR: u32 = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProgressionAction {
    IncreaseLoad { pct: f64 },
    IncreaseReps { reps: u32 },
    DecreaseLoad { pct: f64 },
    Hold,
}

impl ProgressionAction {
    pub fn is_change(&self) -> bool {
        !matches!(self, ProgressionAction::Hold)
    }
}

/// Derived metrics the rules evaluate against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionMetrics {
    pub sessions: usize,

    /// Mean per-session completion rate, each capped at 1.0
    pub completion_rate: f64,

    /// 1 - 2 * variance of completion rates, floored at 0
    pub consistency: f64,

    /// Recent-half vs earlier-half recovery, normalized by the earlier mean
    pub recovery_trend: f64,

    /// Recent-half vs earlier-half perceived effort, normalized likewise
    pub effort_trend: f64,

    /// Volume at window end over volume at window start
    pub strength_gain_ratio: f64,

    /// Mean recovery score across sessions that reported one
    pub avg_recovery: Option<f64>,

    /// Target reps per set in the most recent session
    pub current_reps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionDecision {
    pub user_id: String,
    pub exercise_id: String,
    pub action: ProgressionAction,
    pub reasoning: String,
    pub confidence: f64,
    pub next_review: NaiveDate,
    pub metrics: ProgressionMetrics,
}

#[derive(Debug, Clone)]
pub struct ProgressionAnalyzer {
    settings: ProgressionSettings,
}

impl ProgressionAnalyzer {
    pub fn new(settings: ProgressionSettings) -> Self {
        ProgressionAnalyzer { settings }
    }

    /// Analyze a session window for one exercise and decide the next step
    ///
    /// `sessions` must already be filtered to the exercise and the lookback;
    /// order does not matter, they are sorted by date here. Fewer than the
    /// minimum sessions yields a low-confidence hold, never an error.
    pub fn analyze(
        &self,
        user_id: &str,
        exercise_id: &str,
        sessions: &[WorkoutSessionRecord],
        today: NaiveDate,
    ) -> ProgressionDecision {
        let mut window: Vec<&WorkoutSessionRecord> = sessions.iter().collect();
        window.sort_by_key(|s| s.date);

        if window.len() < self.settings.min_sessions {
            let metrics = Self::metrics(&window);
            return ProgressionDecision {
                user_id: user_id.to_string(),
                exercise_id: exercise_id.to_string(),
                action: ProgressionAction::Hold,
                reasoning: format!(
                    "only {} sessions in the window, {} needed for a supported decision",
                    window.len(),
                    self.settings.min_sessions
                ),
                confidence: 0.2,
                next_review: today + Duration::days(self.settings.review_when_holding_days),
                metrics,
            };
        }

        let metrics = Self::metrics(&window);
        let (action, reasoning, confidence) = self.decide(&metrics);
        let review_days = if action.is_change() {
            self.settings.review_after_change_days
        } else {
            self.settings.review_when_holding_days
        };

        debug!(
            user_id,
            exercise_id,
            ?action,
            completion = metrics.completion_rate,
            consistency = metrics.consistency,
            "progression decision"
        );

        ProgressionDecision {
            user_id: user_id.to_string(),
            exercise_id: exercise_id.to_string(),
            action,
            reasoning,
            confidence,
            next_review: today + Duration::days(review_days),
            metrics,
        }
    }

    /// Priority-ordered rules; the first match wins
    fn decide(&self, m: &ProgressionMetrics) -> (ProgressionAction, String, f64) {
        // Rule 1: strong completion with falling effort and consistent work
        if m.completion_rate >= 0.90 && m.effort_trend < -0.30 && m.consistency > 0.70 {
            let (action, how) = if m.current_reps >= LOAD_PROGRESSION_REP_FLOOR {
                (
                    ProgressionAction::IncreaseLoad {
                        pct: self.settings.load_increase_pct,
                    },
                    format!("adding {}% load", self.settings.load_increase_pct),
                )
            } else {
                (
                    ProgressionAction::IncreaseReps { reps: 1 },
                    "adding one rep per set".to_string(),
                )
            };
            return (
                action,
                format!(
                    "completion {:.0}% with effort trending down {:.0}% and consistency {:.2}; {}",
                    m.completion_rate * 100.0,
                    m.effort_trend.abs() * 100.0,
                    m.consistency,
                    how
                ),
                0.9,
            );
        }

        // Rule 2: near-perfect completion with stable recovery
        if m.completion_rate >= 0.95
            && m.recovery_trend > -0.10
            && m.avg_recovery.map(|r| r > 65.0).unwrap_or(false)
        {
            return (
                ProgressionAction::IncreaseLoad {
                    pct: self.settings.small_load_increase_pct,
                },
                format!(
                    "completion {:.0}% with stable recovery averaging {:.0}; small load increase",
                    m.completion_rate * 100.0,
                    m.avg_recovery.unwrap_or_default()
                ),
                0.85,
            );
        }

        // Rule 3: solid completion at low rep ranges
        if m.completion_rate >= 0.85 && m.effort_trend > -0.10 && m.current_reps < 10 {
            return (
                ProgressionAction::IncreaseReps { reps: 1 },
                format!(
                    "completion {:.0}% at {} reps per set; volume progression preferred",
                    m.completion_rate * 100.0,
                    m.current_reps
                ),
                0.8,
            );
        }

        // Rule 4: struggling completion or collapsing recovery
        if m.completion_rate < 0.75 || m.recovery_trend < -0.30 {
            return (
                ProgressionAction::DecreaseLoad {
                    pct: self.settings.deload_decrease_pct,
                },
                format!(
                    "completion {:.0}% or recovery trend {:.0}% signals overreach; deloading",
                    m.completion_rate * 100.0,
                    m.recovery_trend * 100.0
                ),
                0.85,
            );
        }

        (
            ProgressionAction::Hold,
            "metrics do not support a change; holding current parameters".to_string(),
            0.6,
        )
    }

    fn metrics(window: &[&WorkoutSessionRecord]) -> ProgressionMetrics {
        if window.is_empty() {
            return ProgressionMetrics {
                sessions: 0,
                completion_rate: 0.0,
                consistency: 0.0,
                recovery_trend: 0.0,
                effort_trend: 0.0,
                strength_gain_ratio: 1.0,
                avg_recovery: None,
                current_reps: 0,
            };
        }

        let completion_rates: Vec<f64> = window.iter().map(|s| s.completion_rate()).collect();
        let completion_rate = completion_rates.as_slice().mean();
        let variance = if completion_rates.len() > 1 {
            completion_rates.as_slice().variance()
        } else {
            0.0
        };
        let consistency = (1.0 - 2.0 * variance).max(0.0);

        let efforts: Vec<f64> = window.iter().map(|s| s.perceived_effort).collect();
        let effort_trend = half_trend(&efforts);

        let recoveries: Vec<f64> = window.iter().filter_map(|s| s.recovery_score).collect();
        let recovery_trend = half_trend(&recoveries);
        let avg_recovery = if recoveries.is_empty() {
            None
        } else {
            Some(recoveries.as_slice().mean())
        };

        let start_volume = window.first().map(|s| s.volume()).unwrap_or_default();
        let end_volume = window.last().map(|s| s.volume()).unwrap_or_default();
        let strength_gain_ratio = if start_volume.is_zero() {
            1.0
        } else {
            (end_volume / start_volume).to_f64().unwrap_or(1.0)
        };

        ProgressionMetrics {
            sessions: window.len(),
            completion_rate,
            consistency,
            recovery_trend,
            effort_trend,
            strength_gain_ratio,
            avg_recovery,
            current_reps: window.last().map(|s| s.reps_per_set).unwrap_or(0),
        }
    }
}

/// Recent-half mean vs earlier-half mean, normalized by the earlier mean
///
/// Positive means the series is rising. Too few points or a zero earlier
/// mean yields a flat trend.
fn half_trend(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mid = values.len() / 2;
    let earlier = values[..mid].mean();
    let recent = values[mid..].mean();
    if earlier == 0.0 {
        return 0.0;
    }
    (recent - earlier) / earlier
}
