//! Collaborator contracts
//!
//! Durable storage, notification delivery and permission checks live outside
//! this subsystem; the engine consumes them through these traits. In-memory
//! implementations back the CLI and the test suite.
//!
//! A collaborator failure never fails a computation that can complete from
//! in-memory state; callers log the failure and continue.

use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use tracing::{debug, info};

use crate::alerts::Alert;
use crate::assessment::StrainAssessment;
use crate::decision::TrainingRecommendation;
use crate::error::{Result, StorageError, StrainError};
use crate::models::{Baseline, WorkoutSessionRecord};

/// Session history and baseline queries
pub trait SessionStore: Send + Sync {
    fn append_session(&self, session: WorkoutSessionRecord) -> Result<()>;

    /// Historize a completed daily assessment
    fn append_assessment(&self, assessment: &StrainAssessment) -> Result<()>;

    /// 30-day (or `days`-day) trimmed-mean baseline for a user
    fn query_baseline(&self, user_id: &str, days: u32) -> Result<Baseline>;

    /// Sessions for a user, optionally filtered to one exercise, inside the
    /// lookback window ending at `today`
    fn query_session_history(
        &self,
        user_id: &str,
        exercise_id: Option<&str>,
        lookback_days: u32,
        today: NaiveDate,
    ) -> Result<Vec<WorkoutSessionRecord>>;
}

/// Outbound delivery of alerts and recommendations
pub trait NotificationSink: Send + Sync {
    fn deliver_alert(&self, alert: &Alert) -> Result<()>;
    fn deliver_recommendation(&self, recommendation: &TrainingRecommendation) -> Result<()>;
}

/// Mutations the permission gate guards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionAction {
    MutateAlertConditions,
    MutateSafetySettings,
}

impl fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionAction::MutateAlertConditions => write!(f, "mutate_alert_conditions"),
            PermissionAction::MutateSafetySettings => write!(f, "mutate_safety_settings"),
        }
    }
}

/// Checked before any mutation of alert conditions or safety settings
pub trait PermissionGate: Send + Sync {
    fn check(&self, user_id: &str, action: PermissionAction) -> Result<()>;
}

/// In-memory session store for tests and the CLI
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<Vec<WorkoutSessionRecord>>,
    assessments: RwLock<Vec<StrainAssessment>>,
    baselines: RwLock<HashMap<String, Baseline>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the baseline the real store would derive from history
    pub fn set_baseline(&self, user_id: impl Into<String>, baseline: Baseline) {
        self.baselines
            .write()
            .expect("baseline lock poisoned")
            .insert(user_id.into(), baseline);
    }

    /// Historized assessments for a user, in insertion order
    pub fn assessments_for(&self, user_id: &str) -> Vec<StrainAssessment> {
        self.assessments
            .read()
            .expect("assessment lock poisoned")
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect()
    }
}

impl SessionStore for MemorySessionStore {
    fn append_session(&self, session: WorkoutSessionRecord) -> Result<()> {
        debug!(session_id = %session.session_id, user_id = %session.user_id, "session appended");
        self.sessions
            .write()
            .expect("session lock poisoned")
            .push(session);
        Ok(())
    }

    fn append_assessment(&self, assessment: &StrainAssessment) -> Result<()> {
        debug!(user_id = %assessment.user_id, date = %assessment.date, "assessment historized");
        self.assessments
            .write()
            .expect("assessment lock poisoned")
            .push(assessment.clone());
        Ok(())
    }

    fn query_baseline(&self, user_id: &str, days: u32) -> Result<Baseline> {
        self.baselines
            .read()
            .expect("baseline lock poisoned")
            .get(user_id)
            .copied()
            .ok_or_else(|| {
                StrainError::Storage(StorageError::NoBaseline {
                    user_id: user_id.to_string(),
                    days,
                })
            })
    }

    fn query_session_history(
        &self,
        user_id: &str,
        exercise_id: Option<&str>,
        lookback_days: u32,
        today: NaiveDate,
    ) -> Result<Vec<WorkoutSessionRecord>> {
        let cutoff = today - Duration::days(lookback_days as i64);
        let sessions = self.sessions.read().expect("session lock poisoned");
        let mut matched: Vec<WorkoutSessionRecord> = sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .filter(|s| exercise_id.map(|e| s.exercise_id == e).unwrap_or(true))
            .filter(|s| s.date >= cutoff && s.date <= today)
            .cloned()
            .collect();
        matched.sort_by_key(|s| s.date);
        Ok(matched)
    }
}

/// Logs deliveries and drops them
#[derive(Debug, Default)]
pub struct NullNotificationSink;

impl NotificationSink for NullNotificationSink {
    fn deliver_alert(&self, alert: &Alert) -> Result<()> {
        info!(alert_id = %alert.id, severity = %alert.severity, "alert delivery (null sink)");
        Ok(())
    }

    fn deliver_recommendation(&self, recommendation: &TrainingRecommendation) -> Result<()> {
        info!(
            user_id = %recommendation.user_id,
            tier = %recommendation.tier,
            "recommendation delivery (null sink)"
        );
        Ok(())
    }
}

/// Permission gate that allows every action
#[derive(Debug, Default)]
pub struct AllowAllGate;

impl PermissionGate for AllowAllGate {
    fn check(&self, _user_id: &str, _action: PermissionAction) -> Result<()> {
        Ok(())
    }
}

/// Permission gate that denies every action
#[derive(Debug, Default)]
pub struct DenyAllGate;

impl PermissionGate for DenyAllGate {
    fn check(&self, user_id: &str, action: PermissionAction) -> Result<()> {
        Err(StrainError::PermissionDenied {
            user_id: user_id.to_string(),
            action: action.to_string(),
        })
    }
}
