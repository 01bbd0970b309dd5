//! Windowed alert evaluation
//!
//! Conditions count qualifying readings inside a sliding time window and fire
//! at a configured count threshold. An SpO2 value under the hard critical
//! floor bypasses counting and fires immediately at Critical severity.
//!
//! Emission is at-most-one-in-flight per condition: while a condition has an
//! unacknowledged alert, re-evaluation will not produce another one. Acking
//! the alert opens the next window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::buffer::SignalBufferStore;
use crate::error::{Result, StorageError, StrainError};
use crate::ids::IdGenerator;
use crate::models::{Reading, SignalType};

/// Synthetic condition id for the built-in SpO2 critical floor override
const CRITICAL_SPO2_CONDITION: &str = "builtin:spo2_critical_floor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "info"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// What a condition looks for in the signal window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertPattern {
    /// Strain readings at or above `min_strain`
    RepeatedHighStrain { min_strain: f64 },
    /// SpO2 readings at or below `max_spo2`
    LowSpo2 { max_spo2: f64 },
    /// Resting heart rate readings at or above `min_hr`
    ElevatedRestingHr { min_hr: f64 },
}

impl AlertPattern {
    pub fn signal(&self) -> SignalType {
        match self {
            AlertPattern::RepeatedHighStrain { .. } => SignalType::Strain,
            AlertPattern::LowSpo2 { .. } => SignalType::Spo2,
            AlertPattern::ElevatedRestingHr { .. } => SignalType::RestingHeartRate,
        }
    }

    pub fn matches(&self, reading: &Reading) -> bool {
        match self {
            AlertPattern::RepeatedHighStrain { min_strain } => reading.value >= *min_strain,
            AlertPattern::LowSpo2 { max_spo2 } => reading.value <= *max_spo2,
            AlertPattern::ElevatedRestingHr { min_hr } => reading.value >= *min_hr,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            AlertPattern::RepeatedHighStrain { min_strain } => {
                format!("repeated strain readings at or above {}", min_strain)
            }
            AlertPattern::LowSpo2 { max_spo2 } => {
                format!("SpO2 readings at or below {}%", max_spo2)
            }
            AlertPattern::ElevatedRestingHr { min_hr } => {
                format!("resting heart rate at or above {} bpm", min_hr)
            }
        }
    }
}

/// A user-configured alert condition
///
/// Pattern and threshold are fixed at creation; only `enabled` may change
/// afterwards, behind the permission gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    pub id: String,
    pub user_id: String,
    pub pattern: AlertPattern,
    /// Matching readings needed inside the window before firing
    pub threshold: usize,
    /// Window length in seconds
    pub window_secs: i64,
    pub severity: AlertSeverity,
    pub enabled: bool,
}

impl AlertCondition {
    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs)
    }
}

/// An emitted alert; immutable history apart from acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub condition_id: String,
    pub user_id: String,
    pub severity: AlertSeverity,
    pub message: String,
    /// Matching readings counted when the alert fired
    pub matched_count: usize,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged: bool,
}

/// Evaluates conditions against buffered signals and owns alert history
pub struct AlertEvaluator {
    spo2_critical_floor: f64,
    id_gen: Arc<dyn IdGenerator>,
    conditions: RwLock<HashMap<String, AlertCondition>>,
    alerts: RwLock<Vec<Alert>>,
    subscribers: RwLock<HashMap<String, Vec<Sender<Alert>>>>,
}

impl AlertEvaluator {
    pub fn new(spo2_critical_floor: f64, id_gen: Arc<dyn IdGenerator>) -> Self {
        AlertEvaluator {
            spo2_critical_floor,
            id_gen,
            conditions: RwLock::new(HashMap::new()),
            alerts: RwLock::new(Vec::new()),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_condition(&self, condition: AlertCondition) {
        debug!(
            condition_id = %condition.id,
            user_id = %condition.user_id,
            "registering alert condition"
        );
        let mut conditions = self.conditions.write().expect("condition lock poisoned");
        conditions.insert(condition.id.clone(), condition);
    }

    pub fn set_condition_enabled(&self, condition_id: &str, enabled: bool) -> Result<()> {
        let mut conditions = self.conditions.write().expect("condition lock poisoned");
        let condition = conditions.get_mut(condition_id).ok_or_else(|| {
            StrainError::Storage(StorageError::NotFound {
                kind: "alert_condition".to_string(),
                id: condition_id.to_string(),
            })
        })?;
        condition.enabled = enabled;
        info!(condition_id, enabled, "alert condition toggled");
        Ok(())
    }

    pub fn conditions_for(&self, user_id: &str) -> Vec<AlertCondition> {
        let conditions = self.conditions.read().expect("condition lock poisoned");
        conditions
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Run every enabled condition for a user against the buffer
    ///
    /// Returns alerts fired by this call. Conditions with an outstanding
    /// unacknowledged alert are skipped.
    pub fn evaluate(
        &self,
        user_id: &str,
        buffer: &SignalBufferStore,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut fired = Vec::new();

        if let Some(alert) = self.check_critical_floor(user_id, buffer, now) {
            fired.push(alert);
        }

        let conditions = self.conditions_for(user_id);
        for condition in conditions.iter().filter(|c| c.enabled) {
            if self.has_unacknowledged(&condition.id) {
                debug!(
                    condition_id = %condition.id,
                    "skipping condition with outstanding unacknowledged alert"
                );
                continue;
            }
            let cutoff = now - condition.window();
            let window: Vec<Reading> = buffer
                .recent(user_id, condition.pattern.signal(), usize::MAX)
                .into_iter()
                .filter(|r| r.timestamp >= cutoff && r.timestamp <= now)
                .collect();
            let matched = window.iter().filter(|r| condition.pattern.matches(r)).count();
            if matched >= condition.threshold {
                let alert = self.fire(
                    condition.id.clone(),
                    user_id,
                    condition.severity,
                    format!(
                        "{} ({} of {} readings in the last {}s)",
                        condition.pattern.describe(),
                        matched,
                        window.len(),
                        condition.window_secs
                    ),
                    matched,
                    now,
                );
                fired.push(alert);
            }
        }

        fired
    }

    /// SpO2 below the hard floor fires immediately, ignoring window counts
    fn check_critical_floor(
        &self,
        user_id: &str,
        buffer: &SignalBufferStore,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        let latest = buffer.recent(user_id, SignalType::Spo2, 1);
        let reading = latest.last()?;
        if reading.value >= self.spo2_critical_floor {
            return None;
        }
        let condition_id = format!("{}:{}", CRITICAL_SPO2_CONDITION, user_id);
        if self.has_unacknowledged(&condition_id) {
            return None;
        }
        warn!(
            user_id,
            value = reading.value,
            floor = self.spo2_critical_floor,
            "SpO2 below critical floor"
        );
        Some(self.fire(
            condition_id,
            user_id,
            AlertSeverity::Critical,
            format!(
                "SpO2 {}% is below the critical floor of {}%",
                reading.value, self.spo2_critical_floor
            ),
            1,
            now,
        ))
    }

    fn fire(
        &self,
        condition_id: String,
        user_id: &str,
        severity: AlertSeverity,
        message: String,
        matched_count: usize,
        now: DateTime<Utc>,
    ) -> Alert {
        let alert = Alert {
            id: self.id_gen.next_id(),
            condition_id,
            user_id: user_id.to_string(),
            severity,
            message,
            matched_count,
            triggered_at: now,
            acknowledged: false,
        };
        info!(
            alert_id = %alert.id,
            condition_id = %alert.condition_id,
            severity = %alert.severity,
            "alert fired"
        );
        self.alerts
            .write()
            .expect("alert lock poisoned")
            .push(alert.clone());
        self.notify_subscribers(&alert);
        alert
    }

    fn has_unacknowledged(&self, condition_id: &str) -> bool {
        let alerts = self.alerts.read().expect("alert lock poisoned");
        alerts
            .iter()
            .any(|a| a.condition_id == condition_id && !a.acknowledged)
    }

    /// Unacknowledged alerts for a user, oldest first
    pub fn poll_alerts(&self, user_id: &str) -> Vec<Alert> {
        let alerts = self.alerts.read().expect("alert lock poisoned");
        alerts
            .iter()
            .filter(|a| a.user_id == user_id && !a.acknowledged)
            .cloned()
            .collect()
    }

    /// Push subscription; the receiver sees alerts fired after this call
    pub fn subscribe(&self, user_id: &str) -> Receiver<Alert> {
        let (tx, rx) = channel();
        let mut subscribers = self.subscribers.write().expect("subscriber lock poisoned");
        subscribers.entry(user_id.to_string()).or_default().push(tx);
        rx
    }

    fn notify_subscribers(&self, alert: &Alert) {
        let mut subscribers = self.subscribers.write().expect("subscriber lock poisoned");
        if let Some(senders) = subscribers.get_mut(&alert.user_id) {
            // Dropped receivers are pruned as sends fail
            senders.retain(|tx| tx.send(alert.clone()).is_ok());
        }
    }

    /// Acknowledge an alert; the only mutation alerts permit
    pub fn ack(&self, alert_id: &str) -> Result<()> {
        let mut alerts = self.alerts.write().expect("alert lock poisoned");
        let alert = alerts.iter_mut().find(|a| a.id == alert_id).ok_or_else(|| {
            StrainError::Storage(StorageError::NotFound {
                kind: "alert".to_string(),
                id: alert_id.to_string(),
            })
        })?;
        alert.acknowledged = true;
        info!(alert_id, "alert acknowledged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequenceGenerator;
    use crate::models::{DeviceClass, Reading};

    fn evaluator() -> AlertEvaluator {
        AlertEvaluator::new(92.0, Arc::new(SequenceGenerator::new("alert")))
    }

    fn push(buffer: &SignalBufferStore, signal: SignalType, value: f64, now: DateTime<Utc>) {
        buffer
            .ingest(Reading::new(
                "dev-1",
                "u1",
                DeviceClass::SportsWatch,
                signal,
                value,
                now,
            ))
            .unwrap();
    }

    fn strain_condition(threshold: usize) -> AlertCondition {
        AlertCondition {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            pattern: AlertPattern::RepeatedHighStrain { min_strain: 90.0 },
            threshold,
            window_secs: 600,
            severity: AlertSeverity::Warning,
            enabled: true,
        }
    }

    #[test]
    fn test_fires_at_count_threshold() {
        let evaluator = evaluator();
        let buffer = SignalBufferStore::new(100);
        let now = Utc::now();
        evaluator.add_condition(strain_condition(3));

        push(&buffer, SignalType::Strain, 95.0, now);
        push(&buffer, SignalType::Strain, 96.0, now);
        assert!(evaluator.evaluate("u1", &buffer, now).is_empty());

        push(&buffer, SignalType::Strain, 97.0, now);
        let fired = evaluator.evaluate("u1", &buffer, now);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].severity, AlertSeverity::Warning);
        assert_eq!(fired[0].matched_count, 3);
    }

    #[test]
    fn test_readings_outside_window_do_not_count() {
        let evaluator = evaluator();
        let buffer = SignalBufferStore::new(100);
        let now = Utc::now();
        evaluator.add_condition(strain_condition(2));

        push(&buffer, SignalType::Strain, 95.0, now - Duration::seconds(700));
        push(&buffer, SignalType::Strain, 95.0, now);
        assert!(evaluator.evaluate("u1", &buffer, now).is_empty());
    }

    #[test]
    fn test_at_most_one_unacknowledged_alert_per_condition() {
        let evaluator = evaluator();
        let buffer = SignalBufferStore::new(100);
        let now = Utc::now();
        evaluator.add_condition(strain_condition(1));

        push(&buffer, SignalType::Strain, 95.0, now);
        assert_eq!(evaluator.evaluate("u1", &buffer, now).len(), 1);
        // Same qualifying pattern again within the unresolved window
        push(&buffer, SignalType::Strain, 96.0, now);
        assert!(evaluator.evaluate("u1", &buffer, now).is_empty());
        assert_eq!(evaluator.poll_alerts("u1").len(), 1);

        // Acking opens the next window
        let alert_id = evaluator.poll_alerts("u1")[0].id.clone();
        evaluator.ack(&alert_id).unwrap();
        assert_eq!(evaluator.evaluate("u1", &buffer, now).len(), 1);
    }

    #[test]
    fn test_critical_floor_bypasses_counting() {
        let evaluator = evaluator();
        let buffer = SignalBufferStore::new(100);
        let now = Utc::now();
        // No conditions registered at all
        push(&buffer, SignalType::Spo2, 90.5, now);
        let fired = evaluator.evaluate("u1", &buffer, now);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_disabled_condition_never_fires() {
        let evaluator = evaluator();
        let buffer = SignalBufferStore::new(100);
        let now = Utc::now();
        let mut condition = strain_condition(1);
        condition.enabled = false;
        evaluator.add_condition(condition);

        push(&buffer, SignalType::Strain, 99.0, now);
        assert!(evaluator.evaluate("u1", &buffer, now).is_empty());

        evaluator.set_condition_enabled("c1", true).unwrap();
        assert_eq!(evaluator.evaluate("u1", &buffer, now).len(), 1);
    }

    #[test]
    fn test_subscriber_receives_fired_alert() {
        let evaluator = evaluator();
        let buffer = SignalBufferStore::new(100);
        let now = Utc::now();
        evaluator.add_condition(strain_condition(1));
        let rx = evaluator.subscribe("u1");

        push(&buffer, SignalType::Strain, 95.0, now);
        evaluator.evaluate("u1", &buffer, now);
        let received = rx.try_recv().unwrap();
        assert_eq!(received.condition_id, "c1");
    }

    #[test]
    fn test_ack_unknown_alert_is_not_found() {
        let evaluator = evaluator();
        assert!(evaluator.ack("missing").is_err());
    }
}
