//! External interface facade
//!
//! `StrainEngine` owns the buffer, fusion resolver, scorers, alert evaluator
//! and the periodic sweep, and consumes storage, notification and permission
//! collaborators through traits. Every operation the subsystem exposes goes
//! through here.

use chrono::{Duration, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, instrument, warn};

use crate::alerts::{Alert, AlertCondition, AlertEvaluator};
use crate::assessment::{DailyVitals, StrainAssessment, StrainScorer};
use crate::buffer::SignalBufferStore;
use crate::config::EngineConfig;
use crate::decision::{DecisionContext, DecisionEngine, TrainingRecommendation};
use crate::error::{RejectReason, Result};
use crate::fusion::FusionResolver;
use crate::ids::{IdGenerator, UuidGenerator};
use crate::live::{LiveStrainCalculator, LiveStrainResult};
use crate::models::{Reading, ReadingSubmission, SafetySettings, SignalType};
use crate::progression::{ProgressionAnalyzer, ProgressionDecision};
use crate::storage::{NotificationSink, PermissionAction, PermissionGate, SessionStore};
use crate::sweep::SweepScheduler;

/// Baseline window the storage collaborator is asked for, days
const BASELINE_DAYS: u32 = 30;
/// Sessions in the HRV rolling baseline
const HRV_BASELINE_SESSIONS: usize = 7;

pub struct StrainEngine {
    config: EngineConfig,
    buffer: Arc<SignalBufferStore>,
    fusion: FusionResolver,
    scorer: StrainScorer,
    live: LiveStrainCalculator,
    decision: DecisionEngine,
    progression: ProgressionAnalyzer,
    alerts: AlertEvaluator,

    store: Arc<dyn SessionStore>,
    sink: Arc<dyn NotificationSink>,
    gate: Arc<dyn PermissionGate>,

    /// None means open enrollment; Some restricts to the listed device ids
    authorized_devices: RwLock<Option<HashSet<String>>>,
    safety_settings: RwLock<HashMap<String, SafetySettings>>,
    sweep: Mutex<SweepScheduler>,
}

impl StrainEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn SessionStore>,
        sink: Arc<dyn NotificationSink>,
        gate: Arc<dyn PermissionGate>,
    ) -> Self {
        Self::with_id_generator(config, store, sink, gate, Arc::new(UuidGenerator))
    }

    pub fn with_id_generator(
        config: EngineConfig,
        store: Arc<dyn SessionStore>,
        sink: Arc<dyn NotificationSink>,
        gate: Arc<dyn PermissionGate>,
        id_gen: Arc<dyn IdGenerator>,
    ) -> Self {
        let sweep_interval = std::time::Duration::from_secs(config.buffer.sweep_interval_secs);
        StrainEngine {
            buffer: Arc::new(SignalBufferStore::new(config.buffer.capacity)),
            fusion: FusionResolver::new(config.fusion.clone()),
            scorer: StrainScorer::new(config.zones.clone()),
            live: LiveStrainCalculator::new(config.live.clone()),
            decision: DecisionEngine::new(config.deload.clone()),
            progression: ProgressionAnalyzer::new(config.progression.clone()),
            alerts: AlertEvaluator::new(config.zones.spo2_critical_floor, id_gen),
            store,
            sink,
            gate,
            authorized_devices: RwLock::new(None),
            safety_settings: RwLock::new(HashMap::new()),
            sweep: Mutex::new(SweepScheduler::new(sweep_interval)),
            config,
        }
    }

    /// Restrict ingestion to the listed device ids
    pub fn restrict_devices<I, S>(&self, device_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: HashSet<String> = device_ids.into_iter().map(Into::into).collect();
        *self
            .authorized_devices
            .write()
            .expect("authorized device lock poisoned") = Some(set);
    }

    /// Accept or reject one reading
    ///
    /// Rejected readings never enter the buffer. Acceptance also re-evaluates
    /// the user's alert conditions so qualifying patterns fire promptly;
    /// delivery failures are logged and never surface here.
    #[instrument(skip(self, submission), fields(user_id = %submission.user_id, device_id = %submission.device_id))]
    pub fn submit(&self, submission: ReadingSubmission) -> std::result::Result<(), RejectReason> {
        let signal_type: SignalType =
            submission
                .signal_type
                .parse()
                .map_err(|_| RejectReason::InvalidSignalType {
                    signal_type: submission.signal_type.clone(),
                })?;

        {
            let authorized = self
                .authorized_devices
                .read()
                .expect("authorized device lock poisoned");
            if let Some(authorized) = authorized.as_ref() {
                if !authorized.contains(&submission.device_id) {
                    return Err(RejectReason::UnauthorizedDevice {
                        device_id: submission.device_id,
                    });
                }
            }
        }

        let user_id = submission.user_id.clone();
        let timestamp = submission.timestamp;
        let mut reading = Reading::new(
            submission.device_id,
            submission.user_id,
            submission.device_class,
            signal_type,
            submission.value,
            submission.timestamp,
        );
        reading.metadata = submission.metadata;
        self.buffer.ingest(reading)?;

        for alert in self.alerts.evaluate(&user_id, &self.buffer, timestamp) {
            if let Err(err) = self.sink.deliver_alert(&alert) {
                warn!(alert_id = %alert.id, error = %err, "alert delivery failed");
            }
        }
        Ok(())
    }

    /// Daily assessment against the 30-day baseline
    ///
    /// The baseline comes from the storage collaborator and is required;
    /// historizing the finished assessment is best-effort.
    #[instrument(skip(self))]
    pub fn assess(&self, user_id: &str, date: NaiveDate) -> Result<StrainAssessment> {
        let baseline = self.store.query_baseline(user_id, BASELINE_DAYS)?;

        let now = Utc::now();
        let per_device = self.buffer.latest_per_device(user_id);
        let snapshot = self.fusion.fuse(user_id, &per_device, now);
        let today = DailyVitals {
            resting_hr: self
                .fusion
                .resolve_latest(&per_device, SignalType::RestingHeartRate),
            spo2: self.fusion.resolve_latest(&per_device, SignalType::Spo2),
        };

        let outstanding = self.alerts.poll_alerts(user_id);
        let assessment = self.scorer.assess(
            user_id,
            date,
            baseline,
            today,
            snapshot.confidence,
            outstanding,
            now,
        );

        if let Err(err) = self.store.append_assessment(&assessment) {
            warn!(user_id, error = %err, "assessment historize failed, returning in-memory result");
        }
        Ok(assessment)
    }

    /// Live strain from buffered readings only; never persisted
    pub fn live_strain(&self, user_id: &str) -> LiveStrainResult {
        self.live.compute(user_id, &self.buffer, Utc::now())
    }

    /// Training recommendation from the fused snapshot and recent history
    ///
    /// `settings` overrides any stored safety settings for this call; absent
    /// both, conservative defaults apply. A storage failure degrades the
    /// deload side computation to an empty history instead of failing.
    #[instrument(skip(self, settings, ctx))]
    pub fn recommend(
        &self,
        user_id: &str,
        settings: Option<SafetySettings>,
        ctx: &DecisionContext,
    ) -> TrainingRecommendation {
        let now = Utc::now();
        let per_device = self.buffer.latest_per_device(user_id);
        let snapshot = self.fusion.fuse(user_id, &per_device, now);

        let settings = settings
            .or_else(|| {
                self.safety_settings
                    .read()
                    .expect("safety settings lock poisoned")
                    .get(user_id)
                    .cloned()
            })
            .unwrap_or_default();

        let history = match self.store.query_session_history(
            user_id,
            None,
            self.config.progression.lookback_days,
            now.date_naive(),
        ) {
            Ok(history) => history,
            Err(err) => {
                warn!(user_id, error = %err, "session history unavailable, continuing without it");
                Vec::new()
            }
        };

        let ctx = self.fill_hrv_baseline(user_id, ctx);
        let recommendation = self.decision.recommend(&snapshot, &history, &settings, &ctx, now);

        if let Err(err) = self.sink.deliver_recommendation(&recommendation) {
            warn!(user_id, error = %err, "recommendation delivery failed");
        }
        recommendation
    }

    /// Multi-week progression decision for one exercise
    pub fn progression(
        &self,
        user_id: &str,
        exercise_id: &str,
        lookback_days: Option<u32>,
    ) -> ProgressionDecision {
        let today = Utc::now().date_naive();
        let lookback = lookback_days.unwrap_or(self.config.progression.lookback_days);
        let sessions = match self
            .store
            .query_session_history(user_id, Some(exercise_id), lookback, today)
        {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!(user_id, exercise_id, error = %err, "session history unavailable");
                Vec::new()
            }
        };
        self.progression.analyze(user_id, exercise_id, &sessions, today)
    }

    pub fn poll_alerts(&self, user_id: &str) -> Vec<Alert> {
        self.alerts.poll_alerts(user_id)
    }

    pub fn subscribe_alerts(&self, user_id: &str) -> Receiver<Alert> {
        self.alerts.subscribe(user_id)
    }

    pub fn ack(&self, alert_id: &str) -> Result<()> {
        self.alerts.ack(alert_id)
    }

    /// Gated: register a new alert condition for a user
    pub fn add_alert_condition(&self, condition: AlertCondition) -> Result<()> {
        self.gate
            .check(&condition.user_id, PermissionAction::MutateAlertConditions)?;
        self.alerts.add_condition(condition);
        Ok(())
    }

    /// Gated: enable or disable an existing condition
    pub fn set_condition_enabled(
        &self,
        user_id: &str,
        condition_id: &str,
        enabled: bool,
    ) -> Result<()> {
        self.gate
            .check(user_id, PermissionAction::MutateAlertConditions)?;
        self.alerts.set_condition_enabled(condition_id, enabled)
    }

    pub fn alert_conditions(&self, user_id: &str) -> Vec<AlertCondition> {
        self.alerts.conditions_for(user_id)
    }

    /// Gated: replace a user's safety settings
    pub fn set_safety_settings(&self, user_id: &str, settings: SafetySettings) -> Result<()> {
        self.gate
            .check(user_id, PermissionAction::MutateSafetySettings)?;
        self.safety_settings
            .write()
            .expect("safety settings lock poisoned")
            .insert(user_id.to_string(), settings);
        Ok(())
    }

    /// Start the background sweep that prunes stale buffer entries
    pub fn start_sweep(&self) {
        let buffer = Arc::clone(&self.buffer);
        let retention = Duration::seconds(self.config.buffer.retention_secs as i64);
        let mut sweep = self.sweep.lock().expect("sweep lock poisoned");
        sweep.start(move || {
            let pruned = buffer.prune_older_than(Utc::now() - retention);
            if pruned > 0 {
                info!(pruned, "sweep pruned stale readings");
            }
        });
    }

    /// Stop the sweep; idempotent
    pub fn stop_sweep(&self) {
        self.sweep.lock().expect("sweep lock poisoned").stop();
    }

    pub fn buffer(&self) -> &SignalBufferStore {
        &self.buffer
    }

    /// 7-session rolling HRV baseline from buffered readings, unless the
    /// caller already supplied one
    fn fill_hrv_baseline(&self, user_id: &str, ctx: &DecisionContext) -> DecisionContext {
        let mut ctx = ctx.clone();
        if ctx.hrv_baseline.is_none() {
            let readings = self
                .buffer
                .recent(user_id, SignalType::Hrv, HRV_BASELINE_SESSIONS + 1);
            // Exclude the newest reading: it is the value being judged
            let history = &readings[..readings.len().saturating_sub(1)];
            if !history.is_empty() {
                ctx.hrv_baseline =
                    Some(history.iter().map(|r| r.value).sum::<f64>() / history.len() as f64);
            }
        }
        ctx
    }
}

impl Drop for StrainEngine {
    fn drop(&mut self) {
        self.stop_sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequenceGenerator;
    use crate::models::DeviceClass;
    use crate::storage::{AllowAllGate, DenyAllGate, MemorySessionStore, NullNotificationSink};

    fn engine_with(store: Arc<MemorySessionStore>) -> StrainEngine {
        StrainEngine::with_id_generator(
            EngineConfig::default(),
            store,
            Arc::new(NullNotificationSink),
            Arc::new(AllowAllGate),
            Arc::new(SequenceGenerator::new("id")),
        )
    }

    fn submission(signal_type: &str, value: f64) -> ReadingSubmission {
        ReadingSubmission {
            device_id: "dev-1".to_string(),
            user_id: "u1".to_string(),
            device_class: DeviceClass::SportsWatch,
            signal_type: signal_type.to_string(),
            value,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    #[test]
    fn test_submit_rejects_unknown_signal() {
        let engine = engine_with(Arc::new(MemorySessionStore::new()));
        let err = engine.submit(submission("cadence", 90.0)).unwrap_err();
        assert_eq!(err.code(), "invalid_signal_type");
        assert_eq!(engine.buffer().total_len(), 0);
    }

    #[test]
    fn test_submit_rejects_non_finite() {
        let engine = engine_with(Arc::new(MemorySessionStore::new()));
        let err = engine.submit(submission("heart_rate", f64::NAN)).unwrap_err();
        assert_eq!(err.code(), "non_finite_value");
        assert_eq!(engine.buffer().total_len(), 0);
    }

    #[test]
    fn test_submit_rejects_unauthorized_device() {
        let engine = engine_with(Arc::new(MemorySessionStore::new()));
        engine.restrict_devices(["dev-2"]);
        let err = engine.submit(submission("heart_rate", 60.0)).unwrap_err();
        assert_eq!(err.code(), "unauthorized_device");

        engine.restrict_devices(["dev-1", "dev-2"]);
        assert!(engine.submit(submission("heart_rate", 60.0)).is_ok());
    }

    #[test]
    fn test_denied_gate_blocks_condition_mutation() {
        let engine = StrainEngine::new(
            EngineConfig::default(),
            Arc::new(MemorySessionStore::new()),
            Arc::new(NullNotificationSink),
            Arc::new(DenyAllGate),
        );
        let err = engine
            .set_safety_settings("u1", SafetySettings::default())
            .unwrap_err();
        assert!(matches!(err, crate::error::StrainError::PermissionDenied { .. }));
    }

    #[test]
    fn test_live_strain_reads_buffer_only() {
        let store = Arc::new(MemorySessionStore::new());
        let engine = engine_with(Arc::clone(&store));
        engine.submit(submission("heart_rate", 60.0)).unwrap();
        engine.submit(submission("heart_rate", 110.0)).unwrap();
        let result = engine.live_strain("u1");
        assert!(result.strain_score > 0.0);
        // Nothing historized by a live computation
        assert!(store.assessments_for("u1").is_empty());
    }
}
