use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physiological signal types accepted by the ingestion boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    HeartRate,
    RestingHeartRate,
    Spo2,
    Hrv,
    Recovery,
    Strain,
    Sleep,
    Steps,
    Calories,
}

impl SignalType {
    /// All signal types, in no particular order
    pub const ALL: [SignalType; 9] = [
        SignalType::HeartRate,
        SignalType::RestingHeartRate,
        SignalType::Spo2,
        SignalType::Hrv,
        SignalType::Recovery,
        SignalType::Strain,
        SignalType::Sleep,
        SignalType::Steps,
        SignalType::Calories,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::HeartRate => "heart_rate",
            SignalType::RestingHeartRate => "resting_heart_rate",
            SignalType::Spo2 => "spo2",
            SignalType::Hrv => "hrv",
            SignalType::Recovery => "recovery",
            SignalType::Strain => "strain",
            SignalType::Sleep => "sleep",
            SignalType::Steps => "steps",
            SignalType::Calories => "calories",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "heart_rate" | "hr" => Ok(SignalType::HeartRate),
            "resting_heart_rate" | "rhr" => Ok(SignalType::RestingHeartRate),
            "spo2" => Ok(SignalType::Spo2),
            "hrv" => Ok(SignalType::Hrv),
            "recovery" => Ok(SignalType::Recovery),
            "strain" => Ok(SignalType::Strain),
            "sleep" => Ok(SignalType::Sleep),
            "steps" => Ok(SignalType::Steps),
            "calories" => Ok(SignalType::Calories),
            _ => Err(format!("Unknown signal type: {}", s)),
        }
    }
}

/// Device classes ordered by source priority for fusion
///
/// Lower priority rank wins when multiple devices report the same metric.
/// Chest straps and dedicated sports watches rank above generic trackers
/// because their sensors are more reliable for the high-value recovery
/// metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    ChestStrap,
    SportsWatch,
    SmartRing,
    FitnessBand,
    GenericTracker,
}

impl DeviceClass {
    /// Fusion priority rank; lower is preferred
    pub fn priority(&self) -> u8 {
        match self {
            DeviceClass::ChestStrap => 0,
            DeviceClass::SportsWatch => 1,
            DeviceClass::SmartRing => 2,
            DeviceClass::FitnessBand => 3,
            DeviceClass::GenericTracker => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::ChestStrap => "chest_strap",
            DeviceClass::SportsWatch => "sports_watch",
            DeviceClass::SmartRing => "smart_ring",
            DeviceClass::FitnessBand => "fitness_band",
            DeviceClass::GenericTracker => "generic_tracker",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single raw reading pushed by a device adapter
///
/// Immutable once created. Construction itself does not validate; the
/// ingestion boundary rejects non-finite values and unknown signal types
/// before a Reading ever reaches the buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Identifier of the reporting device
    pub device_id: String,

    /// Owner of the reading
    pub user_id: String,

    /// Device class used for source-priority fusion
    pub device_class: DeviceClass,

    /// What this value measures
    pub signal_type: SignalType,

    /// Measured value in the signal's native unit (bpm, %, ms, score)
    pub value: f64,

    /// When the device took the measurement
    pub timestamp: DateTime<Utc>,

    /// Optional adapter-specific metadata (JSON)
    pub metadata: Option<serde_json::Value>,
}

impl Reading {
    pub fn new(
        device_id: impl Into<String>,
        user_id: impl Into<String>,
        device_class: DeviceClass,
        signal_type: SignalType,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Reading {
            device_id: device_id.into(),
            user_id: user_id.into(),
            device_class,
            signal_type,
            value,
            timestamp,
            metadata: None,
        }
    }

    /// Whether the reading satisfies the ingestion contract
    pub fn has_finite_value(&self) -> bool {
        self.value.is_finite()
    }
}

/// Untyped reading as it arrives at the submit boundary
///
/// The signal type is still text here; parsing it is the first validation
/// step and the source of `invalid_signal_type` rejections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingSubmission {
    pub device_id: String,
    pub user_id: String,
    pub device_class: DeviceClass,
    pub signal_type: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Canonical per-user snapshot produced by the fusion resolver
///
/// At most one value per metric, chosen by device priority (sleep is the
/// exception and is averaged across reporting devices). `confidence`
/// reflects how many of the five weighted metrics were actually available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedSnapshot {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,

    /// Recovery/readiness score (0-100)
    pub recovery: Option<f64>,

    /// Strain score reported by a device (0-100)
    pub strain: Option<f64>,

    /// HRV in milliseconds (RMSSD)
    pub hrv: Option<f64>,

    /// Heart rate in bpm
    pub heart_rate: Option<f64>,

    /// Sleep quality score (0-100), consensus average across devices
    pub sleep: Option<f64>,

    pub steps: Option<f64>,
    pub calories: Option<f64>,

    /// Data-completeness confidence in [0, 1]
    pub confidence: f64,

    /// Weighted metrics no connected device supplied
    pub missing_metrics: Vec<SignalType>,

    /// Device classes that contributed at least one metric
    pub sources: Vec<DeviceClass>,
}

impl FusedSnapshot {
    /// Snapshot with no data at all; confidence 0
    pub fn empty(user_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        FusedSnapshot {
            user_id: user_id.into(),
            timestamp,
            recovery: None,
            strain: None,
            hrv: None,
            heart_rate: None,
            sleep: None,
            steps: None,
            calories: None,
            confidence: 0.0,
            missing_metrics: vec![
                SignalType::Recovery,
                SignalType::Hrv,
                SignalType::Strain,
                SignalType::HeartRate,
                SignalType::Sleep,
            ],
            sources: Vec::new(),
        }
    }
}

/// Historical workout session supplied by the storage collaborator
///
/// Append-only and read-only to this subsystem; the progression analyzer and
/// the deload assessment consume windows of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub exercise_id: String,
    pub date: NaiveDate,

    /// Reps the plan called for across all sets
    pub planned_reps: u32,

    /// Reps actually completed
    pub actual_reps: u32,

    /// Working load in kilograms
    pub load_kg: Decimal,

    /// Target reps per set for the exercise (drives load-vs-rep progression)
    pub reps_per_set: u32,

    /// Perceived effort 1-10 reported after the session
    pub perceived_effort: f64,

    /// Recovery score (0-100) on the morning of the session, if known
    pub recovery_score: Option<f64>,

    /// Whether the session was completed rather than abandoned
    pub completed: bool,
}

impl WorkoutSessionRecord {
    /// Per-session completion rate, capped at 1.0
    pub fn completion_rate(&self) -> f64 {
        if self.planned_reps == 0 {
            return 0.0;
        }
        (self.actual_reps as f64 / self.planned_reps as f64).min(1.0)
    }

    /// Session volume: reps x load
    pub fn volume(&self) -> Decimal {
        Decimal::from(self.actual_reps) * self.load_kg
    }
}

/// Per-user safety configuration consumed by the decision engine
///
/// Missing settings fall back to `Default`, which is deliberately
/// conservative (low recovery tolerance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySettings {
    /// Recovery score below which training drops to rest
    pub recovery_minimum: f64,

    /// strain/target_strain ratio that triggers a warning
    pub strain_warning_threshold: f64,

    /// Tolerance for elevated injury risk (0-1); lower is stricter
    pub injury_risk_tolerance: f64,

    /// Enable the automatic deload side computation
    pub auto_deload_trigger: bool,

    /// Honor hard stops at all
    pub enable_hard_stop: bool,

    /// Restrict hard stops to deload weeks
    pub hard_stop_only_during_deload: bool,
}

impl Default for SafetySettings {
    fn default() -> Self {
        // Conservative: treat the user as having low recovery tolerance
        SafetySettings {
            recovery_minimum: 33.0,
            strain_warning_threshold: 1.1,
            injury_risk_tolerance: 0.3,
            auto_deload_trigger: true,
            enable_hard_stop: true,
            hard_stop_only_during_deload: false,
        }
    }
}

/// 30-day baseline values supplied by the storage collaborator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Trimmed-mean resting heart rate in bpm
    pub resting_hr: f64,

    /// Trimmed-mean SpO2 percentage
    pub spo2: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signal_type_parsing() {
        assert_eq!("heart_rate".parse::<SignalType>().unwrap(), SignalType::HeartRate);
        assert_eq!("SPO2".parse::<SignalType>().unwrap(), SignalType::Spo2);
        assert_eq!("rhr".parse::<SignalType>().unwrap(), SignalType::RestingHeartRate);
        assert!("cadence".parse::<SignalType>().is_err());
    }

    #[test]
    fn test_signal_type_roundtrip() {
        for signal in SignalType::ALL {
            assert_eq!(signal.as_str().parse::<SignalType>().unwrap(), signal);
        }
    }

    #[test]
    fn test_device_class_priority_ordering() {
        assert!(DeviceClass::ChestStrap.priority() < DeviceClass::SportsWatch.priority());
        assert!(DeviceClass::SportsWatch.priority() < DeviceClass::GenericTracker.priority());
    }

    #[test]
    fn test_reading_finite_value() {
        let reading = Reading::new(
            "dev-1",
            "user-1",
            DeviceClass::SportsWatch,
            SignalType::HeartRate,
            62.0,
            Utc::now(),
        );
        assert!(reading.has_finite_value());

        let bad = Reading::new(
            "dev-1",
            "user-1",
            DeviceClass::SportsWatch,
            SignalType::HeartRate,
            f64::NAN,
            Utc::now(),
        );
        assert!(!bad.has_finite_value());
    }

    #[test]
    fn test_completion_rate_capped() {
        let session = WorkoutSessionRecord {
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
            exercise_id: "squat".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            planned_reps: 20,
            actual_reps: 25,
            load_kg: dec!(100),
            reps_per_set: 5,
            perceived_effort: 7.0,
            recovery_score: Some(70.0),
            completed: true,
        };
        assert_eq!(session.completion_rate(), 1.0);
        assert_eq!(session.volume(), dec!(2500));
    }

    #[test]
    fn test_empty_snapshot_confidence() {
        let snapshot = FusedSnapshot::empty("u1", Utc::now());
        assert_eq!(snapshot.confidence, 0.0);
        assert_eq!(snapshot.missing_metrics.len(), 5);
    }

    #[test]
    fn test_reading_serialization() {
        let reading = Reading::new(
            "dev-1",
            "user-1",
            DeviceClass::ChestStrap,
            SignalType::Hrv,
            48.5,
            Utc::now(),
        );
        let json = serde_json::to_string(&reading).unwrap();
        let back: Reading = serde_json::from_str(&json).unwrap();
        assert_eq!(reading, back);
    }
}
