// Library interface for the strainrs modules
// This allows integration tests to access the core functionality

pub mod alerts;
pub mod assessment;
pub mod buffer;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod ids;
pub mod live;
pub mod logging;
pub mod models;
pub mod progression;
pub mod storage;
pub mod sweep;
pub mod zones;

// Re-export commonly used types for convenience
pub use models::*;
pub use alerts::{Alert, AlertCondition, AlertEvaluator, AlertPattern, AlertSeverity};
pub use assessment::{DailyVitals, StrainAssessment, StrainScorer};
pub use buffer::SignalBufferStore;
pub use config::EngineConfig;
pub use decision::{DecisionContext, DecisionEngine, IntensityTier, TrainingRecommendation};
pub use engine::StrainEngine;
pub use error::{RejectReason, Result, StrainError};
pub use fusion::FusionResolver;
pub use live::{LiveStrainCalculator, LiveStrainResult, LiveStatus};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use progression::{ProgressionAction, ProgressionAnalyzer, ProgressionDecision};
pub use storage::{
    AllowAllGate, MemorySessionStore, NotificationSink, NullNotificationSink, PermissionGate,
    SessionStore,
};
pub use zones::{OverallStatus, TrafficZone, ZoneClassifier};
