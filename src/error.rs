//! Unified error hierarchy for strainrs
//!
//! Validation failures are synchronous and typed; missing source data is a
//! confidence degradation, not an error; collaborator failures never fail a
//! computation that can complete from in-memory state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for all strainrs operations
#[derive(Debug, Error)]
pub enum StrainError {
    /// Reading rejected at the ingestion boundary
    #[error("Reading rejected: {0}")]
    Rejection(#[from] RejectReason),

    /// Scoring/decision calculation errors
    #[error("Calculation error: {0}")]
    Calculation(#[from] CalculationError),

    /// Storage collaborator errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Permission gate denied a mutation
    #[error("Permission denied for {user_id}: {action}")]
    PermissionDenied { user_id: String, action: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reasons a reading is rejected at the submit boundary
///
/// These are the only rejection reasons the ingestion contract emits; a
/// rejected reading never enters the buffer and is never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Signal type text did not parse to a known type
    #[error("invalid signal type: {signal_type}")]
    InvalidSignalType { signal_type: String },

    /// Value was NaN or infinite
    #[error("non-finite value for {signal_type}")]
    NonFiniteValue { signal_type: String },

    /// Device is not on the authorized list
    #[error("unauthorized device: {device_id}")]
    UnauthorizedDevice { device_id: String },
}

impl RejectReason {
    /// Stable wire identifier for the rejection
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::InvalidSignalType { .. } => "invalid_signal_type",
            RejectReason::NonFiniteValue { .. } => "non_finite_value",
            RejectReason::UnauthorizedDevice { .. } => "unauthorized_device",
        }
    }
}

/// Calculation errors
#[derive(Debug, Error)]
pub enum CalculationError {
    /// Insufficient data for a calculation that has no degraded mode
    #[error("Insufficient data for {calculation}: {reason}")]
    InsufficientData { calculation: String, reason: String },

    /// Invalid parameter
    #[error("Invalid parameter for {calculation}: {parameter}={value}")]
    InvalidParameter {
        calculation: String,
        parameter: String,
        value: String,
    },

    /// Division by zero
    #[error("Division by zero in {calculation}")]
    DivisionByZero { calculation: String },
}

/// Storage collaborator errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Collaborator unreachable
    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    /// Requested record does not exist
    #[error("Record not found: {kind}.{id}")]
    NotFound { kind: String, id: String },

    /// Baseline query returned no usable data
    #[error("No baseline for user {user_id} over {days} days")]
    NoBaseline { user_id: String, days: u32 },
}

/// Result type alias for strainrs operations
pub type Result<T> = std::result::Result<T, StrainError>;

impl StrainError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StrainError::Storage(StorageError::Unavailable { .. }) | StrainError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            StrainError::Rejection(_) => ErrorSeverity::Warning,
            StrainError::Storage(StorageError::NotFound { .. }) => ErrorSeverity::Warning,
            StrainError::Storage(StorageError::NoBaseline { .. }) => ErrorSeverity::Warning,
            StrainError::Storage(_) => ErrorSeverity::Error,
            StrainError::PermissionDenied { .. } => ErrorSeverity::Error,
            StrainError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            StrainError::Rejection(reason) => {
                format!("Reading was not accepted: {}", reason)
            }
            StrainError::Storage(StorageError::NoBaseline { user_id, days }) => {
                format!(
                    "Not enough history for {} to build a {}-day baseline. Keep wearing a device and try again.",
                    user_id, days
                )
            }
            StrainError::Storage(StorageError::Unavailable { .. }) => {
                "History storage is temporarily unavailable. Live results are unaffected.".to_string()
            }
            StrainError::Calculation(CalculationError::InsufficientData { calculation, .. }) => {
                format!("Not enough data to compute {}.", calculation)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}
