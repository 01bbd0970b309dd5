//! Engine configuration
//!
//! Every clinical threshold the scoring path uses lives here as a named
//! field with the production default, so that none of them is a magic
//! number at the point of use. Validation happens once at load time.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Signal buffer sizing and sweep cadence
    pub buffer: BufferSettings,

    /// Daily zone classification boundaries
    pub zones: ZoneThresholds,

    /// Live strain caps and status cutoffs
    pub live: LiveStrainSettings,

    /// Fusion confidence weights
    pub fusion: FusionWeights,

    /// Automatic deload trigger thresholds
    pub deload: DeloadThresholds,

    /// Progression analysis thresholds
    pub progression: ProgressionSettings,
}

/// Signal buffer sizing and sweep cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferSettings {
    /// Ring capacity per (user, signal) key
    pub capacity: usize,

    /// Readings older than this are pruned by the sweep
    pub retention_secs: u64,

    /// Sweep interval
    pub sweep_interval_secs: u64,
}

impl Default for BufferSettings {
    fn default() -> Self {
        BufferSettings {
            capacity: 100,
            retention_secs: 24 * 3600,
            sweep_interval_secs: 5,
        }
    }
}

/// Daily zone classification boundaries
///
/// The HR and SpO2 deltas mirror the original product's hard-coded values
/// (4/9 bpm, 1/3 %); they stay configuration rather than being re-derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneThresholds {
    /// HR delta (bpm) at or below which the zone is green
    pub hr_green_max: f64,

    /// HR delta (bpm) at or below which the zone is yellow
    pub hr_yellow_max: f64,

    /// |SpO2 delta| (%) at or below which the zone is green
    pub spo2_green_max: f64,

    /// |SpO2 delta| (%) at or below which the zone is yellow
    pub spo2_yellow_max: f64,

    /// Absolute SpO2 floor; below this the zone is red regardless of delta
    pub spo2_critical_floor: f64,

    /// Composite score floor
    pub composite_floor: f64,

    /// Composite points per yellow zone
    pub composite_yellow_points: f64,

    /// Composite points per red zone
    pub composite_red_points: f64,
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        ZoneThresholds {
            hr_green_max: 4.0,
            hr_yellow_max: 9.0,
            spo2_green_max: 1.0,
            spo2_yellow_max: 3.0,
            spo2_critical_floor: 92.0,
            composite_floor: 10.0,
            composite_yellow_points: 25.0,
            composite_red_points: 40.0,
        }
    }
}

/// Live strain caps and status cutoffs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStrainSettings {
    /// HR rise saturates at this many bpm
    pub hr_rise_cap: f64,

    /// SpO2 drop saturates at this many percentage points
    pub spo2_drop_cap: f64,

    /// Recovery delay saturates at this many seconds
    pub recovery_delay_cap_secs: f64,

    /// HR is considered recovered once within this many bpm of session floor
    pub recovery_margin_bpm: f64,

    /// Score at or below which status is green
    pub green_max: f64,

    /// Score at or below which status is yellow
    pub yellow_max: f64,

    /// Weight of the HR rise term
    pub hr_weight: f64,

    /// Weight of the SpO2 drop term
    pub spo2_weight: f64,

    /// Weight of the recovery delay term
    pub delay_weight: f64,
}

impl Default for LiveStrainSettings {
    fn default() -> Self {
        LiveStrainSettings {
            hr_rise_cap: 60.0,
            spo2_drop_cap: 10.0,
            recovery_delay_cap_secs: 180.0,
            recovery_margin_bpm: 10.0,
            green_max: 85.0,
            yellow_max: 95.0,
            hr_weight: 0.4,
            spo2_weight: 0.3,
            delay_weight: 0.3,
        }
    }
}

/// Fusion confidence weights
///
/// Each metric contributes its weight iff at least one device supplied it,
/// so confidence degrades gracefully with data availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub recovery: f64,
    pub hrv: f64,
    pub strain: f64,
    pub heart_rate: f64,
    pub sleep: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        FusionWeights {
            recovery: 0.30,
            hrv: 0.25,
            strain: 0.20,
            heart_rate: 0.15,
            sleep: 0.10,
        }
    }
}

impl FusionWeights {
    pub fn total(&self) -> f64 {
        self.recovery + self.hrv + self.strain + self.heart_rate + self.sleep
    }
}

/// Automatic deload trigger thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeloadThresholds {
    /// Sessions examined by the deload assessment
    pub window_sessions: usize,

    /// Average completion rate below which deload triggers (with high effort)
    pub completion_max: f64,

    /// Average perceived effort above which deload triggers (with low completion)
    pub effort_min: f64,

    /// Average recovery below which deload triggers on its own
    pub recovery_min: f64,
}

impl Default for DeloadThresholds {
    fn default() -> Self {
        DeloadThresholds {
            window_sessions: 6,
            completion_max: 0.75,
            effort_min: 7.0,
            recovery_min: 40.0,
        }
    }
}

/// Progression analysis thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionSettings {
    /// Default lookback window in days
    pub lookback_days: u32,

    /// Minimum sessions per exercise for a supported decision
    pub min_sessions: usize,

    /// Load increase for rule-1 progression (percent)
    pub load_increase_pct: f64,

    /// Load increase for rule-2 small progression (percent)
    pub small_load_increase_pct: f64,

    /// Load decrease on deload (percent)
    pub deload_decrease_pct: f64,

    /// Review interval after a parameter change (days)
    pub review_after_change_days: i64,

    /// Review interval when holding steady (days)
    pub review_when_holding_days: i64,
}

impl Default for ProgressionSettings {
    fn default() -> Self {
        ProgressionSettings {
            lookback_days: 14,
            min_sessions: 4,
            load_increase_pct: 2.5,
            small_load_increase_pct: 2.0,
            deload_decrease_pct: 5.0,
            review_after_change_days: 7,
            review_when_holding_days: 14,
        }
    }
}

impl EngineConfig {
    /// Validate cross-field invariants; called after every load
    pub fn validate(&self) -> Result<()> {
        if self.buffer.capacity == 0 {
            anyhow::bail!("buffer.capacity must be at least 1");
        }
        if self.zones.hr_green_max >= self.zones.hr_yellow_max {
            anyhow::bail!("zones.hr_green_max must be below zones.hr_yellow_max");
        }
        if self.zones.spo2_green_max >= self.zones.spo2_yellow_max {
            anyhow::bail!("zones.spo2_green_max must be below zones.spo2_yellow_max");
        }
        if self.live.green_max >= self.live.yellow_max {
            anyhow::bail!("live.green_max must be below live.yellow_max");
        }
        let weight_total = self.live.hr_weight + self.live.spo2_weight + self.live.delay_weight;
        if (weight_total - 1.0).abs() > 1e-6 {
            anyhow::bail!("live strain weights must sum to 1.0, got {}", weight_total);
        }
        if (self.fusion.total() - 1.0).abs() > 1e-6 {
            anyhow::bail!("fusion weights must sum to 1.0, got {}", self.fusion.total());
        }
        if self.deload.window_sessions == 0 {
            anyhow::bail!("deload.window_sessions must be at least 1");
        }
        Ok(())
    }

    /// Default on-disk location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("strainrs")
            .join("config.toml")
    }

    /// Load from a TOML file, validating afterwards
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the given path, or defaults if the file does not exist
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::load(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Persist to a TOML file, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }
}
