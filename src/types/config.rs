//! Engine configuration
//!
//! Two presets exist, one per modality. `ConfigOverrides` is the
//! consumer-facing `configure(options)` shape: every field optional,
//! applied on top of a preset and validated before use.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{EngineError, EngineResult};
use crate::{
    CADENCE_DESKTOP_MS, CADENCE_MOBILE_MS, HISTORY_MAX_AGE_MS, HISTORY_MAX_LEN,
    LABEL_CHANGE_FLOOR, MAX_CONSECUTIVE_FAILURES, MIN_STABILITY_COUNT,
    RECOVERY_CONFIDENCE_FLOOR, SAMPLE_TIMEOUT_DESKTOP_MS, SAMPLE_TIMEOUT_MOBILE_MS,
    UPDATE_CONFIDENCE_FLOOR, VIDEO_MAX_OUTPUT_INTERVAL_MS, VIDEO_MIN_UPDATE_INTERVAL_MS,
    WATCHDOG_MS, WINDOW_CAPACITY, WINDOW_CONFIDENCE_FLOOR, WINDOW_EMIT_INTERVAL_MS,
    WINDOW_MIN_FILL,
};

/// Input stream kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Continuous per-frame samples
    Video,
    /// Discrete per-utterance samples
    Audio,
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modality::Video => write!(f, "video"),
            Modality::Audio => write!(f, "audio"),
        }
    }
}

/// Device class, only affects loop cadence and timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    #[default]
    Desktop,
    Mobile,
}

/// Stabilization strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilizerKind {
    /// Time-bounded history with hysteresis
    Temporal,
    /// Fixed-capacity buffer with stability counting
    Window,
}

/// Label-specific corrections of the temporal stabilizer.
///
/// Empirically tuned for the current label set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasConfig {
    /// Flat bonus added to neutral's weighted count
    pub neutral_bonus: f64,
    /// Multiplier on confused's weighted count
    pub confused_penalty: f64,
    /// Fraction of the held confidence needed to leave neutral
    pub neutral_exit_ratio: f64,
    /// Fraction of the held confidence needed to switch between non-neutral labels
    pub switch_ratio: f64,
    /// Raw happy samples in history needed for the happy override
    pub happy_override_min_count: usize,
    /// Confused below this average never replaces a held label
    pub confused_min_confidence: f64,
    /// Complex emotions above this average override a held label
    pub complex_min_confidence: f64,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            neutral_bonus: 0.3,
            confused_penalty: 0.8,
            neutral_exit_ratio: 0.45,
            switch_ratio: 0.65,
            happy_override_min_count: 2,
            confused_min_confidence: 0.7,
            complex_min_confidence: 0.5,
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub modality: Modality,
    pub strategy: StabilizerKind,
    /// Buffer capacity (window) or history length (temporal)
    pub window_capacity: usize,
    /// Samples required before the window votes
    pub min_window_fill: usize,
    /// Oldest history entry kept (temporal)
    pub max_history_age_ms: u64,
    /// Agreeing evaluations required before a window emission
    pub min_stability_count: u32,
    /// Window: spacing between emissions. Temporal: spacing between timed updates.
    pub min_update_interval_ms: u64,
    /// Held state is re-emitted after this long without output; `None` disables
    pub max_output_interval_ms: Option<u64>,
    /// Window: samples at or below are discarded. Temporal: timed updates need more.
    pub confidence_floor: f64,
    /// Temporal: a changed label passes the update gate above this confidence
    pub label_change_floor: f64,
    /// Temporal: update floor used after a failure-driven reset
    pub recovery_confidence_floor: f64,
    /// Loop tick cadence
    pub cadence_ms: u64,
    /// Per-call sample source timeout
    pub sample_timeout_ms: u64,
    /// Consecutive misses before stabilizer history is dropped; `None` disables
    pub max_consecutive_failures: Option<u32>,
    /// Time without success before a full reset; `None` disables
    pub watchdog_ms: Option<u64>,
    pub bias: BiasConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::video(DeviceClass::Desktop)
    }
}

impl EngineConfig {
    /// Per-frame video preset
    pub fn video(device: DeviceClass) -> Self {
        let (cadence_ms, sample_timeout_ms) = match device {
            DeviceClass::Desktop => (CADENCE_DESKTOP_MS, SAMPLE_TIMEOUT_DESKTOP_MS),
            DeviceClass::Mobile => (CADENCE_MOBILE_MS, SAMPLE_TIMEOUT_MOBILE_MS),
        };
        Self {
            modality: Modality::Video,
            strategy: StabilizerKind::Temporal,
            window_capacity: HISTORY_MAX_LEN,
            min_window_fill: 1,
            max_history_age_ms: HISTORY_MAX_AGE_MS,
            min_stability_count: MIN_STABILITY_COUNT,
            min_update_interval_ms: VIDEO_MIN_UPDATE_INTERVAL_MS,
            max_output_interval_ms: Some(VIDEO_MAX_OUTPUT_INTERVAL_MS),
            confidence_floor: UPDATE_CONFIDENCE_FLOOR,
            label_change_floor: LABEL_CHANGE_FLOOR,
            recovery_confidence_floor: RECOVERY_CONFIDENCE_FLOOR,
            cadence_ms,
            sample_timeout_ms,
            max_consecutive_failures: Some(MAX_CONSECUTIVE_FAILURES),
            watchdog_ms: Some(WATCHDOG_MS),
            bias: BiasConfig::default(),
        }
    }

    /// Per-utterance audio preset.
    ///
    /// Silence between utterances is the normal case, so misses never
    /// reset the window.
    pub fn audio() -> Self {
        Self {
            modality: Modality::Audio,
            strategy: StabilizerKind::Window,
            window_capacity: WINDOW_CAPACITY,
            min_window_fill: WINDOW_MIN_FILL,
            max_history_age_ms: HISTORY_MAX_AGE_MS,
            min_stability_count: MIN_STABILITY_COUNT,
            min_update_interval_ms: WINDOW_EMIT_INTERVAL_MS,
            max_output_interval_ms: None,
            confidence_floor: WINDOW_CONFIDENCE_FLOOR,
            label_change_floor: LABEL_CHANGE_FLOOR,
            recovery_confidence_floor: WINDOW_CONFIDENCE_FLOOR,
            cadence_ms: CADENCE_DESKTOP_MS,
            sample_timeout_ms: SAMPLE_TIMEOUT_DESKTOP_MS,
            max_consecutive_failures: None,
            watchdog_ms: None,
            bias: BiasConfig::default(),
        }
    }

    /// Preset for a modality
    pub fn for_modality(modality: Modality, device: DeviceClass) -> Self {
        match modality {
            Modality::Video => Self::video(device),
            Modality::Audio => Self::audio(),
        }
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> EngineResult<()> {
        for (name, value) in [
            ("confidence_floor", self.confidence_floor),
            ("label_change_floor", self.label_change_floor),
            ("recovery_confidence_floor", self.recovery_confidence_floor),
            ("bias.confused_penalty", self.bias.confused_penalty),
            ("bias.confused_min_confidence", self.bias.confused_min_confidence),
            ("bias.complex_min_confidence", self.bias.complex_min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.window_capacity < 1 {
            return Err(EngineError::Config(format!(
                "window_capacity must be >= 1, got {}",
                self.window_capacity
            )));
        }
        if self.min_window_fill < 1 || self.min_window_fill > self.window_capacity {
            return Err(EngineError::Config(format!(
                "min_window_fill must be in [1, window_capacity={}], got {}",
                self.window_capacity, self.min_window_fill
            )));
        }
        if self.min_stability_count < 1 {
            return Err(EngineError::Config(
                "min_stability_count must be >= 1".to_string(),
            ));
        }
        if self.max_history_age_ms == 0 {
            return Err(EngineError::Config(
                "max_history_age_ms must be > 0".to_string(),
            ));
        }
        if self.cadence_ms == 0 || self.sample_timeout_ms == 0 || self.watchdog_ms == Some(0) {
            return Err(EngineError::Config(
                "cadence_ms, sample_timeout_ms and watchdog_ms must be > 0".to_string(),
            ));
        }
        if self.max_consecutive_failures == Some(0) {
            return Err(EngineError::Config(
                "max_consecutive_failures must be >= 1".to_string(),
            ));
        }
        if self.bias.neutral_bonus < 0.0
            || self.bias.neutral_exit_ratio < 0.0
            || self.bias.switch_ratio < 0.0
        {
            return Err(EngineError::Config(
                "bias bonuses and ratios must be >= 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Partial configuration accepted by `configure`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub window_capacity: Option<usize>,
    pub max_history_age_ms: Option<u64>,
    pub min_stability_count: Option<u32>,
    pub min_update_interval_ms: Option<u64>,
    pub max_output_interval_ms: Option<u64>,
    pub confidence_floor: Option<f64>,
    pub strategy: Option<StabilizerKind>,
    pub min_window_fill: Option<usize>,
    pub label_change_floor: Option<f64>,
    pub recovery_confidence_floor: Option<f64>,
    pub cadence_ms: Option<u64>,
    pub sample_timeout_ms: Option<u64>,
    pub max_consecutive_failures: Option<u32>,
    pub watchdog_ms: Option<u64>,
    pub bias: Option<BiasConfig>,
}

impl ConfigOverrides {
    /// Parse overrides from JSON
    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply on top of `base` and validate the result
    pub fn apply(&self, base: &EngineConfig) -> EngineResult<EngineConfig> {
        let mut config = base.clone();
        if let Some(v) = self.window_capacity {
            config.window_capacity = v;
            // keep the fill requirement satisfiable when only capacity shrinks
            if self.min_window_fill.is_none() {
                config.min_window_fill = config.min_window_fill.min(v.max(1));
            }
        }
        if let Some(v) = self.max_history_age_ms {
            config.max_history_age_ms = v;
        }
        if let Some(v) = self.min_stability_count {
            config.min_stability_count = v;
        }
        if let Some(v) = self.min_update_interval_ms {
            config.min_update_interval_ms = v;
        }
        if let Some(v) = self.max_output_interval_ms {
            config.max_output_interval_ms = if v == 0 { None } else { Some(v) };
        }
        if let Some(v) = self.confidence_floor {
            config.confidence_floor = v;
        }
        if let Some(v) = self.strategy {
            config.strategy = v;
        }
        if let Some(v) = self.min_window_fill {
            config.min_window_fill = v;
        }
        if let Some(v) = self.label_change_floor {
            config.label_change_floor = v;
        }
        if let Some(v) = self.recovery_confidence_floor {
            config.recovery_confidence_floor = v;
        }
        if let Some(v) = self.cadence_ms {
            config.cadence_ms = v;
        }
        if let Some(v) = self.sample_timeout_ms {
            config.sample_timeout_ms = v;
        }
        if let Some(v) = self.max_consecutive_failures {
            config.max_consecutive_failures = if v == 0 { None } else { Some(v) };
        }
        if let Some(v) = self.watchdog_ms {
            config.watchdog_ms = if v == 0 { None } else { Some(v) };
        }
        if let Some(v) = self.bias {
            config.bias = v;
        }
        config.validate()?;
        Ok(config)
    }
}
