//! Emotion Engine: configuration + stabilizer + gate
//!
//! Push-mode entry point. The processing loop drives one of these, and
//! the interactive CLI and HTTP sessions use it the same way.
//!
//! Resets:
//! - full (`reset`): history, held state, output timer, active floor
//! - soft (`soft_reset`): history only; floor relaxed for recovery

use std::time::Instant;

use crate::core::gate::{StabilityGate, UpdatePolicy};
use crate::core::stabilizer::{build_stabilizer, Stabilizer};
use crate::types::{
    ConfigOverrides, EmotionSample, Emission, EngineConfig, EngineResult, StableState,
};

/// Parameterized stabilization engine
#[derive(Debug)]
pub struct EmotionEngine {
    config: EngineConfig,
    stabilizer: Box<dyn Stabilizer>,
    gate: StabilityGate,
    /// Update floor in effect; relaxed after a soft reset
    active_floor: f64,
    session_id: Option<String>,
    /// Samples observed since the last full reset
    observed: u64,
}

impl Default for EmotionEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl EmotionEngine {
    /// Create engine from a configuration
    pub fn new(config: EngineConfig) -> Self {
        Self {
            stabilizer: build_stabilizer(&config),
            gate: StabilityGate::new(),
            active_floor: config.confidence_floor,
            session_id: None,
            observed: 0,
            config,
        }
    }

    /// Create engine after validating the configuration
    pub fn try_new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &StableState {
        self.gate.state()
    }

    pub fn active_floor(&self) -> f64 {
        self.active_floor
    }

    pub fn buffered(&self) -> usize {
        self.stabilizer.len()
    }

    pub fn observed(&self) -> u64 {
        self.observed
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Tag emissions with a session id
    pub fn set_session(&mut self, session_id: Option<String>) {
        self.session_id = session_id;
    }

    fn policy(&self) -> UpdatePolicy {
        UpdatePolicy {
            min_update_interval_ms: self.config.min_update_interval_ms,
            floor: self.active_floor,
            label_change_floor: self.config.label_change_floor,
            max_output_interval_ms: self.config.max_output_interval_ms,
        }
    }

    /// Feed one classification; returns an emission if one goes out
    pub fn observe(&mut self, sample: EmotionSample, now: Instant) -> Option<Emission> {
        self.observed += 1;
        let policy = self.policy();
        let decision = self.stabilizer.evaluate(&sample, &mut self.gate, &policy, now)?;

        tracing::debug!(
            label = %decision.label,
            confidence = decision.confidence,
            reason = %decision.reason,
            forced = decision.forced,
            "emission"
        );
        Some(Emission::new(decision, self.config.modality, self.session_id.clone()))
    }

    /// Re-emit the held state if output is overdue
    pub fn force_output(&mut self, now: Instant) -> Option<Emission> {
        let decision = self.gate.force_held(self.config.max_output_interval_ms, now)?;
        tracing::debug!(label = %decision.label, "forced re-emission");
        Some(Emission::new(decision, self.config.modality, self.session_id.clone()))
    }

    /// Full reset: history, held state and active floor
    pub fn reset(&mut self) {
        self.stabilizer.reset();
        self.gate.reset();
        self.active_floor = self.config.confidence_floor;
        self.observed = 0;
    }

    /// Soft reset: history only, relaxed floor until the next full reset
    pub fn soft_reset(&mut self) {
        self.stabilizer.reset();
        self.active_floor = self.config.recovery_confidence_floor;
    }

    /// Apply overrides. A strategy change rebuilds the stabilizer and
    /// fully resets; otherwise buffered samples and held state are kept.
    pub fn configure(&mut self, overrides: &ConfigOverrides) -> EngineResult<()> {
        let config = overrides.apply(&self.config)?;
        let rebuild = config.strategy != self.config.strategy;
        let floor_changed = config.confidence_floor != self.config.confidence_floor;
        self.config = config;

        if rebuild {
            self.stabilizer = build_stabilizer(&self.config);
            self.reset();
        } else {
            self.stabilizer.reconfigure(&self.config);
            if floor_changed {
                self.active_floor = self.config.confidence_floor;
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
