//! Stabilizer strategies behind one interface
//!
//! - `Temporal`: history voting + hysteresis, committed by `gate.offer`
//! - `Window`: quadratic window voting, stability counted in the gate

use std::fmt::Debug;
use std::time::Instant;

use crate::core::gate::{StabilityGate, UpdatePolicy};
use crate::core::temporal::TemporalStabilizer;
use crate::core::window::SlidingWindowBuffer;
use crate::types::{Decision, EmotionSample, EngineConfig, StabilizerKind};

/// A stabilization strategy
pub trait Stabilizer: Send + Debug {
    /// Feed one sample; returns a decision when the gate lets one through
    fn evaluate(
        &mut self,
        sample: &EmotionSample,
        gate: &mut StabilityGate,
        policy: &UpdatePolicy,
        now: Instant,
    ) -> Option<Decision>;

    /// Clear buffered samples (held state lives in the gate)
    fn reset(&mut self);

    /// Adopt new bounds and thresholds
    fn reconfigure(&mut self, config: &EngineConfig);

    /// Buffered sample count
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> StabilizerKind;
}

impl Stabilizer for TemporalStabilizer {
    fn evaluate(
        &mut self,
        sample: &EmotionSample,
        gate: &mut StabilityGate,
        policy: &UpdatePolicy,
        now: Instant,
    ) -> Option<Decision> {
        let verdict = TemporalStabilizer::evaluate(self, sample.label, sample.confidence, gate.held(), now);
        tracing::debug!(
            label = %verdict.label,
            confidence = verdict.confidence,
            reason = %verdict.reason,
            "temporal verdict"
        );
        gate.offer(verdict, policy, now)
    }

    fn reset(&mut self) {
        TemporalStabilizer::reset(self);
    }

    fn reconfigure(&mut self, config: &EngineConfig) {
        TemporalStabilizer::reconfigure(self, config);
    }

    fn len(&self) -> usize {
        TemporalStabilizer::len(self)
    }

    fn kind(&self) -> StabilizerKind {
        StabilizerKind::Temporal
    }
}

impl Stabilizer for SlidingWindowBuffer {
    fn evaluate(
        &mut self,
        sample: &EmotionSample,
        gate: &mut StabilityGate,
        policy: &UpdatePolicy,
        now: Instant,
    ) -> Option<Decision> {
        if !self.push(*sample) {
            tracing::debug!(label = %sample.label, confidence = sample.confidence, "below window floor");
        }
        SlidingWindowBuffer::evaluate(self, gate, policy.min_update_interval_ms, now)
    }

    fn reset(&mut self) {
        SlidingWindowBuffer::reset(self);
    }

    fn reconfigure(&mut self, config: &EngineConfig) {
        SlidingWindowBuffer::reconfigure(self, config);
    }

    fn len(&self) -> usize {
        SlidingWindowBuffer::len(self)
    }

    fn kind(&self) -> StabilizerKind {
        StabilizerKind::Window
    }
}

/// Build the strategy named by the configuration
pub fn build_stabilizer(config: &EngineConfig) -> Box<dyn Stabilizer> {
    match config.strategy {
        StabilizerKind::Temporal => Box::new(TemporalStabilizer::from_config(config)),
        StabilizerKind::Window => Box::new(SlidingWindowBuffer::from_config(config)),
    }
}

// =============================================================================
// TESTS
// =============================================================================
