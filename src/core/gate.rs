//! Stability Gate: sole owner of the held emotional state
//!
//! Two ways in:
//! - Window path: `reinforce` / `erode` count agreement, `emit_if_stable`
//!   emits once the count and the spacing are both satisfied.
//! - Temporal path: `offer` commits a verdict when the update gate
//!   (interval + confidence, or label change) passes, or forces it when
//!   nothing has been output for too long.

use std::time::Instant;

use crate::core::temporal::Verdict;
use crate::types::{clamp_confidence, Decision, EmotionLabel, ReasonCode, StableState};
use crate::{MAX_EMITTED_CONFIDENCE, SMOOTHING_KEEP, STABILITY_EROSION};

/// Timing and confidence rules applied when offering a verdict
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdatePolicy {
    /// Minimum time between timed updates (window: between emissions)
    pub min_update_interval_ms: u64,
    /// Confidence a timed update must exceed
    pub floor: f64,
    /// Confidence a label change must exceed
    pub label_change_floor: f64,
    /// Force output after this long without any; `None` never forces
    pub max_output_interval_ms: Option<u64>,
}

/// Holds the stable state and decides when it is emitted
#[derive(Debug, Default)]
pub struct StabilityGate {
    state: StableState,
    /// Last time anything (including a forced re-emission) went out
    last_output: Option<Instant>,
}

impl StabilityGate {
    /// Create gate with empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> &StableState {
        &self.state
    }

    /// Held label and confidence
    pub fn held(&self) -> Option<(EmotionLabel, f64)> {
        self.state.held()
    }

    /// Clear the held state and output timer
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    // =========================================================================
    // Window path
    // =========================================================================

    /// Dominant label agrees with the held one: count up and smooth confidence
    pub fn reinforce(&mut self, avg_confidence: f64) -> u32 {
        self.state.stability_count += 1;
        self.state.confidence =
            self.state.confidence * SMOOTHING_KEEP + avg_confidence * (1.0 - SMOOTHING_KEEP);
        self.state.stability_count
    }

    /// Dominant label disagrees: erode stability, adopt the newcomer at zero.
    ///
    /// Returns true when `dominant` was adopted.
    pub fn erode(&mut self, dominant: EmotionLabel, avg_confidence: f64) -> bool {
        self.state.stability_count = self.state.stability_count.saturating_sub(STABILITY_EROSION);
        if self.state.stability_count == 0 {
            self.state.label = Some(dominant);
            self.state.confidence = avg_confidence;
            self.state.stability_count = 1;
            true
        } else {
            false
        }
    }

    /// Emit the held state once it is stable and spaced from the last emit
    pub fn emit_if_stable(&mut self, min_count: u32, spacing_ms: u64, now: Instant) -> Option<Decision> {
        let (label, confidence) = self.state.held()?;
        if self.state.stability_count < min_count {
            return None;
        }
        if let Some(since) = self.state.ms_since_update(now) {
            if since < spacing_ms {
                return None;
            }
        }

        self.state.last_updated = Some(now);
        self.last_output = Some(now);
        Some(Decision {
            label,
            confidence: cap(confidence),
            reason: ReasonCode::E005_WINDOW_STABLE,
            forced: false,
        })
    }

    // =========================================================================
    // Temporal path
    // =========================================================================

    /// Commit and emit a verdict if the update gate passes or output is overdue
    pub fn offer(&mut self, verdict: Verdict, policy: &UpdatePolicy, now: Instant) -> Option<Decision> {
        let held = self.state.held();
        let changed = held.map_or(true, |(label, _)| label != verdict.label);

        let interval_elapsed = self
            .state
            .ms_since_update(now)
            .map_or(true, |ms| ms >= policy.min_update_interval_ms);

        let should_update = held.is_none()
            || (interval_elapsed
                && (verdict.confidence > policy.floor
                    || (changed && verdict.confidence > policy.label_change_floor)));
        let forced = !should_update && self.output_due(policy.max_output_interval_ms, now);

        if !should_update && !forced {
            return None;
        }

        if changed {
            self.state.stability_count = 1;
        } else {
            self.state.stability_count += 1;
        }
        self.state.label = Some(verdict.label);
        self.state.confidence = cap(verdict.confidence);
        self.state.last_updated = Some(now);
        self.last_output = Some(now);

        Some(Decision {
            label: verdict.label,
            confidence: self.state.confidence,
            reason: verdict.reason,
            forced,
        })
    }

    /// Re-emit the held state when nothing has gone out for too long
    pub fn force_held(&mut self, max_output_interval_ms: Option<u64>, now: Instant) -> Option<Decision> {
        let (label, confidence) = self.state.held()?;
        if !self.output_due(max_output_interval_ms, now) {
            return None;
        }
        self.last_output = Some(now);
        Some(Decision {
            label,
            confidence: cap(confidence),
            reason: ReasonCode::E006_FORCED_OUTPUT,
            forced: true,
        })
    }

    fn output_due(&self, max_output_interval_ms: Option<u64>, now: Instant) -> bool {
        match (max_output_interval_ms, self.last_output) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(interval), Some(last)) => {
                now.saturating_duration_since(last).as_millis() as u64 >= interval
            }
        }
    }
}

fn cap(confidence: f64) -> f64 {
    clamp_confidence(confidence).min(MAX_EMITTED_CONFIDENCE)
}

// =============================================================================
// TESTS
// =============================================================================
