//! Temporal Stabilizer: weighted voting over a short history with hysteresis
//!
//! Voting weight of the i-th oldest of N entries:
//!   (1 + i/(N-1)) * (1 + 0.5 * confidence)
//! Neutral gets a flat bonus, confused a multiplicative penalty.
//!
//! Hysteresis against the held state:
//! - nothing held        → take dominant (first detection boost)
//! - same label          → reinforce (cap 0.98)
//! - held is neutral     → lowered bar (0.45x held confidence, or happy)
//! - otherwise           → higher bar (0.65x), then narrow overrides

use std::time::Instant;

use crate::core::history::HistoryWindow;
use crate::types::{tally, BiasConfig, EmotionLabel, EmotionSample, EngineConfig, ReasonCode};
use crate::{
    COMPLEX_OVERRIDE_BOOST, COMPLEX_OVERRIDE_CAP, CONFIDENCE_WEIGHT_FACTOR,
    FIRST_DETECTION_BOOST, FIRST_DETECTION_CAP, HAPPY_OVERRIDE_BOOST, HAPPY_OVERRIDE_CAP,
    NEUTRAL_EXIT_BOOST, NEUTRAL_EXIT_CAP, REINFORCE_BOOST, REINFORCE_CAP, SWITCH_BOOST,
    SWITCH_CAP,
};

/// Outcome of one temporal evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub label: EmotionLabel,
    pub confidence: f64,
    pub reason: ReasonCode,
}

/// Dominant label of the current history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dominant {
    pub label: EmotionLabel,
    /// Mean raw confidence of the dominant label
    pub avg_confidence: f64,
    /// Raw sample count of the dominant label
    pub count: usize,
    /// Weighted count after bias corrections
    pub weighted_count: f64,
}

/// Temporal stabilizer over a bounded history
#[derive(Debug, Clone)]
pub struct TemporalStabilizer {
    history: HistoryWindow,
    bias: BiasConfig,
}

impl Default for TemporalStabilizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporalStabilizer {
    /// Create with default history bounds and bias
    pub fn new() -> Self {
        Self {
            history: HistoryWindow::new(),
            bias: BiasConfig::default(),
        }
    }

    /// Create from engine configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            history: HistoryWindow::with_bounds(config.max_history_age_ms, config.window_capacity),
            bias: config.bias,
        }
    }

    /// Adopt new bounds and bias, keeping the history
    pub fn reconfigure(&mut self, config: &EngineConfig) {
        self.history
            .set_bounds(config.max_history_age_ms, config.window_capacity);
        self.bias = config.bias;
    }

    /// Record a new classification and decide against `current`
    pub fn evaluate(
        &mut self,
        label: EmotionLabel,
        confidence: f64,
        current: Option<(EmotionLabel, f64)>,
        now: Instant,
    ) -> Verdict {
        self.history.push(EmotionSample::at(label, confidence, now), now);

        // never empty: we just pushed and a fresh entry survives pruning
        let dominant = self.dominant().unwrap_or(Dominant {
            label,
            avg_confidence: confidence,
            count: 1,
            weighted_count: 0.0,
        });

        self.hysteresis(dominant, current)
    }

    /// Weighted vote over the history
    pub fn dominant(&self) -> Option<Dominant> {
        let scores = tally(self.history.iter(), |i, n, sample| {
            let recency = 1.0 + i as f64 / (n.saturating_sub(1).max(1)) as f64;
            let confidence_weight = 1.0 + sample.confidence * CONFIDENCE_WEIGHT_FACTOR;
            recency * confidence_weight
        });

        let mut best: Option<(Dominant, f64)> = None;
        for (label, score) in scores {
            let weighted = match label {
                EmotionLabel::Neutral => score.weighted_score + self.bias.neutral_bonus,
                EmotionLabel::Confused => score.weighted_score * self.bias.confused_penalty,
                _ => score.weighted_score,
            };
            let better = match &best {
                None => true,
                Some((current, total)) => {
                    weighted > current.weighted_count
                        || (weighted == current.weighted_count && score.total_confidence > *total)
                }
            };
            if better {
                best = Some((
                    Dominant {
                        label,
                        avg_confidence: score.avg_confidence(),
                        count: score.count,
                        weighted_count: weighted,
                    },
                    score.total_confidence,
                ));
            }
        }

        best.map(|(dominant, _)| dominant)
    }

    /// Apply switching rules to a dominant label
    pub fn hysteresis(&self, dominant: Dominant, current: Option<(EmotionLabel, f64)>) -> Verdict {
        let avg = dominant.avg_confidence;
        let propose = |label, boost: f64, cap: f64, reason| Verdict {
            label,
            confidence: (avg * boost).min(cap),
            reason,
        };

        let Some((held_label, held_confidence)) = current else {
            return propose(
                dominant.label,
                FIRST_DETECTION_BOOST,
                FIRST_DETECTION_CAP,
                ReasonCode::E001_FIRST_DETECTION,
            );
        };
        let hold = |reason| Verdict {
            label: held_label,
            confidence: held_confidence,
            reason,
        };

        if dominant.label == held_label {
            return propose(dominant.label, REINFORCE_BOOST, REINFORCE_CAP, ReasonCode::E001_REINFORCED);
        }

        if held_label == EmotionLabel::Neutral {
            if avg > held_confidence * self.bias.neutral_exit_ratio
                || dominant.label == EmotionLabel::Happy
            {
                return propose(dominant.label, NEUTRAL_EXIT_BOOST, NEUTRAL_EXIT_CAP, ReasonCode::E002_NEUTRAL_EXIT);
            }
            return hold(ReasonCode::E004_HELD);
        }

        if avg > held_confidence * self.bias.switch_ratio {
            return propose(dominant.label, SWITCH_BOOST, SWITCH_CAP, ReasonCode::E002_SWITCHED);
        }

        if dominant.label == EmotionLabel::Happy && dominant.count >= self.bias.happy_override_min_count {
            return propose(EmotionLabel::Happy, HAPPY_OVERRIDE_BOOST, HAPPY_OVERRIDE_CAP, ReasonCode::E003_HAPPY_OVERRIDE);
        }

        if dominant.label == EmotionLabel::Confused && avg < self.bias.confused_min_confidence {
            return hold(ReasonCode::E003_CONFUSED_RESISTED);
        }

        if dominant.label.is_complex()
            && dominant.label != EmotionLabel::Confused
            && avg > self.bias.complex_min_confidence
        {
            return propose(dominant.label, COMPLEX_OVERRIDE_BOOST, COMPLEX_OVERRIDE_CAP, ReasonCode::E003_COMPLEX_OVERRIDE);
        }

        hold(ReasonCode::E004_HELD)
    }

    /// Number of entries in history
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Clear history only; the held state belongs to the gate
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
