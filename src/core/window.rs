//! Sliding Window Buffer: per-utterance stabilization
//!
//! Fixed-capacity FIFO of accepted samples, voted with quadratic
//! recency weights `((i+1)/N)^2`. Stability is counted in the gate:
//! agreement reinforces, disagreement erodes by two.

use std::collections::VecDeque;
use std::time::Instant;

use crate::core::gate::StabilityGate;
use crate::types::{tally, Decision, EmotionLabel, EmotionSample, EngineConfig};
use crate::{MIN_STABILITY_COUNT, WINDOW_CAPACITY, WINDOW_CONFIDENCE_FLOOR, WINDOW_MIN_FILL};

/// Window bounds and thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSettings {
    pub capacity: usize,
    pub min_fill: usize,
    /// Exclusive acceptance floor
    pub confidence_floor: f64,
    pub min_stability_count: u32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            capacity: WINDOW_CAPACITY,
            min_fill: WINDOW_MIN_FILL,
            confidence_floor: WINDOW_CONFIDENCE_FLOOR,
            min_stability_count: MIN_STABILITY_COUNT,
        }
    }
}

impl From<&EngineConfig> for WindowSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            capacity: config.window_capacity,
            min_fill: config.min_window_fill,
            confidence_floor: config.confidence_floor,
            min_stability_count: config.min_stability_count,
        }
    }
}

/// Quadratic-recency sliding window
#[derive(Debug, Clone)]
pub struct SlidingWindowBuffer {
    samples: VecDeque<EmotionSample>,
    settings: WindowSettings,
}

impl Default for SlidingWindowBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SlidingWindowBuffer {
    pub fn new() -> Self {
        Self::with_settings(WindowSettings::default())
    }

    pub fn with_settings(settings: WindowSettings) -> Self {
        Self {
            samples: VecDeque::with_capacity(settings.capacity + 1),
            settings,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_settings(WindowSettings::from(config))
    }

    pub fn settings(&self) -> &WindowSettings {
        &self.settings
    }

    /// Adopt new settings; a smaller capacity evicts immediately
    pub fn reconfigure(&mut self, config: &EngineConfig) {
        self.settings = WindowSettings::from(config);
        self.evict();
    }

    /// Accept a sample strictly above the floor.
    ///
    /// Returns false when the sample was dropped.
    pub fn add(&mut self, label: EmotionLabel, confidence: f64) -> bool {
        self.push(EmotionSample::new(label, confidence))
    }

    /// Accept an already timestamped sample strictly above the floor
    pub fn push(&mut self, sample: EmotionSample) -> bool {
        if sample.confidence <= self.settings.confidence_floor {
            return false;
        }
        self.samples.push_back(sample);
        self.evict();
        true
    }

    fn evict(&mut self) {
        while self.samples.len() > self.settings.capacity {
            self.samples.pop_front();
        }
    }

    /// Dominant label and its mean confidence, once the window is filled
    pub fn dominant(&self) -> Option<(EmotionLabel, f64)> {
        if self.samples.len() < self.settings.min_fill {
            return None;
        }

        let scores = tally(self.samples.iter(), |i, n, sample| {
            let recency = (i + 1) as f64 / n as f64;
            sample.confidence * recency * recency
        });

        let mut best: Option<(EmotionLabel, f64, f64)> = None;
        for (label, score) in scores {
            if best.map_or(true, |(_, top, _)| score.weighted_score > top) {
                best = Some((label, score.weighted_score, score.avg_confidence()));
            }
        }
        best.map(|(label, _, avg)| (label, avg))
    }

    /// Vote, update stability through the gate, emit once stable and spaced
    pub fn evaluate(&self, gate: &mut StabilityGate, spacing_ms: u64, now: Instant) -> Option<Decision> {
        let (dominant, avg) = self.dominant()?;

        match gate.held() {
            Some((held, _)) if held == dominant => {
                let count = gate.reinforce(avg);
                tracing::debug!(label = %dominant, count, "window reinforced");
                gate.emit_if_stable(self.settings.min_stability_count, spacing_ms, now)
            }
            _ => {
                if gate.erode(dominant, avg) {
                    tracing::debug!(label = %dominant, "window adopted new label");
                }
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Clear buffered samples
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
