//! Emotion samples and per-label aggregates

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::types::EmotionLabel;

/// One classification from the sample source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionSample {
    pub label: EmotionLabel,
    /// Always within [0, 1]
    pub confidence: f64,
    pub timestamp: Instant,
}

impl EmotionSample {
    /// Create a sample stamped with the current instant
    pub fn new(label: EmotionLabel, confidence: f64) -> Self {
        Self::at(label, confidence, Instant::now())
    }

    /// Create a sample stamped with `timestamp`
    pub fn at(label: EmotionLabel, confidence: f64, timestamp: Instant) -> Self {
        Self {
            label,
            confidence: clamp_confidence(confidence),
            timestamp,
        }
    }

    /// Age in milliseconds relative to `now` (0 for future stamps)
    pub fn age_ms(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.timestamp).as_millis() as u64
    }
}

/// Clamp into [0, 1]; NaN becomes 0
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Wire form of a sample (no timestamp; stamped on arrival)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleInput {
    pub label: EmotionLabel,
    pub confidence: f64,
}

impl SampleInput {
    pub fn into_sample(self, now: Instant) -> EmotionSample {
        EmotionSample::at(self.label, self.confidence, now)
    }
}

/// Per-label accumulator, rebuilt on every evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggregateScore {
    pub count: usize,
    pub total_confidence: f64,
    pub weighted_score: f64,
}

impl AggregateScore {
    pub fn add(&mut self, confidence: f64, weight: f64) {
        self.count += 1;
        self.total_confidence += confidence;
        self.weighted_score += weight;
    }

    /// Mean raw confidence (0 when empty)
    pub fn avg_confidence(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_confidence / self.count as f64
        }
    }
}

/// Tally samples per label in first-seen order.
///
/// `weight(i, n, sample)` is the contribution of the i-th oldest of n samples.
pub fn tally<'a, I, W>(samples: I, weight: W) -> Vec<(EmotionLabel, AggregateScore)>
where
    I: ExactSizeIterator<Item = &'a EmotionSample>,
    W: Fn(usize, usize, &EmotionSample) -> f64,
{
    let n = samples.len();
    let mut scores: Vec<(EmotionLabel, AggregateScore)> = Vec::new();

    for (i, sample) in samples.enumerate() {
        let w = weight(i, n, sample);
        match scores.iter_mut().find(|(label, _)| *label == sample.label) {
            Some((_, score)) => score.add(sample.confidence, w),
            None => {
                let mut score = AggregateScore::default();
                score.add(sample.confidence, w);
                scores.push((sample.label, score));
            }
        }
    }

    scores
}
