//! Output structures for consumers and terminal display

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::types::{EmotionLabel, Modality, ReasonCode};

/// What the gate decided to emit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub label: EmotionLabel,
    pub confidence: f64,
    pub reason: ReasonCode,
    /// Emitted because the output interval elapsed, not because it passed the update gate
    pub forced: bool,
}

/// Immutable snapshot handed to consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emission {
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Stabilized label
    pub label: EmotionLabel,
    /// Stabilized confidence, never above the emission cap
    pub confidence: f64,
    /// Which stream produced it
    pub modality: Modality,
    /// Reason for the emitted state
    pub reason: ReasonCode,
    /// Re-emission after the output interval
    pub forced: bool,
    /// Session that produced it
    pub session_id: Option<String>,
}

impl Emission {
    /// Create new emission stamped now
    pub fn new(decision: Decision, modality: Modality, session_id: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            label: decision.label,
            confidence: decision.confidence,
            modality,
            reason: decision.reason,
            forced: decision.forced,
            session_id,
        }
    }

    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let line = format!(
            "{} {} ({:.0}%) | {} | {}{}",
            self.label.emoji(),
            self.label.as_str().to_uppercase(),
            self.confidence * 100.0,
            self.modality,
            self.reason.code(),
            if self.forced { " [FORCED]" } else { "" },
        );
        line.color(self.label.color()).to_string()
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "label={} | confidence={:.3} | modality={} | reason={} | forced={}",
            self.label,
            self.confidence,
            self.modality,
            self.reason.code(),
            self.forced
        )
    }
}
