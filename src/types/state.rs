//! Stable state and loop phase definitions

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::types::EmotionLabel;

/// The currently held ("stable") emotion.
///
/// Mutated only by `StabilityGate`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StableState {
    /// Held label, `None` until the first adoption
    pub label: Option<EmotionLabel>,
    /// Held confidence
    pub confidence: f64,
    /// When the held state was last emitted or committed
    pub last_updated: Option<Instant>,
    /// Consecutive agreeing evaluations
    pub stability_count: u32,
}

impl StableState {
    /// Empty state (no label)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_none()
    }

    /// Held label and confidence, if any
    pub fn held(&self) -> Option<(EmotionLabel, f64)> {
        self.label.map(|label| (label, self.confidence))
    }

    /// Milliseconds since `last_updated`, `None` if never updated
    pub fn ms_since_update(&self, now: Instant) -> Option<u64> {
        self.last_updated
            .map(|t| now.saturating_duration_since(t).as_millis() as u64)
    }
}

/// The two states of a processing loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopPhase {
    /// Session inactive or prerequisites unmet
    #[default]
    Idle,
    /// Actively sampling
    Running,
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopPhase::Idle => "IDLE",
            LoopPhase::Running => "RUNNING",
        };
        write!(f, "{}", name)
    }
}
