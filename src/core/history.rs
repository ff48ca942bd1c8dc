//! History window for temporal voting
//!
//! - Bounded by age (default 7 s) and count (default 5)
//! - Oldest entries are discarded first
//! - Pruned on every push

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::types::EmotionSample;
use crate::{HISTORY_MAX_AGE_MS, HISTORY_MAX_LEN};

/// Time- and count-bounded sample history
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    entries: VecDeque<EmotionSample>,
    max_age: Duration,
    max_len: usize,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryWindow {
    /// Create window with default bounds (7 s, 5 entries)
    pub fn new() -> Self {
        Self::with_bounds(HISTORY_MAX_AGE_MS, HISTORY_MAX_LEN)
    }

    /// Create window with custom bounds
    pub fn with_bounds(max_age_ms: u64, max_len: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_len + 1),
            max_age: Duration::from_millis(max_age_ms),
            max_len,
        }
    }

    /// Change bounds; takes effect at the next prune
    pub fn set_bounds(&mut self, max_age_ms: u64, max_len: usize) {
        self.max_age = Duration::from_millis(max_age_ms);
        self.max_len = max_len;
    }

    /// Add a sample and prune
    pub fn push(&mut self, sample: EmotionSample, now: Instant) {
        self.entries.push_back(sample);
        self.prune(now);
    }

    /// Drop entries older than the age bound, then keep the newest `max_len`
    pub fn prune(&mut self, now: Instant) {
        self.entries
            .retain(|entry| now.saturating_duration_since(entry.timestamp) <= self.max_age);

        while self.entries.len() > self.max_len {
            self.entries.pop_front();
        }
    }

    /// Entries, oldest first
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &EmotionSample> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EmotionLabel;

    #[test]
    fn test_push_and_len() {
        let now = Instant::now();
        let mut history = HistoryWindow::new();
        assert!(history.is_empty());

        history.push(EmotionSample::at(EmotionLabel::Happy, 0.8, now), now);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_count_bound_keeps_newest() {
        let now = Instant::now();
        let mut history = HistoryWindow::with_bounds(7000, 3);
        for label in [
            EmotionLabel::Happy,
            EmotionLabel::Sad,
            EmotionLabel::Angry,
            EmotionLabel::Calm,
        ] {
            history.push(EmotionSample::at(label, 0.5, now), now);
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().next().unwrap().label, EmotionLabel::Sad);
    }

    #[test]
    fn test_age_bound_prunes_old() {
        let t0 = Instant::now();
        let mut history = HistoryWindow::with_bounds(1000, 5);
        history.push(EmotionSample::at(EmotionLabel::Sad, 0.5, t0), t0);

        // exactly at the bound is kept
        let edge = t0 + Duration::from_millis(1000);
        history.push(EmotionSample::at(EmotionLabel::Happy, 0.5, edge), edge);
        assert_eq!(history.len(), 2);

        let later = t0 + Duration::from_millis(1001);
        history.push(EmotionSample::at(EmotionLabel::Happy, 0.5, later), later);
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|s| s.label == EmotionLabel::Happy));
    }

    #[test]
    fn test_bounds_hold_after_every_push() {
        let t0 = Instant::now();
        let mut history = HistoryWindow::with_bounds(700, 4);
        for step in 0..20u64 {
            let now = t0 + Duration::from_millis(step * 150);
            history.push(EmotionSample::at(EmotionLabel::Neutral, 0.5, now), now);
            assert!(history.len() <= 4);
            assert!(history.iter().all(|s| s.age_ms(now) <= 700));
        }
    }
}
