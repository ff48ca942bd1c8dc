//! Sample sources: where raw classifications come from
//!
//! - `ChannelSource`: queue fed by producers (HTTP, stdin); empty = miss
//! - `ScriptedSource`: JSON-lines replay with optional per-entry delay
//!
//! Samples are stamped with the tokio clock so paused-time tests and the
//! loop agree on `now`.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{EmotionLabel, EmotionSample, EngineError, EngineResult, SampleInput};

/// Current time on the tokio clock
pub fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Asynchronous producer of classifications.
///
/// `None` means no usable classification this time (no face, failure).
pub trait SampleSource: Send + Sync {
    fn sample(&self) -> BoxFuture<'_, Option<EmotionSample>>;

    /// Prerequisites met (camera permission, models loaded)
    fn is_ready(&self) -> bool {
        true
    }
}

// =============================================================================
// CHANNEL SOURCE
// =============================================================================

/// Source that drains a queue of submitted samples
#[derive(Debug)]
pub struct ChannelSource {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<SampleInput>>,
    ready: Arc<AtomicBool>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it
    pub fn channel() -> (mpsc::UnboundedSender<SampleInput>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            rx: tokio::sync::Mutex::new(rx),
            ready: Arc::new(AtomicBool::new(true)),
        };
        (tx, source)
    }

    /// Shared readiness flag
    pub fn readiness(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ready)
    }
}

impl SampleSource for ChannelSource {
    fn sample(&self) -> BoxFuture<'_, Option<EmotionSample>> {
        async move {
            let mut rx = self.rx.lock().await;
            rx.try_recv().ok().map(|input| input.into_sample(clock_now()))
        }
        .boxed()
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

// =============================================================================
// SCRIPTED SOURCE
// =============================================================================

/// One line of a replay script. A missing label is a miss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptEntry {
    #[serde(default)]
    pub label: Option<EmotionLabel>,
    #[serde(default)]
    pub confidence: f64,
    /// Time the classifier "takes" for this entry
    #[serde(default)]
    pub delay_ms: u64,
}

/// Replays a fixed script of classifications
#[derive(Debug)]
pub struct ScriptedSource {
    entries: Mutex<VecDeque<ScriptEntry>>,
    total: usize,
}

impl ScriptedSource {
    pub fn new(entries: Vec<ScriptEntry>) -> Self {
        Self {
            total: entries.len(),
            entries: Mutex::new(entries.into()),
        }
    }

    /// Parse JSON lines; blank lines and `#` comments are skipped
    pub fn from_jsonl(text: &str) -> EngineResult<Self> {
        let mut entries = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry: ScriptEntry = serde_json::from_str(line).map_err(|e| {
                EngineError::InvalidSample(format!("line {}: {}", index + 1, e))
            })?;
            entries.push(entry);
        }
        Ok(Self::new(entries))
    }

    /// Load a JSON-lines script from disk
    pub fn from_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_jsonl(&text)
    }

    /// Entries in the original script
    pub fn total(&self) -> usize {
        self.total
    }

    /// Entries not yet replayed
    pub fn remaining(&self) -> usize {
        self.entries.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn next_entry(&self) -> Option<ScriptEntry> {
        self.entries.lock().ok().and_then(|mut q| q.pop_front())
    }
}

impl SampleSource for ScriptedSource {
    fn sample(&self) -> BoxFuture<'_, Option<EmotionSample>> {
        async move {
            let entry = self.next_entry()?;
            if entry.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(entry.delay_ms)).await;
            }
            entry
                .label
                .map(|label| EmotionSample::at(label, entry.confidence, clock_now()))
        }
        .boxed()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_miss_when_empty() {
        let (tx, source) = ChannelSource::channel();
        assert!(source.sample().await.is_none());

        tx.send(SampleInput {
            label: EmotionLabel::Sad,
            confidence: 0.7,
        })
        .unwrap();
        let sample = source.sample().await.unwrap();
        assert_eq!(sample.label, EmotionLabel::Sad);
        assert!(source.sample().await.is_none());
    }

    #[tokio::test]
    async fn test_channel_source_readiness() {
        let (_tx, source) = ChannelSource::channel();
        assert!(source.is_ready());
        source.readiness().store(false, Ordering::Relaxed);
        assert!(!source.is_ready());
    }

    #[test]
    fn test_script_parsing() {
        let script = r#"
# warm-up
{"label": "happy", "confidence": 0.8}
{"delay_ms": 200}

{"label": "contemptuous", "confidence": 0.6, "delay_ms": 50}
"#;
        let source = ScriptedSource::from_jsonl(script).unwrap();
        assert_eq!(source.total(), 3);
    }

    #[test]
    fn test_script_bad_line_reports_line_number() {
        let err = ScriptedSource::from_jsonl("{\"label\": \"happy\"}\n{\"label\": \"bored\"}")
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_source_replays_in_order() {
        let source = ScriptedSource::from_jsonl(
            "{\"label\": \"happy\", \"confidence\": 0.8}\n{}\n{\"label\": \"sad\", \"confidence\": 0.5, \"delay_ms\": 100}",
        )
        .unwrap();

        assert_eq!(source.sample().await.map(|s| s.label), Some(EmotionLabel::Happy));
        assert!(source.sample().await.is_none());
        let started = tokio::time::Instant::now();
        assert_eq!(source.sample().await.map(|s| s.label), Some(EmotionLabel::Sad));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(source.is_exhausted());
        assert!(source.sample().await.is_none());
    }
}
