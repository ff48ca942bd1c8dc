//! Integration tests for Slice 1 - per-utterance stabilization
//!
//! Tests the audio path: sample → SlidingWindowBuffer → StabilityGate → emission

use emostab::core::{EmotionEngine, SlidingWindowBuffer, StabilityGate};
use emostab::types::{EmotionLabel, EmotionSample, EngineConfig, ReasonCode};
use emostab::{MAX_EMITTED_CONFIDENCE, WINDOW_EMIT_INTERVAL_MS};
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

/// Buffer gating sits just above 0.4
#[test]
fn test_buffer_gating() {
    let mut buffer = SlidingWindowBuffer::new();
    assert!(!buffer.add(EmotionLabel::Sad, 0.39));
    assert_eq!(buffer.len(), 0);
    assert!(buffer.add(EmotionLabel::Sad, 0.41));
    assert_eq!(buffer.len(), 1);
}

/// Five agreeing samples, five evaluations 100 ms apart: exactly one emission
#[test]
fn test_end_to_end_single_emission() {
    let t0 = Instant::now();
    let mut buffer = SlidingWindowBuffer::new();
    for _ in 0..5 {
        buffer.add(EmotionLabel::Happy, 0.7);
    }

    let mut gate = StabilityGate::new();
    let emissions: Vec<_> = (0..5u64)
        .filter_map(|i| buffer.evaluate(&mut gate, WINDOW_EMIT_INTERVAL_MS, t0 + Duration::from_millis(i * 100)))
        .collect();

    assert_eq!(emissions.len(), 1);
    assert_eq!(emissions[0].label, EmotionLabel::Happy);
    assert_eq!(emissions[0].reason, ReasonCode::E005_WINDOW_STABLE);
    assert!((emissions[0].confidence - 0.7).abs() < 1e-9);
}

/// Each agreeing evaluation raises the count by one; an emission only
/// restarts the spacing timer
#[test]
fn test_stability_monotonic_under_agreement() {
    let t0 = Instant::now();
    let mut buffer = SlidingWindowBuffer::new();
    for _ in 0..5 {
        buffer.add(EmotionLabel::Calm, 0.6);
    }

    let mut gate = StabilityGate::new();
    let mut last = 0;
    let mut emitted_at = None;
    for i in 0..20u64 {
        let now = t0 + Duration::from_millis(i * 100);
        buffer.add(EmotionLabel::Calm, 0.6 + (i % 3) as f64 * 0.1);
        let emission = buffer.evaluate(&mut gate, WINDOW_EMIT_INTERVAL_MS, now);

        let count = gate.state().stability_count;
        assert_eq!(count, last + 1, "evaluation {}", i);
        assert_eq!(gate.state().label, Some(EmotionLabel::Calm));
        last = count;

        if let Some(emission) = emission {
            assert_eq!(emission.label, EmotionLabel::Calm);
            assert!(emitted_at.is_none(), "second emission inside the spacing");
            emitted_at = Some(now);
        }
    }

    // first emission once the count reached five
    let emitted_at = emitted_at.expect("calm never emitted");
    assert_eq!(emitted_at, t0 + Duration::from_millis(400));
    assert_eq!(gate.state().last_updated, Some(emitted_at));
    assert_eq!(gate.state().stability_count, 20);
}

/// Audio quality labels above the floor vote like any other label
#[test]
fn test_quality_labels_are_buffered() {
    let mut buffer = SlidingWindowBuffer::new();
    assert!(buffer.add(EmotionLabel::TooNoisy, 0.6));
    assert_eq!(buffer.len(), 1);
}

/// Emissions are spaced by the emit interval while the label holds
#[test]
fn test_audio_engine_spacing() {
    let t0 = Instant::now();
    let mut engine = EmotionEngine::new(EngineConfig::audio());

    let mut emitted_at = Vec::new();
    for i in 0..60u64 {
        let now = t0 + Duration::from_millis(i * 100);
        if engine.observe(EmotionSample::at(EmotionLabel::Sad, 0.9, now), now).is_some() {
            emitted_at.push(i * 100);
        }
    }

    assert!(emitted_at.len() >= 2);
    for pair in emitted_at.windows(2) {
        assert!(pair[1] - pair[0] >= WINDOW_EMIT_INTERVAL_MS);
    }
}

/// Low-confidence utterances never move the state
#[test]
fn test_sentinels_below_floor_are_ignored() {
    let now = Instant::now();
    let mut engine = EmotionEngine::new(EngineConfig::audio());
    for _ in 0..10 {
        assert!(engine
            .observe(EmotionSample::at(EmotionLabel::TooSoft, 0.2, now), now)
            .is_none());
    }
    assert_eq!(engine.buffered(), 0);
    assert!(engine.state().is_empty());
}

/// Confidence clamping and the emission cap
#[test]
fn test_confidence_clamping() {
    assert_eq!(EmotionSample::new(EmotionLabel::Happy, 1.7).confidence, 1.0);
    assert_eq!(EmotionSample::new(EmotionLabel::Happy, -0.2).confidence, 0.0);
    assert_eq!(EmotionSample::new(EmotionLabel::Happy, f64::NAN).confidence, 0.0);

    let t0 = Instant::now();
    let mut engine = EmotionEngine::new(EngineConfig::audio());
    for i in 0..30u64 {
        let now = t0 + Duration::from_millis(i * 500);
        if let Some(emission) = engine.observe(EmotionSample::at(EmotionLabel::Happy, 1.0, now), now) {
            assert!(emission.confidence <= MAX_EMITTED_CONFIDENCE);
        }
    }
}

/// Reset twice equals reset once
#[test]
fn test_reset_idempotent() {
    let now = Instant::now();
    let mut engine = EmotionEngine::new(EngineConfig::audio());
    for _ in 0..7 {
        engine.observe(EmotionSample::at(EmotionLabel::Angry, 0.8, now), now);
    }
    assert!(!engine.state().is_empty());

    engine.reset();
    let once = (*engine.state(), engine.buffered());
    engine.reset();
    assert_eq!((*engine.state(), engine.buffered()), once);
    assert!(engine.state().is_empty());
    assert_eq!(engine.buffered(), 0);
}
