//! emostab: Emotion stabilization engine
//!
//! Turns a stream of noisy, independently arriving emotion classifications
//! (one per video frame or one per recorded utterance) into a temporally
//! stable, confidence-scored emotional state.
//!
//! Pipeline: SampleSource → ProcessingLoop → EmotionEngine
//! (TemporalStabilizer | SlidingWindowBuffer) → StabilityGate → EmotionSink

pub mod core;
pub mod logging;
pub mod types;

// =============================================================================
// SLIDING WINDOW (per-utterance audio) [C]
// =============================================================================

/// Samples kept in the sliding window buffer
pub const WINDOW_CAPACITY: usize = 15;

/// Samples required before the buffer votes at all
pub const WINDOW_MIN_FILL: usize = 5;

/// Samples at or below this confidence never enter the buffer
pub const WINDOW_CONFIDENCE_FLOOR: f64 = 0.4;

/// Consecutive agreeing evaluations before a window label is emitted
pub const MIN_STABILITY_COUNT: u32 = 5;

/// Minimum spacing between window emissions (milliseconds)
pub const WINDOW_EMIT_INTERVAL_MS: u64 = 2000;

/// Weight of the previously held confidence when a label is reinforced
pub const SMOOTHING_KEEP: f64 = 0.7;

/// Stability lost per disagreeing evaluation
pub const STABILITY_EROSION: u32 = 2;

// =============================================================================
// TEMPORAL HISTORY (per-frame video) [C]
// =============================================================================

/// Entries kept in the temporal history
pub const HISTORY_MAX_LEN: usize = 5;

/// Maximum age of a history entry (milliseconds)
pub const HISTORY_MAX_AGE_MS: u64 = 7000;

/// Extra weight per unit of confidence in temporal voting
pub const CONFIDENCE_WEIGHT_FACTOR: f64 = 0.5;

// =============================================================================
// HYSTERESIS BOOSTS AND CAPS [C] - empirically tuned, never reach 1.0
// =============================================================================

pub const FIRST_DETECTION_BOOST: f64 = 1.4;
pub const FIRST_DETECTION_CAP: f64 = 0.9;

pub const REINFORCE_BOOST: f64 = 1.35;
pub const REINFORCE_CAP: f64 = 0.98;

pub const NEUTRAL_EXIT_BOOST: f64 = 1.2;
pub const NEUTRAL_EXIT_CAP: f64 = 0.50;

pub const SWITCH_BOOST: f64 = 1.2;
pub const SWITCH_CAP: f64 = 0.95;

pub const HAPPY_OVERRIDE_BOOST: f64 = 1.3;
pub const HAPPY_OVERRIDE_CAP: f64 = 0.95;

pub const COMPLEX_OVERRIDE_BOOST: f64 = 1.2;
pub const COMPLEX_OVERRIDE_CAP: f64 = 0.9;

/// Hard ceiling for every emitted confidence
pub const MAX_EMITTED_CONFIDENCE: f64 = 0.98;

// =============================================================================
// PROCESSING LOOP [C]
// =============================================================================

/// Tick cadence on desktop-class devices (milliseconds)
pub const CADENCE_DESKTOP_MS: u64 = 300;

/// Tick cadence on mobile-class devices (milliseconds)
pub const CADENCE_MOBILE_MS: u64 = 400;

/// Per-call classifier timeout, desktop (milliseconds)
pub const SAMPLE_TIMEOUT_DESKTOP_MS: u64 = 800;

/// Per-call classifier timeout, mobile (milliseconds)
pub const SAMPLE_TIMEOUT_MOBILE_MS: u64 = 600;

/// Minimum time between internal updates of the video state (milliseconds)
pub const VIDEO_MIN_UPDATE_INTERVAL_MS: u64 = 1000;

/// Held state is re-emitted after this long without output (milliseconds)
pub const VIDEO_MAX_OUTPUT_INTERVAL_MS: u64 = 5000;

/// Stabilized confidence required for a timed update
pub const UPDATE_CONFIDENCE_FLOOR: f64 = 0.35;

/// Relaxed update floor after a failure-driven reset
pub const RECOVERY_CONFIDENCE_FLOOR: f64 = 0.3;

/// Confidence required for a label change to pass the update gate
pub const LABEL_CHANGE_FLOOR: f64 = 0.4;

/// Consecutive empty detections before stabilizer history is dropped
pub const MAX_CONSECUTIVE_FAILURES: u32 = 4;

/// Time without a successful detection before a full reset (milliseconds)
pub const WATCHDOG_MS: u64 = 8000;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
