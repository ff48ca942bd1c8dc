//! Processing Loop: cadence-driven sampling with recovery
//!
//! Phases: IDLE ↔ RUNNING. Each tick while RUNNING:
//! 1. Watchdog: no success for `watchdog_ms` → full reset, disarm
//!    (off when `watchdog_ms` is `None`, as in the audio preset)
//! 2. Overlap guard: a call in flight → skip
//! 3. Issue a ticket (carries the epoch), race the source against a timeout
//! 4. Completion: stale epoch or IDLE → discard; otherwise feed the engine
//!
//! Every reset, stop and session change bumps the epoch, so results that
//! were in flight across one are discarded.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Interval, MissedTickBehavior};

use crate::core::engine::EmotionEngine;
use crate::core::sink::{deliver, EmotionSink};
use crate::core::source::{clock_now, SampleSource};
use crate::types::{
    ConfigOverrides, EmotionLabel, EmotionSample, Emission, EngineResult, LoopPhase, Modality,
    ResetReason,
};

/// Messages accepted by a running loop
#[derive(Debug)]
pub enum Control {
    /// Enter RUNNING with a fresh session
    Start(Option<String>),
    /// Back to IDLE; an in-flight result is discarded
    Stop,
    /// Observed session id; a new one fully resets
    Session(String),
    /// Manual full reset
    Reset,
    /// Apply overrides, optionally reporting the outcome
    Configure(ConfigOverrides, Option<oneshot::Sender<EngineResult<()>>>),
    /// Leave `run`
    Shutdown,
}

/// Permission to complete one sample call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
}

impl Ticket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// What a completed call led to
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Issued before a reset/stop; ignored
    Stale,
    /// Classification fed to the engine
    Sample(Option<Emission>),
    /// Nothing usable came back
    Miss {
        soft_reset: bool,
        forced: Option<Emission>,
    },
}

/// Counters over the life of a loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    pub ticks: u64,
    pub samples: u64,
    pub misses: u64,
    pub emissions: u64,
    pub discarded_stale: u64,
    pub skipped_overlap: u64,
    pub skipped_not_ready: u64,
    pub soft_resets: u64,
    pub full_resets: u64,
    pub watchdog_resets: u64,
    pub session_resets: u64,
    pub sink_failures: u64,
}

/// Point-in-time view of a loop, published after every event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopSnapshot {
    pub phase: LoopPhase,
    pub session_id: Option<String>,
    pub modality: Modality,
    pub label: Option<EmotionLabel>,
    pub confidence: f64,
    pub stability_count: u32,
    pub buffered: usize,
    pub consecutive_failures: u32,
    pub active_floor: f64,
    pub epoch: u64,
    pub stats: LoopStats,
}

#[derive(Debug, Default)]
struct LoopState {
    phase: LoopPhase,
    session_id: Option<String>,
    consecutive_failures: u32,
    last_success: Option<Instant>,
    watchdog_armed: bool,
    in_flight: bool,
    epoch: u64,
}

/// Drives an engine from a sample source into a sink
pub struct ProcessingLoop {
    engine: EmotionEngine,
    sink: Box<dyn EmotionSink>,
    state: LoopState,
    stats: LoopStats,
    snapshots: Option<watch::Sender<LoopSnapshot>>,
}

impl std::fmt::Debug for ProcessingLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingLoop")
            .field("engine", &self.engine)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish()
    }
}

impl ProcessingLoop {
    /// Create an IDLE loop
    pub fn new(engine: EmotionEngine, sink: Box<dyn EmotionSink>) -> Self {
        Self {
            engine,
            sink,
            state: LoopState::default(),
            stats: LoopStats::default(),
            snapshots: None,
        }
    }

    /// Publish a snapshot after every event
    pub fn with_snapshots(mut self, tx: watch::Sender<LoopSnapshot>) -> Self {
        self.snapshots = Some(tx);
        self
    }

    pub fn engine(&self) -> &EmotionEngine {
        &self.engine
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn phase(&self) -> LoopPhase {
        self.state.phase
    }

    pub fn epoch(&self) -> u64 {
        self.state.epoch
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.consecutive_failures
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.in_flight
    }

    pub fn snapshot(&self) -> LoopSnapshot {
        let held = self.engine.state();
        LoopSnapshot {
            phase: self.state.phase,
            session_id: self.state.session_id.clone(),
            modality: self.engine.config().modality,
            label: held.label,
            confidence: held.confidence,
            stability_count: held.stability_count,
            buffered: self.engine.buffered(),
            consecutive_failures: self.state.consecutive_failures,
            active_floor: self.engine.active_floor(),
            epoch: self.state.epoch,
            stats: self.stats.clone(),
        }
    }

    fn publish(&self) {
        if let Some(tx) = &self.snapshots {
            tx.send_replace(self.snapshot());
        }
    }

    // =========================================================================
    // Session control
    // =========================================================================

    fn full_reset(&mut self, reason: ResetReason) {
        self.engine.reset();
        self.state.consecutive_failures = 0;
        self.state.epoch += 1;
        self.stats.full_resets += 1;
        tracing::info!(
            reason = %reason,
            session = ?self.state.session_id,
            epoch = self.state.epoch,
            "full reset"
        );
    }

    fn rearm(&mut self, now: Instant) {
        self.state.last_success = Some(now);
        self.state.watchdog_armed = true;
    }

    /// Enter RUNNING with fresh state
    pub fn start(&mut self, session_id: Option<String>, now: Instant) {
        self.state.session_id = session_id.clone();
        self.engine.set_session(session_id);
        self.full_reset(ResetReason::R101_SESSION_START);
        self.state.phase = LoopPhase::Running;
        self.rearm(now);
    }

    /// Enter IDLE; the held state is kept for display
    pub fn stop(&mut self) {
        self.state.phase = LoopPhase::Idle;
        self.state.epoch += 1;
        tracing::info!(session = ?self.state.session_id, "loop stopped");
    }

    /// Observe the current session id. Returns true when it changed.
    pub fn observe_session(&mut self, session_id: &str, now: Instant) -> bool {
        if self.state.session_id.as_deref() == Some(session_id) {
            return false;
        }
        self.state.session_id = Some(session_id.to_string());
        self.engine.set_session(Some(session_id.to_string()));
        self.full_reset(ResetReason::R102_SESSION_CHANGED);
        self.stats.session_resets += 1;
        self.rearm(now);
        true
    }

    /// Manual full reset
    pub fn reset(&mut self, now: Instant) {
        self.full_reset(ResetReason::R105_MANUAL);
        self.rearm(now);
    }

    /// Apply overrides; a strategy change fully resets
    pub fn configure(&mut self, overrides: &ConfigOverrides, now: Instant) -> EngineResult<()> {
        let before = self.engine.config().strategy;
        self.engine.configure(overrides)?;
        if self.engine.config().strategy != before {
            // engine already cleared itself; invalidate in-flight work too
            self.full_reset(ResetReason::R106_RECONFIGURED);
            self.rearm(now);
        }
        Ok(())
    }

    // =========================================================================
    // Ticks
    // =========================================================================

    /// Run the per-tick checks; a ticket means "call the source now"
    pub fn begin_tick(&mut self, now: Instant) -> Option<Ticket> {
        if self.state.phase != LoopPhase::Running {
            return None;
        }

        if let (true, Some(limit)) = (self.state.watchdog_armed, self.engine.config().watchdog_ms) {
            let gap = self
                .state
                .last_success
                .map(|t| now.saturating_duration_since(t).as_millis() as u64)
                .unwrap_or(0);
            if gap > limit {
                tracing::warn!(gap_ms = gap, "no detection for too long");
                self.full_reset(ResetReason::R104_WATCHDOG);
                self.state.watchdog_armed = false;
                self.stats.watchdog_resets += 1;
            }
        }

        if self.state.in_flight {
            self.stats.skipped_overlap += 1;
            return None;
        }

        self.state.in_flight = true;
        self.stats.ticks += 1;
        Some(Ticket {
            epoch: self.state.epoch,
        })
    }

    /// Settle a ticket with what the source returned
    pub fn complete(
        &mut self,
        ticket: Ticket,
        result: Option<EmotionSample>,
        now: Instant,
    ) -> TickOutcome {
        self.state.in_flight = false;

        if ticket.epoch != self.state.epoch || self.state.phase != LoopPhase::Running {
            self.stats.discarded_stale += 1;
            tracing::debug!(ticket = ticket.epoch, epoch = self.state.epoch, "stale result discarded");
            return TickOutcome::Stale;
        }

        match result {
            Some(sample) => {
                self.state.consecutive_failures = 0;
                self.rearm(now);
                self.stats.samples += 1;
                let emission = self.engine.observe(sample, now);
                if let Some(emission) = &emission {
                    self.emit(emission);
                }
                TickOutcome::Sample(emission)
            }
            None => {
                self.stats.misses += 1;
                self.state.consecutive_failures += 1;

                let soft_reset = self
                    .engine
                    .config()
                    .max_consecutive_failures
                    .is_some_and(|max| self.state.consecutive_failures >= max);
                if soft_reset {
                    tracing::info!(
                        reason = %ResetReason::R103_CONSECUTIVE_FAILURES,
                        failures = self.state.consecutive_failures,
                        "soft reset"
                    );
                    self.engine.soft_reset();
                    self.state.consecutive_failures = 0;
                    self.stats.soft_resets += 1;
                }

                let forced = self.engine.force_output(now);
                if let Some(emission) = &forced {
                    self.emit(emission);
                }
                TickOutcome::Miss { soft_reset, forced }
            }
        }
    }

    fn emit(&mut self, emission: &Emission) {
        self.stats.emissions += 1;
        if deliver(self.sink.as_mut(), emission).is_err() {
            self.stats.sink_failures += 1;
        }
    }

    fn handle(&mut self, message: Control, now: Instant) {
        match message {
            Control::Start(session_id) => self.start(session_id, now),
            Control::Stop => self.stop(),
            Control::Session(session_id) => {
                self.observe_session(&session_id, now);
            }
            Control::Reset => self.reset(now),
            Control::Configure(overrides, reply) => {
                let result = self.configure(&overrides, now);
                if let Err(err) = &result {
                    tracing::warn!(error = %err, "configuration rejected");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Control::Shutdown => {}
        }
    }

    // =========================================================================
    // Async driver
    // =========================================================================

    /// Drive the loop until `Shutdown` or until every control sender is gone
    pub async fn run<S>(mut self, source: Arc<S>, mut control: mpsc::Receiver<Control>) -> LoopStats
    where
        S: SampleSource + ?Sized + 'static,
    {
        let mut cadence_ms = self.engine.config().cadence_ms;
        let mut ticker = cadence_ticker(cadence_ms);
        let mut pending: Option<(Ticket, BoxFuture<'static, Option<EmotionSample>>)> = None;

        self.publish();
        loop {
            tokio::select! {
                biased;

                message = control.recv() => {
                    match message {
                        None | Some(Control::Shutdown) => break,
                        Some(message) => self.handle(message, clock_now()),
                    }
                    if self.engine.config().cadence_ms != cadence_ms {
                        cadence_ms = self.engine.config().cadence_ms;
                        ticker = cadence_ticker(cadence_ms);
                    }
                }

                result = await_pending(&mut pending) => {
                    if let Some((ticket, _)) = pending.take() {
                        self.complete(ticket, result, clock_now());
                    }
                }

                _ = ticker.tick() => {
                    if !source.is_ready() {
                        self.stats.skipped_not_ready += 1;
                    } else if let Some(ticket) = self.begin_tick(clock_now()) {
                        let timeout = self.engine.config().sample_timeout();
                        let src = Arc::clone(&source);
                        let call = async move {
                            match time::timeout(timeout, src.sample()).await {
                                Ok(result) => result,
                                Err(_) => {
                                    tracing::debug!(timeout_ms = timeout.as_millis() as u64, "sample timed out");
                                    None
                                }
                            }
                        }
                        .boxed();
                        pending = Some((ticket, call));
                    }
                }
            }
            self.publish();
        }

        tracing::info!(stats = ?self.stats, "loop finished");
        self.stats
    }
}

fn cadence_ticker(cadence_ms: u64) -> Interval {
    let mut ticker = time::interval(std::time::Duration::from_millis(cadence_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn await_pending(
    pending: &mut Option<(Ticket, BoxFuture<'static, Option<EmotionSample>>)>,
) -> Option<EmotionSample> {
    match pending {
        Some((_, call)) => call.await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EngineConfig;
    use std::time::Duration;

    fn looped() -> (ProcessingLoop, mpsc::UnboundedReceiver<Emission>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let processing = ProcessingLoop::new(EmotionEngine::new(EngineConfig::default()), Box::new(tx));
        (processing, rx)
    }

    fn happy(now: Instant) -> Option<EmotionSample> {
        Some(EmotionSample::at(EmotionLabel::Happy, 0.7, now))
    }

    #[test]
    fn test_idle_issues_no_tickets() {
        let (mut processing, _rx) = looped();
        assert_eq!(processing.phase(), LoopPhase::Idle);
        assert!(processing.begin_tick(Instant::now()).is_none());
    }

    #[test]
    fn test_overlap_guard() {
        let t0 = Instant::now();
        let (mut processing, _rx) = looped();
        processing.start(None, t0);

        let ticket = processing.begin_tick(t0).unwrap();
        assert!(processing.begin_tick(t0 + Duration::from_millis(300)).is_none());
        assert_eq!(processing.stats().skipped_overlap, 1);

        processing.complete(ticket, happy(t0), t0 + Duration::from_millis(400));
        assert!(processing.begin_tick(t0 + Duration::from_millis(600)).is_some());
    }

    #[test]
    fn test_sample_reaches_sink() {
        let t0 = Instant::now();
        let (mut processing, mut rx) = looped();
        processing.start(Some("s-1".into()), t0);

        let ticket = processing.begin_tick(t0).unwrap();
        let outcome = processing.complete(ticket, happy(t0), t0);
        assert!(matches!(outcome, TickOutcome::Sample(Some(_))));

        let emission = rx.try_recv().unwrap();
        assert_eq!(emission.label, EmotionLabel::Happy);
        assert_eq!(emission.session_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn test_stale_result_after_reset_is_discarded() {
        let t0 = Instant::now();
        let (mut processing, mut rx) = looped();
        processing.start(None, t0);

        let ticket = processing.begin_tick(t0).unwrap();
        processing.reset(t0);
        assert_eq!(processing.complete(ticket, happy(t0), t0), TickOutcome::Stale);
        assert!(processing.engine().state().is_empty());
        assert!(rx.try_recv().is_err());
        assert!(!processing.is_in_flight());
    }

    #[test]
    fn test_result_after_stop_is_discarded() {
        let t0 = Instant::now();
        let (mut processing, _rx) = looped();
        processing.start(None, t0);

        let ticket = processing.begin_tick(t0).unwrap();
        processing.stop();
        assert_eq!(processing.complete(ticket, happy(t0), t0), TickOutcome::Stale);
        assert_eq!(processing.stats().discarded_stale, 1);
    }

    #[test]
    fn test_soft_reset_after_four_misses() {
        let t0 = Instant::now();
        let (mut processing, _rx) = looped();
        processing.start(None, t0);

        let ticket = processing.begin_tick(t0).unwrap();
        processing.complete(ticket, happy(t0), t0);

        let mut soft = 0;
        for step in 1..=4u64 {
            let now = t0 + Duration::from_millis(step * 300);
            let ticket = processing.begin_tick(now).unwrap();
            if let TickOutcome::Miss { soft_reset: true, .. } = processing.complete(ticket, None, now) {
                soft += 1;
            }
        }

        assert_eq!(soft, 1);
        assert_eq!(processing.consecutive_failures(), 0);
        assert_eq!(processing.engine().buffered(), 0);
        // held state survives a soft reset
        assert_eq!(processing.engine().state().label, Some(EmotionLabel::Happy));
        assert!((processing.engine().active_floor() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_watchdog_fires_once_per_gap() {
        let t0 = Instant::now();
        let (mut processing, _rx) = looped();
        processing.start(None, t0);

        for step in 1..=40u64 {
            let now = t0 + Duration::from_millis(step * 300);
            if let Some(ticket) = processing.begin_tick(now) {
                processing.complete(ticket, None, now);
            }
        }
        assert_eq!(processing.stats().watchdog_resets, 1);

        // a success re-arms it
        let now = t0 + Duration::from_millis(12_300);
        let ticket = processing.begin_tick(now).unwrap();
        processing.complete(ticket, happy(now), now);
        let later = now + Duration::from_millis(8_001);
        processing.begin_tick(later);
        assert_eq!(processing.stats().watchdog_resets, 2);
    }

    #[test]
    fn test_audio_misses_keep_the_window() {
        let t0 = Instant::now();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut processing =
            ProcessingLoop::new(EmotionEngine::new(EngineConfig::audio()), Box::new(tx));
        processing.start(None, t0);

        let ticket = processing.begin_tick(t0).unwrap();
        processing.complete(ticket, happy(t0), t0);
        for step in 1..=60u64 {
            let now = t0 + Duration::from_millis(step * 300);
            let ticket = processing.begin_tick(now).unwrap();
            assert!(matches!(
                processing.complete(ticket, None, now),
                TickOutcome::Miss { soft_reset: false, .. }
            ));
        }

        assert_eq!(processing.engine().buffered(), 1);
        assert_eq!(processing.stats().soft_resets, 0);
        assert_eq!(processing.stats().watchdog_resets, 0);
        assert_eq!(processing.consecutive_failures(), 60);
    }

    #[test]
    fn test_session_change_resets_everything() {
        let t0 = Instant::now();
        let (mut processing, _rx) = looped();
        processing.start(Some("a".into()), t0);
        let ticket = processing.begin_tick(t0).unwrap();
        processing.complete(ticket, happy(t0), t0);
        let ticket = processing.begin_tick(t0).unwrap();
        processing.complete(ticket, None, t0);

        assert!(!processing.observe_session("a", t0));
        assert!(processing.observe_session("b", t0));
        assert!(processing.engine().state().is_empty());
        assert_eq!(processing.consecutive_failures(), 0);
        assert_eq!(processing.phase(), LoopPhase::Running);
        assert_eq!(processing.snapshot().session_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_failing_sink_does_not_touch_state() {
        let t0 = Instant::now();
        let sink = crate::core::sink::FnSink(|_: &Emission| -> Result<(), crate::types::SinkError> {
            panic!("consumer bug")
        });
        let mut processing =
            ProcessingLoop::new(EmotionEngine::new(EngineConfig::default()), Box::new(sink));
        processing.start(None, t0);

        let ticket = processing.begin_tick(t0).unwrap();
        processing.complete(ticket, happy(t0), t0);
        assert_eq!(processing.stats().sink_failures, 1);
        assert_eq!(processing.engine().state().label, Some(EmotionLabel::Happy));
    }
}
