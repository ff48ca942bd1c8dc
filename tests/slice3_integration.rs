//! Integration tests for Slice 3 - processing loop
//!
//! Tests the async driver on paused time: cadence, timeout race,
//! watchdog, stale discard, session changes and sink isolation

use emostab::core::{
    ChannelSource, Control, EmotionEngine, EmotionSink, FnSink, LoopSnapshot, LoopStats,
    ProcessingLoop, SampleSource, ScriptedSource,
};
use emostab::types::{
    EmotionLabel, EmotionSample, Emission, EngineConfig, LoopPhase, SampleInput, SinkError,
};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Source that never sees a face
struct BlindSource;

impl SampleSource for BlindSource {
    fn sample(&self) -> BoxFuture<'_, Option<EmotionSample>> {
        async { None }.boxed()
    }
}

/// Source whose classifier takes a fixed time per call
struct SlowSource {
    latency: Duration,
}

impl SampleSource for SlowSource {
    fn sample(&self) -> BoxFuture<'_, Option<EmotionSample>> {
        async move {
            sleep(self.latency).await;
            Some(EmotionSample::at(EmotionLabel::Happy, 0.8, emostab::core::clock_now()))
        }
        .boxed()
    }
}

struct Running {
    control: mpsc::Sender<Control>,
    snapshot: watch::Receiver<LoopSnapshot>,
    task: JoinHandle<LoopStats>,
}

impl Running {
    async fn shutdown(self) -> LoopStats {
        self.control.send(Control::Shutdown).await.unwrap();
        self.task.await.unwrap()
    }
}

fn spawn_loop<S>(source: Arc<S>, sink: Box<dyn EmotionSink>, session: &str) -> Running
where
    S: SampleSource + 'static,
{
    spawn_loop_with(EngineConfig::default(), source, sink, session)
}

fn spawn_loop_with<S>(
    config: EngineConfig,
    source: Arc<S>,
    sink: Box<dyn EmotionSink>,
    session: &str,
) -> Running
where
    S: SampleSource + 'static,
{
    let processing = ProcessingLoop::new(EmotionEngine::new(config), sink);
    let (snapshot_tx, snapshot) = watch::channel(processing.snapshot());
    let processing = processing.with_snapshots(snapshot_tx);

    let (control, control_rx) = mpsc::channel(16);
    control
        .try_send(Control::Start(Some(session.to_string())))
        .unwrap();
    let task = tokio::spawn(processing.run(source, control_rx));
    Running {
        control,
        snapshot,
        task,
    }
}

fn happy() -> SampleInput {
    SampleInput {
        label: EmotionLabel::Happy,
        confidence: 0.7,
    }
}

/// Ten seconds of nothing: one watchdog reset, not one per tick
#[tokio::test(start_paused = true)]
async fn test_watchdog_fires_exactly_once() {
    let (tx, _rx) = mpsc::unbounded_channel::<Emission>();
    let running = spawn_loop(Arc::new(BlindSource), Box::new(tx), "s");

    sleep(Duration::from_secs(10)).await;
    let stats = running.shutdown().await;

    assert_eq!(stats.watchdog_resets, 1);
    assert_eq!(stats.samples, 0);
    assert!(stats.misses >= 30);
    // soft resets every fourth miss
    assert!(stats.soft_resets >= 6);
}

/// A classifier slower than the timeout never produces a sample
#[tokio::test(start_paused = true)]
async fn test_timeout_race() {
    let (tx, _rx) = mpsc::unbounded_channel::<Emission>();
    let source = Arc::new(SlowSource {
        latency: Duration::from_millis(2000),
    });
    let running = spawn_loop(source, Box::new(tx), "s");

    sleep(Duration::from_secs(3)).await;
    let stats = running.shutdown().await;

    assert_eq!(stats.samples, 0);
    assert!(stats.misses >= 2);
    // ticks landing inside the 800 ms race are skipped
    assert!(stats.skipped_overlap >= 2);
}

/// A result that lands after a reset is discarded
#[tokio::test(start_paused = true)]
async fn test_stale_result_discarded() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Emission>();
    let source = Arc::new(SlowSource {
        latency: Duration::from_millis(500),
    });
    let running = spawn_loop(source, Box::new(tx), "s");

    sleep(Duration::from_millis(100)).await;
    running.control.send(Control::Reset).await.unwrap();
    sleep(Duration::from_millis(450)).await;

    let snapshot = running.snapshot.borrow().clone();
    assert_eq!(snapshot.label, None);
    let stats = running.shutdown().await;

    assert_eq!(stats.discarded_stale, 1);
    assert_eq!(stats.samples, 0);
    assert!(rx.try_recv().is_err());
}

/// Stop is cooperative: the in-flight call finishes and is ignored
#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight() {
    let (tx, _rx) = mpsc::unbounded_channel::<Emission>();
    let source = Arc::new(SlowSource {
        latency: Duration::from_millis(500),
    });
    let running = spawn_loop(source, Box::new(tx), "s");

    sleep(Duration::from_millis(100)).await;
    running.control.send(Control::Stop).await.unwrap();
    sleep(Duration::from_secs(2)).await;

    assert_eq!(running.snapshot.borrow().phase, LoopPhase::Idle);
    let stats = running.shutdown().await;
    assert_eq!(stats.discarded_stale, 1);
    assert_eq!(stats.ticks, 1);
}

/// Queued samples are stabilized and delivered with the session id
#[tokio::test(start_paused = true)]
async fn test_channel_samples_reach_sink() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Emission>();
    let (samples, source) = ChannelSource::channel();
    let running = spawn_loop(Arc::new(source), Box::new(tx), "alpha");

    samples.send(happy()).unwrap();
    sleep(Duration::from_millis(400)).await;

    let emission = rx.try_recv().unwrap();
    assert_eq!(emission.label, EmotionLabel::Happy);
    assert_eq!(emission.session_id.as_deref(), Some("alpha"));
    assert_eq!(running.snapshot.borrow().label, Some(EmotionLabel::Happy));
    running.shutdown().await;
}

/// A new session id wipes the held state immediately
#[tokio::test(start_paused = true)]
async fn test_session_change_resets() {
    let (tx, _rx) = mpsc::unbounded_channel::<Emission>();
    let (samples, source) = ChannelSource::channel();
    let running = spawn_loop(Arc::new(source), Box::new(tx), "a");

    samples.send(happy()).unwrap();
    sleep(Duration::from_millis(400)).await;
    assert_eq!(running.snapshot.borrow().label, Some(EmotionLabel::Happy));

    running
        .control
        .send(Control::Session("b".to_string()))
        .await
        .unwrap();
    sleep(Duration::from_millis(10)).await;

    let snapshot = running.snapshot.borrow().clone();
    assert_eq!(snapshot.label, None);
    assert_eq!(snapshot.session_id.as_deref(), Some("b"));
    assert_eq!(snapshot.phase, LoopPhase::Running);

    let stats = running.shutdown().await;
    assert_eq!(stats.session_resets, 1);
}

/// A failing consumer is counted and otherwise ignored
#[tokio::test(start_paused = true)]
async fn test_sink_failure_is_contained() {
    let sink = FnSink(|_: &Emission| -> Result<(), SinkError> {
        Err(SinkError::Rejected("display offline".to_string()))
    });
    let (samples, source) = ChannelSource::channel();
    let running = spawn_loop(Arc::new(source), Box::new(sink), "s");

    samples.send(happy()).unwrap();
    sleep(Duration::from_millis(400)).await;

    assert_eq!(running.snapshot.borrow().label, Some(EmotionLabel::Happy));
    let stats = running.shutdown().await;
    assert_eq!(stats.sink_failures, 1);
    assert_eq!(stats.emissions, 1);
}

/// No ticks while the source is not ready
#[tokio::test(start_paused = true)]
async fn test_not_ready_source_is_not_polled() {
    let (tx, _rx) = mpsc::unbounded_channel::<Emission>();
    let (_samples, source) = ChannelSource::channel();
    source.readiness().store(false, Ordering::Relaxed);
    let running = spawn_loop(Arc::new(source), Box::new(tx), "s");

    sleep(Duration::from_secs(2)).await;
    let stats = running.shutdown().await;
    assert_eq!(stats.ticks, 0);
    assert!(stats.skipped_not_ready > 0);
}

/// Forced re-emission keeps a silent display alive
#[tokio::test(start_paused = true)]
async fn test_forced_output_during_silence() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Emission>();
    let source = ScriptedSource::from_jsonl(r#"{"label": "calm", "confidence": 0.7}"#).unwrap();
    let running = spawn_loop(Arc::new(source), Box::new(tx), "s");

    sleep(Duration::from_millis(5500)).await;
    running.shutdown().await;

    let first = rx.try_recv().unwrap();
    assert!(!first.forced);
    let forced = rx.try_recv().unwrap();
    assert!(forced.forced);
    assert_eq!(forced.label, EmotionLabel::Calm);
}

/// Utterances arrive seconds apart; the silence between them is not a failure
#[tokio::test(start_paused = true)]
async fn test_spaced_utterances_emit_on_audio() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Emission>();
    let (samples, source) = ChannelSource::channel();
    let running = spawn_loop_with(EngineConfig::audio(), Arc::new(source), Box::new(tx), "voice");

    for _ in 0..20 {
        samples
            .send(SampleInput {
                label: EmotionLabel::Happy,
                confidence: 0.9,
            })
            .unwrap();
        sleep(Duration::from_millis(1500)).await;
    }

    assert_eq!(running.snapshot.borrow().buffered, 15);
    let stats = running.shutdown().await;
    assert_eq!(stats.samples, 20);
    assert_eq!(stats.soft_resets, 0);
    assert_eq!(stats.watchdog_resets, 0);
    assert!(stats.emissions >= 1);

    let emission = rx.try_recv().unwrap();
    assert_eq!(emission.label, EmotionLabel::Happy);
    assert_eq!(emission.session_id.as_deref(), Some("voice"));
}
