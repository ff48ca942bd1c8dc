//! Emission sinks: where stabilized emotions are delivered
//!
//! Sink failures never reach the engine. The loop catches both `Err`
//! and panics at the call site (`deliver`).

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::{broadcast, mpsc};

use crate::types::{Emission, SinkError};

/// Consumer of stabilized emotions
pub trait EmotionSink: Send {
    fn on_emotion_stabilized(&mut self, emission: &Emission) -> Result<(), SinkError>;
}

impl EmotionSink for mpsc::UnboundedSender<Emission> {
    fn on_emotion_stabilized(&mut self, emission: &Emission) -> Result<(), SinkError> {
        self.send(emission.clone()).map_err(|_| SinkError::Closed)
    }
}

impl EmotionSink for broadcast::Sender<Emission> {
    fn on_emotion_stabilized(&mut self, emission: &Emission) -> Result<(), SinkError> {
        // no subscribers is not a failure; nobody is watching yet
        let _ = self.send(emission.clone());
        Ok(())
    }
}

impl EmotionSink for Vec<Emission> {
    fn on_emotion_stabilized(&mut self, emission: &Emission) -> Result<(), SinkError> {
        self.push(emission.clone());
        Ok(())
    }
}

/// Closure adapter
pub struct FnSink<F>(pub F);

impl<F> EmotionSink for FnSink<F>
where
    F: FnMut(&Emission) -> Result<(), SinkError> + Send,
{
    fn on_emotion_stabilized(&mut self, emission: &Emission) -> Result<(), SinkError> {
        (self.0)(emission)
    }
}

impl<F> std::fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnSink")
    }
}

/// Call a sink, containing errors and panics.
///
/// Returns the failure, if any, for the caller to count.
pub fn deliver(sink: &mut dyn EmotionSink, emission: &Emission) -> Result<(), SinkError> {
    match catch_unwind(AssertUnwindSafe(|| sink.on_emotion_stabilized(emission))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, label = %emission.label, "sink rejected emission");
            Err(err)
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::warn!(panic = %message, label = %emission.label, "sink panicked");
            Err(SinkError::Rejected(format!("panic: {}", message)))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
