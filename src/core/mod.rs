//! Core modules for emostab

pub mod history;
pub mod window;
pub mod temporal;
pub mod gate;
pub mod stabilizer;
pub mod engine;
pub mod source;
pub mod sink;
pub mod processing;
pub mod api;

pub use history::HistoryWindow;
pub use window::{SlidingWindowBuffer, WindowSettings};
pub use temporal::{Dominant, TemporalStabilizer, Verdict};
pub use gate::{StabilityGate, UpdatePolicy};
pub use stabilizer::{build_stabilizer, Stabilizer};
pub use engine::EmotionEngine;
pub use source::{clock_now, ChannelSource, SampleSource, ScriptEntry, ScriptedSource};
pub use sink::{deliver, EmotionSink, FnSink};
pub use processing::{Control, LoopSnapshot, LoopStats, ProcessingLoop, Ticket, TickOutcome};
pub use api::{create_router, run_server};
