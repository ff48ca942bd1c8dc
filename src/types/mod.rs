//! Core types for emostab

mod config;
mod error;
mod label;
mod output;
mod reason;
mod sample;
mod state;

pub use config::{BiasConfig, ConfigOverrides, DeviceClass, EngineConfig, Modality, StabilizerKind};
pub use error::{EngineError, EngineResult, SinkError};
pub use label::EmotionLabel;
pub use output::{Decision, Emission};
pub use reason::{ReasonCode, ResetReason};
pub use sample::{clamp_confidence, tally, AggregateScore, EmotionSample, SampleInput};
pub use state::{LoopPhase, StableState};
