//! Reason codes for stabilization decisions and resets

use serde::{Deserialize, Serialize};

/// Why a decision carries the label and confidence it does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ReasonCode {
    // =========================================================================
    // E001: Same label
    // =========================================================================
    /// Nothing held yet, first detection boost
    E001_FIRST_DETECTION,
    /// Dominant label equals the held one
    E001_REINFORCED,

    // =========================================================================
    // E002: Switches
    // =========================================================================
    /// Leaving neutral with the lowered bar
    E002_NEUTRAL_EXIT,
    /// Switching between two non-neutral labels
    E002_SWITCHED,

    // =========================================================================
    // E003: Narrow overrides
    // =========================================================================
    /// Happy seen often enough to override
    E003_HAPPY_OVERRIDE,
    /// Complex emotion above its own bar
    E003_COMPLEX_OVERRIDE,
    /// Confused below its raised bar, held state kept
    E003_CONFUSED_RESISTED,

    // =========================================================================
    // E004: Hold
    // =========================================================================
    /// Competing label too weak, held state kept
    E004_HELD,

    // =========================================================================
    // E005: Window
    // =========================================================================
    /// Window label stable for enough evaluations
    E005_WINDOW_STABLE,

    // =========================================================================
    // E006: Output timing
    // =========================================================================
    /// Re-emitted because the output interval elapsed
    E006_FORCED_OUTPUT,
}

impl ReasonCode {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::E001_FIRST_DETECTION => "E001_FIRST_DETECTION",
            Self::E001_REINFORCED => "E001_REINFORCED",
            Self::E002_NEUTRAL_EXIT => "E002_NEUTRAL_EXIT",
            Self::E002_SWITCHED => "E002_SWITCHED",
            Self::E003_HAPPY_OVERRIDE => "E003_HAPPY_OVERRIDE",
            Self::E003_COMPLEX_OVERRIDE => "E003_COMPLEX_OVERRIDE",
            Self::E003_CONFUSED_RESISTED => "E003_CONFUSED_RESISTED",
            Self::E004_HELD => "E004_HELD",
            Self::E005_WINDOW_STABLE => "E005_WINDOW_STABLE",
            Self::E006_FORCED_OUTPUT => "E006_FORCED_OUTPUT",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::E001_FIRST_DETECTION => "First detection",
            Self::E001_REINFORCED => "Held emotion reinforced",
            Self::E002_NEUTRAL_EXIT => "Leaving neutral",
            Self::E002_SWITCHED => "Switched emotion",
            Self::E003_HAPPY_OVERRIDE => "Clear happy override",
            Self::E003_COMPLEX_OVERRIDE => "Complex emotion override",
            Self::E003_CONFUSED_RESISTED => "Confused resisted",
            Self::E004_HELD => "Held emotion kept",
            Self::E005_WINDOW_STABLE => "Window stable",
            Self::E006_FORCED_OUTPUT => "Forced output",
        }
    }

    /// Does this reason keep the previously held state?
    pub fn is_hold(&self) -> bool {
        matches!(self, Self::E004_HELD | Self::E003_CONFUSED_RESISTED)
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}

/// Why stabilization state was cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ResetReason {
    /// A session started
    R101_SESSION_START,
    /// A different session id was observed mid-run
    R102_SESSION_CHANGED,
    /// Too many consecutive empty detections (history only)
    R103_CONSECUTIVE_FAILURES,
    /// No successful detection within the watchdog bound
    R104_WATCHDOG,
    /// Requested by a consumer
    R105_MANUAL,
    /// Stabilizer strategy replaced by configuration
    R106_RECONFIGURED,
}

impl ResetReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::R101_SESSION_START => "R101_SESSION_START",
            Self::R102_SESSION_CHANGED => "R102_SESSION_CHANGED",
            Self::R103_CONSECUTIVE_FAILURES => "R103_CONSECUTIVE_FAILURES",
            Self::R104_WATCHDOG => "R104_WATCHDOG",
            Self::R105_MANUAL => "R105_MANUAL",
            Self::R106_RECONFIGURED => "R106_RECONFIGURED",
        }
    }

    /// Soft resets drop history but keep the held state
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::R103_CONSECUTIVE_FAILURES)
    }
}

impl std::fmt::Display for ResetReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}
