//! Emotion label definitions

use colored::Color;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::types::EngineError;

/// Closed set of labels the classifiers can produce.
///
/// The engine treats labels as opaque tags; only the bias rules single out
/// `Neutral`, `Happy`, `Confused` and the complex subset.
///
/// Deserialization goes through `FromStr`, so wire input gets the same
/// case folding and alias table as the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum EmotionLabel {
    Happy,
    Sad,
    Neutral,
    Angry,
    Surprised,
    Fearful,
    Disgusted,
    Contempt,
    Confused,
    Stressed,
    Anxious,
    Depressed,
    Calm,
    /// Audio sentinel: utterance too short to classify
    #[serde(rename = "too short")]
    TooShort,
    /// Audio sentinel: utterance too quiet
    #[serde(rename = "too soft")]
    TooSoft,
    /// Audio sentinel: utterance too noisy
    #[serde(rename = "too noisy")]
    TooNoisy,
}

impl EmotionLabel {
    /// Every label, in declaration order
    pub const ALL: [EmotionLabel; 16] = [
        Self::Happy,
        Self::Sad,
        Self::Neutral,
        Self::Angry,
        Self::Surprised,
        Self::Fearful,
        Self::Disgusted,
        Self::Contempt,
        Self::Confused,
        Self::Stressed,
        Self::Anxious,
        Self::Depressed,
        Self::Calm,
        Self::TooShort,
        Self::TooSoft,
        Self::TooNoisy,
    ];

    /// Canonical name (also the serde name)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Neutral => "neutral",
            Self::Angry => "angry",
            Self::Surprised => "surprised",
            Self::Fearful => "fearful",
            Self::Disgusted => "disgusted",
            Self::Contempt => "contempt",
            Self::Confused => "confused",
            Self::Stressed => "stressed",
            Self::Anxious => "anxious",
            Self::Depressed => "depressed",
            Self::Calm => "calm",
            Self::TooShort => "too short",
            Self::TooSoft => "too soft",
            Self::TooNoisy => "too noisy",
        }
    }

    /// Complex emotions get a lowered bar when overriding a held label
    pub fn is_complex(&self) -> bool {
        matches!(self, Self::Confused | Self::Stressed | Self::Anxious)
    }

    /// Terminal color for display
    pub fn color(&self) -> Color {
        match self {
            Self::Happy | Self::Calm => Color::Green,
            Self::Neutral => Color::White,
            Self::Sad | Self::Depressed => Color::Blue,
            Self::Angry | Self::Contempt | Self::Disgusted => Color::Red,
            Self::Surprised => Color::Cyan,
            Self::Fearful | Self::Anxious | Self::Stressed => Color::Yellow,
            Self::Confused => Color::Magenta,
            Self::TooShort | Self::TooSoft | Self::TooNoisy => Color::BrightBlack,
        }
    }

    /// Emoji for display
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Happy => "😊",
            Self::Sad => "😢",
            Self::Neutral => "😐",
            Self::Angry => "😠",
            Self::Surprised => "😮",
            Self::Fearful => "😨",
            Self::Disgusted => "🤢",
            Self::Contempt => "😒",
            Self::Confused => "😕",
            Self::Stressed => "😣",
            Self::Anxious => "😰",
            Self::Depressed => "😞",
            Self::Calm => "😌",
            Self::TooShort | Self::TooSoft | Self::TooNoisy => "🔇",
        }
    }
}

impl FromStr for EmotionLabel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        let label = match normalized.as_str() {
            "happy" | "happiness" => Self::Happy,
            "sad" | "sadness" => Self::Sad,
            "neutral" => Self::Neutral,
            "angry" | "anger" => Self::Angry,
            "surprised" | "surprise" => Self::Surprised,
            "fearful" | "fear" => Self::Fearful,
            "disgusted" | "disgust" => Self::Disgusted,
            "contempt" | "contemptuous" => Self::Contempt,
            "confused" => Self::Confused,
            "stressed" => Self::Stressed,
            "anxious" => Self::Anxious,
            "depressed" => Self::Depressed,
            "calm" => Self::Calm,
            "too short" => Self::TooShort,
            "too soft" => Self::TooSoft,
            "too noisy" => Self::TooNoisy,
            _ => return Err(EngineError::UnknownLabel(s.to_string())),
        };
        Ok(label)
    }
}

impl TryFrom<String> for EmotionLabel {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
