//! Tri-state directional signal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directional signal of one timeframe.
///
/// The derived ordering is the direction ordinal: `Bearish < Transition < Bullish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalValue {
    Bearish,
    Transition,
    Bullish,
}

impl SignalValue {
    pub const ALL: [SignalValue; 3] = [
        SignalValue::Bearish,
        SignalValue::Transition,
        SignalValue::Bullish,
    ];

    /// Share of a timeframe's static weight this signal contributes.
    pub fn contribution(self) -> f64 {
        match self {
            Self::Bullish => 1.0,
            Self::Transition => 0.5,
            Self::Bearish => 0.0,
        }
    }

    /// Bullish or Bearish; Transition is not a direction of its own.
    pub fn is_extreme(self) -> bool {
        !matches!(self, Self::Transition)
    }

    /// The opposite extreme. Transition is its own opposite.
    pub fn opposite(self) -> Self {
        match self {
            Self::Bullish => Self::Bearish,
            Self::Bearish => Self::Bullish,
            Self::Transition => Self::Transition,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "BULLISH",
            Self::Transition => "TRANSITION",
            Self::Bearish => "BEARISH",
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
