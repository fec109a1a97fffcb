//! Multi-timeframe aggregation: per-timeframe signals → allocation weight.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::{validate_weights, ConfigError, StrategyConfig};
use crate::domain::{SignalValue, Timeframe};

#[derive(Debug, Clone, PartialEq)]
pub struct SignalAggregator {
    weights: BTreeMap<Timeframe, f64>,
}

impl SignalAggregator {
    pub fn new(weights: BTreeMap<Timeframe, f64>) -> Result<Self, ConfigError> {
        validate_weights(weights.iter().map(|(tf, w)| (*tf, *w)))?;
        Ok(Self { weights })
    }

    pub fn from_config(config: &StrategyConfig) -> Result<Self, ConfigError> {
        Self::new(config.weights())
    }

    /// Weighted sum of contributions, in [0, 1].
    ///
    /// A configured timeframe missing from `signals` counts as Bearish.
    /// Timeframes that are not configured are ignored.
    pub fn weight(&self, signals: &BTreeMap<Timeframe, SignalValue>) -> f64 {
        let sum: f64 = self
            .weights
            .iter()
            .map(|(tf, w)| {
                let signal = signals.get(tf).copied().unwrap_or(SignalValue::Bearish);
                w * signal.contribution()
            })
            .sum();
        sum.clamp(0.0, 1.0)
    }
}

/// Coarse label of an allocation weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeightBand {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
}

impl WeightBand {
    pub fn from_weight(weight: f64) -> Self {
        if weight >= 0.8 {
            Self::StrongBuy
        } else if weight >= 0.5 {
            Self::Buy
        } else if weight >= 0.3 {
            Self::Neutral
        } else {
            Self::Sell
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongBuy => "STRONG_BUY",
            Self::Buy => "BUY",
            Self::Neutral => "NEUTRAL",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for WeightBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse label of the raw timeframe vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Consensus {
    StrongBuy,
    StrongSell,
    BullishTrend,
    BearishTrend,
    Consolidation,
}

impl Consensus {
    /// Unanimous votes are strong; a strict majority is a trend.
    pub fn from_signals<'a>(signals: impl IntoIterator<Item = &'a SignalValue>) -> Self {
        let (mut bull, mut bear, mut total) = (0usize, 0usize, 0usize);
        for s in signals {
            total += 1;
            match s {
                SignalValue::Bullish => bull += 1,
                SignalValue::Bearish => bear += 1,
                SignalValue::Transition => {}
            }
        }

        if total == 0 {
            Self::Consolidation
        } else if bull == total {
            Self::StrongBuy
        } else if bear == total {
            Self::StrongSell
        } else if bull * 2 > total {
            Self::BullishTrend
        } else if bear * 2 > total {
            Self::BearishTrend
        } else {
            Self::Consolidation
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongBuy => "STRONG_BUY",
            Self::StrongSell => "STRONG_SELL",
            Self::BullishTrend => "BULLISH_TREND",
            Self::BearishTrend => "BEARISH_TREND",
            Self::Consolidation => "CONSOLIDATION",
        }
    }
}

impl fmt::Display for Consensus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
