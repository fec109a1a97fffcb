//! Strategy parameters shared by the gate, aggregator and planner.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::Timeframe;
use crate::gate::{CooldownSchedule, RevertPolicy};
use crate::indicators::DEFAULT_PERIOD;

/// Tolerance on the sum of static timeframe weights.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Longest accepted cooldown: 30 days.
pub const MAX_COOLDOWN_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("oscillator period must be >= 2, got {0}")]
    PeriodTooSmall(usize),

    #[error("at least one timeframe must be configured")]
    NoTimeframes,

    #[error("weight for {timeframe} must be finite and non-negative, got {weight}")]
    InvalidWeight { timeframe: Timeframe, weight: f64 },

    #[error("timeframe weights must sum to 1.0, got {0}")]
    WeightSum(f64),

    #[error("cooldown for {0} must be positive")]
    ZeroCooldown(Timeframe),

    #[error("cooldown for {timeframe} is {secs}s, at most {max_secs}s allowed")]
    CooldownTooLong {
        timeframe: Timeframe,
        secs: u64,
        max_secs: u64,
    },

    #[error("cooldown for {longer} ({longer_secs}s) must exceed cooldown for {shorter} ({shorter_secs}s)")]
    CooldownOrder {
        shorter: Timeframe,
        shorter_secs: u64,
        longer: Timeframe,
        longer_secs: u64,
    },

    #[error("min_trade_threshold_usd must be finite and >= 0, got {0}")]
    InvalidThreshold(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeframeConfig {
    /// Static share of the aggregate weight.
    pub weight: f64,
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub period: usize,
    pub min_trade_threshold_usd: f64,
    pub revert_policy: RevertPolicy,
    pub timeframes: BTreeMap<Timeframe, TimeframeConfig>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        let timeframes = [
            (Timeframe::M30, 0.2, 900),
            (Timeframe::H1, 0.3, 1800),
            (Timeframe::H2, 0.5, 3600),
        ]
        .into_iter()
        .map(|(tf, weight, cooldown_secs)| {
            (
                tf,
                TimeframeConfig {
                    weight,
                    cooldown_secs,
                },
            )
        })
        .collect();

        Self {
            period: DEFAULT_PERIOD,
            min_trade_threshold_usd: 10.0,
            revert_policy: RevertPolicy::default(),
            timeframes,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period < 2 {
            return Err(ConfigError::PeriodTooSmall(self.period));
        }
        validate_weights(self.timeframes.iter().map(|(tf, c)| (*tf, c.weight)))?;

        let mut previous: Option<(Timeframe, u64)> = None;
        for (&tf, c) in &self.timeframes {
            if c.cooldown_secs == 0 {
                return Err(ConfigError::ZeroCooldown(tf));
            }
            if c.cooldown_secs > MAX_COOLDOWN_SECS {
                return Err(ConfigError::CooldownTooLong {
                    timeframe: tf,
                    secs: c.cooldown_secs,
                    max_secs: MAX_COOLDOWN_SECS,
                });
            }
            if let Some((shorter, shorter_secs)) = previous {
                if c.cooldown_secs <= shorter_secs {
                    return Err(ConfigError::CooldownOrder {
                        shorter,
                        shorter_secs,
                        longer: tf,
                        longer_secs: c.cooldown_secs,
                    });
                }
            }
            previous = Some((tf, c.cooldown_secs));
        }

        if !self.min_trade_threshold_usd.is_finite() || self.min_trade_threshold_usd < 0.0 {
            return Err(ConfigError::InvalidThreshold(self.min_trade_threshold_usd));
        }
        Ok(())
    }

    pub fn timeframe_list(&self) -> Vec<Timeframe> {
        self.timeframes.keys().copied().collect()
    }

    pub fn weights(&self) -> BTreeMap<Timeframe, f64> {
        self.timeframes.iter().map(|(tf, c)| (*tf, c.weight)).collect()
    }

    /// Cooldowns as durations. Values above `MAX_COOLDOWN_SECS` are capped;
    /// `validate` rejects them.
    pub fn cooldown_schedule(&self) -> CooldownSchedule {
        self.timeframes
            .iter()
            .fold(CooldownSchedule::new(), |s, (tf, c)| {
                let secs = c.cooldown_secs.min(MAX_COOLDOWN_SECS) as i64;
                s.with(*tf, Duration::seconds(secs))
            })
    }
}

/// Static weights: non-empty, each finite and >= 0, summing to 1.
pub(crate) fn validate_weights(
    weights: impl Iterator<Item = (Timeframe, f64)>,
) -> Result<(), ConfigError> {
    let mut sum = 0.0;
    let mut count = 0;
    for (timeframe, weight) in weights {
        if !weight.is_finite() || weight < 0.0 {
            return Err(ConfigError::InvalidWeight { timeframe, weight });
        }
        sum += weight;
        count += 1;
    }
    if count == 0 {
        return Err(ConfigError::NoTimeframes);
    }
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ConfigError::WeightSum(sum));
    }
    Ok(())
}
