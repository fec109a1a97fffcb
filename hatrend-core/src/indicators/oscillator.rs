//! Up/down oscillator over Heikin-Ashi candles.
//!
//! typical[i]   = (H + L + 2C) / 4
//! baseline     = EWM(typical, period)
//! std          = rolling sample stddev(typical, period), epsilon where zero/undefined
//! normalized   = (typical - baseline) * 100 / std
//! up           = EWM(EWM(normalized, period), period)
//! down         = EWM(up, period)
//!
//! The last (up, down) pair decides the direction; the previous pair decides
//! whether the lines are converging or diverging against each other
//! ("transitioning"), which downgrades the signal to Transition and halves the
//! magnitude.

use serde::{Deserialize, Serialize};

use crate::domain::{Candle, HeikinAshiCandle, SignalValue};

use super::heikin_ashi::HeikinAshiTransformer;
use super::{ewm_of_series, rolling_std, IndicatorError};

/// Default smoothing period.
pub const DEFAULT_PERIOD: usize = 8;

/// Substituted for a zero or undefined rolling stddev.
pub const STDDEV_EPSILON: f64 = 0.001;

/// Relative tolerance under which a stddev counts as zero.
const ZERO_STD_TOLERANCE: f64 = 1e-12;

/// Output of one oscillator evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OscillatorReading {
    pub signal: SignalValue,
    /// `up - down`, halved when transitioning.
    pub magnitude: f64,
    pub up: f64,
    pub down: f64,
    pub transitioning: bool,
}

#[derive(Debug, Clone)]
pub struct OscillatorIndicator {
    period: usize,
}

impl OscillatorIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "oscillator period must be >= 2");
        Self { period }
    }

    /// Evaluate the signal on the last candle of a smoothed series.
    pub fn evaluate(&self, candles: &[HeikinAshiCandle]) -> Result<OscillatorReading, IndicatorError> {
        if candles.len() < self.period {
            return Err(IndicatorError::InsufficientData {
                needed: self.period,
                got: candles.len(),
            });
        }

        let (up, down) = self.up_down_series(candles);
        let n = up.len();
        let (up_t, down_t) = (up[n - 1], down[n - 1]);

        let transitioning = if n >= 2 {
            let (up_p, down_p) = (up[n - 2], down[n - 2]);
            (up_p > up_t && down_p < down_t) || (up_p < up_t && down_p > down_t)
        } else {
            false
        };

        // Ties fall to the bearish branch.
        let direction = if up_t > down_t {
            SignalValue::Bullish
        } else {
            SignalValue::Bearish
        };
        let signal = if transitioning {
            SignalValue::Transition
        } else {
            direction
        };

        let diff = up_t - down_t;
        let magnitude = if transitioning { diff * 0.5 } else { diff };

        Ok(OscillatorReading {
            signal,
            magnitude,
            up: up_t,
            down: down_t,
            transitioning,
        })
    }

    /// Smooth raw candles and evaluate in one step.
    pub fn evaluate_raw(&self, candles: &[Candle]) -> Result<OscillatorReading, IndicatorError> {
        let ha = HeikinAshiTransformer.transform(candles)?;
        self.evaluate(&ha)
    }

    /// Full `up` and `down` series for a smoothed candle series.
    pub fn up_down_series(&self, candles: &[HeikinAshiCandle]) -> (Vec<f64>, Vec<f64>) {
        let typical: Vec<f64> = candles
            .iter()
            .map(|c| (c.high + c.low + 2.0 * c.close) / 4.0)
            .collect();

        let baseline = ewm_of_series(&typical, self.period);
        let std = rolling_std(&typical, self.period);

        let normalized: Vec<f64> = typical
            .iter()
            .zip(&baseline)
            .zip(&std)
            .map(|((&t, &b), &s)| {
                let s = if s.is_nan() || s <= ZERO_STD_TOLERANCE * t.abs().max(1.0) {
                    STDDEV_EPSILON
                } else {
                    s
                };
                (t - b) * 100.0 / s
            })
            .collect();

        let smoothed = ewm_of_series(&normalized, self.period);
        let up = ewm_of_series(&smoothed, self.period);
        let down = ewm_of_series(&up, self.period);
        (up, down)
    }
}

impl Default for OscillatorIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD)
    }
}
