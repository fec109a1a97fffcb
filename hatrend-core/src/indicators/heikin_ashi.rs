//! Heikin-Ashi transformer.
//!
//! HA_close[i] = (O + H + L + C) / 4
//! HA_open[0]  = (O[0] + C[0]) / 2
//! HA_open[i]  = (HA_open[i-1] + HA_close[i-1]) / 2
//! HA_high[i]  = max(HA_open[i], HA_close[i], H[i])
//! HA_low[i]   = min(HA_open[i], HA_close[i], L[i])

use crate::domain::{Candle, HeikinAshiCandle};

use super::IndicatorError;

/// Stateless Heikin-Ashi smoother.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeikinAshiTransformer;

impl HeikinAshiTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Smooth a raw candle series.
    ///
    /// Rejects empty input, non-increasing open times and negative or non-finite
    /// prices.
    pub fn transform(&self, candles: &[Candle]) -> Result<Vec<HeikinAshiCandle>, IndicatorError> {
        validate_series(candles)?;

        let mut out: Vec<HeikinAshiCandle> = Vec::with_capacity(candles.len());
        for c in candles {
            let close = (c.open + c.high + c.low + c.close) / 4.0;
            let open = match out.last() {
                None => (c.open + c.close) / 2.0,
                Some(prev) => (prev.open + prev.close) / 2.0,
            };
            out.push(HeikinAshiCandle {
                open_time: c.open_time,
                open,
                high: open.max(close).max(c.high),
                low: open.min(close).min(c.low),
                close,
                volume: c.volume,
            });
        }

        Ok(out)
    }
}

/// Check ordering and price validity of a raw series.
pub fn validate_series(candles: &[Candle]) -> Result<(), IndicatorError> {
    if candles.is_empty() {
        return Err(IndicatorError::InsufficientData { needed: 1, got: 0 });
    }

    for (i, c) in candles.iter().enumerate() {
        if !c.has_valid_prices() {
            return Err(IndicatorError::InvalidInput {
                index: i,
                reason: format!(
                    "prices must be finite and non-negative (o={}, h={}, l={}, c={})",
                    c.open, c.high, c.low, c.close
                ),
            });
        }
        if i > 0 && c.open_time <= candles[i - 1].open_time {
            return Err(IndicatorError::InvalidInput {
                index: i,
                reason: format!(
                    "open_time {} is not after previous {}",
                    c.open_time,
                    candles[i - 1].open_time
                ),
            });
        }
    }

    Ok(())
}
