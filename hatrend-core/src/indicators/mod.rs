//! Indicator pipeline: Heikin-Ashi smoothing feeding the up/down oscillator.
//!
//! Everything here is a pure function of its input series. The series helpers
//! (`ewm_of_series`, `rolling_std`) return a `Vec<f64>` of the same length as the
//! input, with `f64::NAN` where a value is undefined.

pub mod candle_stats;
pub mod ewm;
pub mod heikin_ashi;
pub mod oscillator;
pub mod stddev;

pub use candle_stats::CandleStats;
pub use ewm::ewm_of_series;
pub use heikin_ashi::HeikinAshiTransformer;
pub use oscillator::{OscillatorIndicator, OscillatorReading, DEFAULT_PERIOD, STDDEV_EPSILON};
pub use stddev::rolling_std;

use thiserror::Error;

/// Errors from candle validation and indicator evaluation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IndicatorError {
    #[error("insufficient data: need at least {needed} candles, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("invalid input at index {index}: {reason}")]
    InvalidInput { index: usize, reason: String },
}

/// Create synthetic candles from close prices for testing.
///
/// Generates plausible OHLC: open = prev_close (or close for first candle),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000,
/// one candle per hour starting 2024-01-02T00:00Z.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<crate::domain::Candle> {
    use crate::domain::Candle;
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                open_time: base + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
