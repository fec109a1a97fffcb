//! Exponentially weighted moving average (span form, no bias adjustment).
//!
//! alpha = 2 / (period + 1)
//! EWM[0] = x[0]
//! EWM[t] = EWM[t-1] + alpha * (x[t] - EWM[t-1])
//!
//! Unlike a classic EMA there is no SMA seed and no warmup: every index has a
//! value. Written in increment form so a constant input yields that constant
//! exactly, with no rounding drift.

/// Compute the EWM of an arbitrary series.
///
/// NaN inputs are skipped: the previous average carries forward (and a leading
/// NaN stays NaN until the first finite value seeds the average).
pub fn ewm_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if period == 0 {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev: Option<f64> = None;

    for (i, &v) in values.iter().enumerate() {
        let next = match (prev, v.is_nan()) {
            (None, true) => None,
            (None, false) => Some(v),
            (Some(p), true) => Some(p),
            (Some(p), false) => Some(p + alpha * (v - p)),
        };
        if let Some(n) = next {
            result[i] = n;
        }
        prev = next;
    }

    result
}
