//! Rolling sample standard deviation (divide by N-1).
//!
//! Undefined (NaN) for the first `window - 1` indices and for windows of size 1.
//! Any NaN inside a window makes that window NaN.

pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if window < 2 || n < window {
        return result;
    }

    for i in (window - 1)..n {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = slice.iter().sum::<f64>() / window as f64;
        let sum_sq: f64 = slice.iter().map(|v| (v - mean).powi(2)).sum();
        result[i] = (sum_sq / (window - 1) as f64).sqrt();
    }

    result
}
