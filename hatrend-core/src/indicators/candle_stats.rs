//! Presentation statistics of the in-progress candle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Timeframe};

/// Movement and elapsed share of the last (usually still forming) candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandleStats {
    /// `(close - open) / open * 100`, 0 when open is 0.
    pub movement_pct: f64,
    /// Elapsed fraction of the candle, in [0, 1].
    pub progress: f64,
    pub last_close: f64,
}

impl CandleStats {
    /// Stats of the last raw candle. `None` for an empty series.
    pub fn of_last(candles: &[Candle], timeframe: Timeframe, now: DateTime<Utc>) -> Option<Self> {
        let last = candles.last()?;
        let movement_pct = if last.open == 0.0 {
            0.0
        } else {
            (last.close - last.open) / last.open * 100.0
        };
        Some(Self {
            movement_pct,
            progress: timeframe.progress(last.open_time, now),
            last_close: last.close,
        })
    }
}
