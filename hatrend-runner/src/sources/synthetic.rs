//! Deterministic synthetic market for offline runs.
//!
//! Each (symbol, timeframe) gets a few overlapping cycles whose periods,
//! amplitudes and phases are drawn from an RNG seeded with BLAKE3 of the pair.
//! Prices are a function of the candle index on the timeframe grid, so a candle
//! looks the same no matter when or with what lookback it is requested.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;
use std::sync::Arc;

use hatrend_core::domain::{Candle, Timeframe};

use crate::clock::Clock;
use crate::ports::{CandleSource, SourceError};

#[derive(Debug, Clone, Copy)]
struct Wave {
    amplitude: f64,
    period: f64,
    phase: f64,
}

pub struct SyntheticMarket {
    clock: Arc<dyn Clock>,
    start_price: f64,
    /// Upper bound on the combined relative swing around `start_price`.
    swing: f64,
}

impl SyntheticMarket {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            start_price: 100.0,
            swing: 0.3,
        }
    }

    fn waves(&self, symbol: &str, timeframe: Timeframe) -> [Wave; 3] {
        let seed = blake3::hash(format!("{symbol}:{timeframe}").as_bytes());
        let mut rng = StdRng::from_seed(*seed.as_bytes());
        let amp = self.swing / 3.0;
        [(20.0, 60.0), (60.0, 150.0), (150.0, 400.0)].map(|(lo, hi)| Wave {
            amplitude: rng.gen_range(amp * 0.3..=amp),
            period: rng.gen_range(lo..hi),
            phase: rng.gen_range(0.0..TAU),
        })
    }

    fn price_at(&self, waves: &[Wave; 3], index: i64) -> f64 {
        let x = index as f64;
        let offset: f64 = waves
            .iter()
            .map(|w| w.amplitude * (TAU * x / w.period + w.phase).sin())
            .sum();
        self.start_price * (1.0 + offset)
    }

    /// The `lookback` candles up to and including the one containing `now`.
    pub fn generate(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        now: DateTime<Utc>,
        lookback: usize,
    ) -> Vec<Candle> {
        let step_secs = timeframe.duration().num_seconds().max(1);
        let current = now.timestamp().div_euclid(step_secs);
        let waves = self.waves(symbol, timeframe);

        let first = current - lookback as i64 + 1;
        (first..=current)
            .filter_map(|index| {
                let open_time = DateTime::<Utc>::from_timestamp(index * step_secs, 0)?;
                let open = self.price_at(&waves, index - 1);
                let close = self.price_at(&waves, index);

                let wick_seed = blake3::hash(format!("{symbol}:{timeframe}:{index}").as_bytes());
                let mut rng = StdRng::from_seed(*wick_seed.as_bytes());
                let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.004));
                let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.004));
                let volume = rng.gen_range(100.0..10_000.0);

                Some(Candle::new(open_time, open, high, low, close, volume))
            })
            .collect()
    }

    pub fn last_price(&self, symbol: &str, timeframe: Timeframe) -> Option<f64> {
        self.generate(symbol, timeframe, self.clock.now(), 1)
            .last()
            .map(|c| c.close)
    }
}

impl CandleSource for SyntheticMarket {
    fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<Vec<Candle>, SourceError> {
        if symbol.is_empty() {
            return Err(SourceError::UnknownSymbol {
                symbol: symbol.to_string(),
            });
        }
        Ok(self.generate(symbol, timeframe, self.clock.now(), lookback))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
