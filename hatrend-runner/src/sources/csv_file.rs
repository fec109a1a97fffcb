//! Candles from CSV files on disk.
//!
//! One file per (symbol, timeframe): `{dir}/{SYMBOL}_{timeframe}.csv` with the
//! header `open_time,open,high,low,close,volume`, `open_time` in epoch
//! milliseconds (the exchange kline layout).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

use hatrend_core::domain::{Candle, Timeframe};

use crate::ports::{CandleSource, SourceError};

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    open_time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Debug, Clone)]
pub struct CsvCandleSource {
    dir: PathBuf,
}

impl CsvCandleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir.join(format!("{symbol}_{timeframe}.csv"))
    }

    /// Parse a whole file, oldest first.
    pub fn load_file(path: &Path) -> Result<Vec<Candle>, SourceError> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| match e.kind() {
            csv::ErrorKind::Io(io) if io.kind() == io::ErrorKind::NotFound => {
                SourceError::UnknownSymbol {
                    symbol: path.display().to_string(),
                }
            }
            _ => SourceError::Malformed(format!("{}: {e}", path.display())),
        })?;

        let mut candles = Vec::new();
        for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(|e| SourceError::Malformed(format!("{}: {e}", path.display())))?;
            let open_time = DateTime::<Utc>::from_timestamp_millis(row.open_time).ok_or_else(|| {
                SourceError::Malformed(format!(
                    "{} row {}: open_time {} out of range",
                    path.display(),
                    line + 1,
                    row.open_time
                ))
            })?;
            candles.push(Candle::new(open_time, row.open, row.high, row.low, row.close, row.volume));
        }
        Ok(candles)
    }

    /// Write candles in the layout `load_file` reads.
    pub fn write_file(path: &Path, candles: &[Candle]) -> Result<(), csv::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::Writer::from_path(path)?;
        for c in candles {
            wtr.serialize(CsvRow {
                open_time: c.open_time.timestamp_millis(),
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
            })?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl CandleSource for CsvCandleSource {
    fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<Vec<Candle>, SourceError> {
        let path = self.file_path(symbol, timeframe);
        let mut candles = Self::load_file(&path).map_err(|e| match e {
            SourceError::UnknownSymbol { .. } => SourceError::UnknownSymbol {
                symbol: symbol.to_string(),
            },
            other => other,
        })?;
        let skip = candles.len().saturating_sub(lookback);
        candles.drain(..skip);
        Ok(candles)
    }

    fn name(&self) -> &str {
        "csv"
    }
}
