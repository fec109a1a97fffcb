//! Offline candle sources.

pub mod csv_file;
pub mod synthetic;

pub use csv_file::CsvCandleSource;
pub use synthetic::SyntheticMarket;
