//! Domain types for HATrend

pub mod candle;
pub mod portfolio;
pub mod signal;
pub mod timeframe;

pub use candle::{Candle, HeikinAshiCandle};
pub use portfolio::PortfolioSnapshot;
pub use signal::SignalValue;
pub use timeframe::{ParseTimeframeError, Timeframe};

/// Symbol type alias
pub type Symbol = String;
