//! Traits for everything the orchestrator talks to outside the core.
//!
//! All ports are synchronous and must be shareable across the worker pool,
//! so implementations are `Send + Sync`. Swap them for in-memory fakes in tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hatrend_core::domain::{Candle, Timeframe};

use crate::events::CycleEvent;

/// Errors from a candle source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("symbol not found: {symbol}")]
    UnknownSymbol { symbol: String },

    #[error("malformed candle data: {0}")]
    Malformed(String),
}

/// Errors from the account or order endpoints.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExchangeError {
    #[error("exchange unavailable: {0}")]
    Unavailable(String),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("insufficient funds: need {needed:.2}, have {available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("order rejected: {0}")]
    Rejected(String),
}

/// Fill report for a market order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub executed_price: f64,
    pub executed_quantity: f64,
    pub executed_usd: f64,
}

pub trait CandleSource: Send + Sync {
    /// Up to `lookback` most recent candles, oldest first. The last one may
    /// still be forming.
    fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<Vec<Candle>, SourceError>;

    /// Human-readable source name, used in log lines.
    fn name(&self) -> &str;
}

pub trait PortfolioClient: Send + Sync {
    fn total_capital_usd(&self) -> Result<f64, ExchangeError>;
    fn holding_usd(&self, symbol: &str) -> Result<f64, ExchangeError>;
    fn current_price(&self, symbol: &str) -> Result<f64, ExchangeError>;
    fn available_cash_usd(&self) -> Result<f64, ExchangeError>;
}

pub trait OrderExecutor: Send + Sync {
    /// Spend `usd` of quote currency on `symbol`.
    fn buy_market(&self, symbol: &str, usd: f64) -> Result<Execution, ExchangeError>;
    /// Sell `quantity` of the base asset.
    fn sell_market(&self, symbol: &str, quantity: f64) -> Result<Execution, ExchangeError>;
}

/// Rounds an order quantity to what the venue accepts.
pub trait OrderSizeNormalizer: Send + Sync {
    fn normalize(&self, symbol: &str, quantity: f64) -> f64;
}

/// Receives one event per evaluated symbol.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &CycleEvent);
}
