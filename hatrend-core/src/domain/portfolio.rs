//! Portfolio snapshot: read-only view of the account for one evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Symbol;

/// Account state captured once per symbol per cycle.
///
/// Valuation and sizing both read from the same snapshot so a cycle never mixes
/// stale and fresh prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub total_capital_usd: f64,
    pub holdings_usd: BTreeMap<Symbol, f64>,
    pub prices: BTreeMap<Symbol, f64>,
    pub available_cash_usd: f64,
    pub taken_at: DateTime<Utc>,
}

impl PortfolioSnapshot {
    pub fn new(total_capital_usd: f64, available_cash_usd: f64, taken_at: DateTime<Utc>) -> Self {
        Self {
            total_capital_usd,
            holdings_usd: BTreeMap::new(),
            prices: BTreeMap::new(),
            available_cash_usd,
            taken_at,
        }
    }

    /// Builder-style helper to add one symbol's holding and price.
    pub fn with_position(mut self, symbol: impl Into<Symbol>, holding_usd: f64, price: f64) -> Self {
        let symbol = symbol.into();
        self.holdings_usd.insert(symbol.clone(), holding_usd);
        self.prices.insert(symbol, price);
        self
    }

    pub fn holding_usd(&self, symbol: &str) -> Option<f64> {
        self.holdings_usd.get(symbol).copied()
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }
}
