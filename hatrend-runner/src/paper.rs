//! In-memory paper account and lot-size normalization.
//!
//! `PaperAccount` implements both account ports so the engine can run end to
//! end without an exchange. Prices come from explicit marks or, failing that,
//! the last close of a candle source.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hatrend_core::domain::{Symbol, Timeframe};

use crate::ports::{
    CandleSource, ExchangeError, Execution, OrderExecutor, OrderSizeNormalizer, PortfolioClient,
    SourceError,
};

/// Tolerance when comparing order sizes against balances.
const BALANCE_EPSILON: f64 = 1e-9;

/// Exchange lot filter for one symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LotRule {
    pub step_size: f64,
    pub min_qty: f64,
}

impl Default for LotRule {
    fn default() -> Self {
        Self {
            step_size: 1e-5,
            min_qty: 1e-5,
        }
    }
}

/// Floors a quantity to the step size, then raises it to the minimum.
#[derive(Debug, Clone, Default)]
pub struct StepSizeNormalizer {
    default: LotRule,
    rules: HashMap<Symbol, LotRule>,
}

impl StepSizeNormalizer {
    pub fn new(default: LotRule) -> Self {
        Self {
            default,
            rules: HashMap::new(),
        }
    }

    pub fn with_rule(mut self, symbol: impl Into<Symbol>, rule: LotRule) -> Self {
        self.rules.insert(symbol.into(), rule);
        self
    }

    pub fn rule(&self, symbol: &str) -> LotRule {
        self.rules.get(symbol).copied().unwrap_or(self.default)
    }
}

impl OrderSizeNormalizer for StepSizeNormalizer {
    fn normalize(&self, symbol: &str, quantity: f64) -> f64 {
        if !(quantity > 0.0) {
            return 0.0;
        }
        let LotRule { step_size, min_qty } = self.rule(symbol);
        let floored = if step_size > 0.0 {
            // Nudge so 0.3 / 0.1 does not floor to 2.
            ((quantity / step_size) + BALANCE_EPSILON).floor() * step_size
        } else {
            quantity
        };
        floored.max(min_qty)
    }
}

#[derive(Debug, Default)]
struct PaperState {
    cash_usd: f64,
    quantities: BTreeMap<Symbol, f64>,
    marks: HashMap<Symbol, f64>,
}

pub struct PaperAccount {
    state: Mutex<PaperState>,
    prices: Option<(Arc<dyn CandleSource>, Timeframe)>,
}

impl PaperAccount {
    pub fn new(cash_usd: f64) -> Self {
        Self {
            state: Mutex::new(PaperState {
                cash_usd,
                ..PaperState::default()
            }),
            prices: None,
        }
    }

    /// Price unmarked symbols from the last close of `timeframe` candles.
    pub fn with_price_source(mut self, source: Arc<dyn CandleSource>, timeframe: Timeframe) -> Self {
        self.prices = Some((source, timeframe));
        self
    }

    pub fn with_position(self, symbol: impl Into<Symbol>, quantity: f64) -> Self {
        self.state().quantities.insert(symbol.into(), quantity);
        self
    }

    /// Fix the price of a symbol.
    pub fn mark(&self, symbol: impl Into<Symbol>, price: f64) {
        self.state().marks.insert(symbol.into(), price);
    }

    pub fn cash_usd(&self) -> f64 {
        self.state().cash_usd
    }

    pub fn quantity(&self, symbol: &str) -> f64 {
        self.state().quantities.get(symbol).copied().unwrap_or(0.0)
    }

    fn state(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        if let Some(&p) = self.state().marks.get(symbol) {
            return Ok(p);
        }
        let Some((source, timeframe)) = &self.prices else {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        };
        let candles = source.candles(symbol, *timeframe, 1).map_err(|e| match e {
            SourceError::UnknownSymbol { .. } => ExchangeError::UnknownSymbol(symbol.to_string()),
            other => ExchangeError::Unavailable(other.to_string()),
        })?;
        candles
            .last()
            .map(|c| c.close)
            .filter(|p| *p > 0.0)
            .ok_or_else(|| ExchangeError::Unavailable(format!("no price for {symbol}")))
    }
}

impl PortfolioClient for PaperAccount {
    fn total_capital_usd(&self) -> Result<f64, ExchangeError> {
        let (cash, positions) = {
            let state = self.state();
            (state.cash_usd, state.quantities.clone())
        };
        let mut total = cash;
        for (symbol, qty) in positions {
            if qty > 0.0 {
                total += qty * self.price(&symbol)?;
            }
        }
        Ok(total)
    }

    fn holding_usd(&self, symbol: &str) -> Result<f64, ExchangeError> {
        let qty = self.quantity(symbol);
        if qty <= 0.0 {
            return Ok(0.0);
        }
        Ok(qty * self.price(symbol)?)
    }

    fn current_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        self.price(symbol)
    }

    fn available_cash_usd(&self) -> Result<f64, ExchangeError> {
        Ok(self.cash_usd())
    }
}

impl OrderExecutor for PaperAccount {
    fn buy_market(&self, symbol: &str, usd: f64) -> Result<Execution, ExchangeError> {
        if !(usd > 0.0) {
            return Err(ExchangeError::Rejected(format!("buy amount must be positive, got {usd}")));
        }
        let price = self.price(symbol)?;

        let mut state = self.state();
        if usd > state.cash_usd + BALANCE_EPSILON {
            return Err(ExchangeError::InsufficientFunds {
                needed: usd,
                available: state.cash_usd,
            });
        }
        let quantity = usd / price;
        state.cash_usd = (state.cash_usd - usd).max(0.0);
        *state.quantities.entry(symbol.to_string()).or_insert(0.0) += quantity;

        Ok(Execution {
            executed_price: price,
            executed_quantity: quantity,
            executed_usd: usd,
        })
    }

    fn sell_market(&self, symbol: &str, quantity: f64) -> Result<Execution, ExchangeError> {
        if !(quantity > 0.0) {
            return Err(ExchangeError::Rejected(format!(
                "sell quantity must be positive, got {quantity}"
            )));
        }
        let price = self.price(symbol)?;

        let mut state = self.state();
        let held = state.quantities.get(symbol).copied().unwrap_or(0.0);
        if quantity > held + BALANCE_EPSILON {
            return Err(ExchangeError::InsufficientFunds {
                needed: quantity,
                available: held,
            });
        }
        let usd = quantity * price;
        state.quantities.insert(symbol.to_string(), (held - quantity).max(0.0));
        state.cash_usd += usd;

        Ok(Execution {
            executed_price: price,
            executed_quantity: quantity,
            executed_usd: usd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sources::SyntheticMarket;
    use chrono::{TimeZone, Utc};

    #[test]
    fn normalizer_floors_then_raises_to_min() {
        let n = StepSizeNormalizer::new(LotRule {
            step_size: 0.1,
            min_qty: 0.5,
        })
        .with_rule(
            "BTCUSDC",
            LotRule {
                step_size: 0.001,
                min_qty: 0.001,
            },
        );
        assert!((n.normalize("SOLUSDC", 1.37) - 1.3).abs() < 1e-12);
        assert!((n.normalize("SOLUSDC", 0.3) - 0.5).abs() < 1e-12);
        assert!((n.normalize("SOLUSDC", 0.7) - 0.7).abs() < 1e-12);
        assert!((n.normalize("BTCUSDC", 0.02349) - 0.023).abs() < 1e-12);
        assert_eq!(n.normalize("BTCUSDC", 0.0), 0.0);
    }

    #[test]
    fn buy_and_sell_move_cash_and_quantity() {
        let account = PaperAccount::new(1_000.0);
        account.mark("BTCUSDC", 50.0);

        let fill = account.buy_market("BTCUSDC", 200.0).unwrap();
        assert_eq!(fill.executed_quantity, 4.0);
        assert_eq!(account.cash_usd(), 800.0);
        assert_eq!(account.holding_usd("BTCUSDC").unwrap(), 200.0);
        assert_eq!(account.total_capital_usd().unwrap(), 1_000.0);

        account.mark("BTCUSDC", 60.0);
        let fill = account.sell_market("BTCUSDC", 1.0).unwrap();
        assert_eq!(fill.executed_usd, 60.0);
        assert_eq!(account.quantity("BTCUSDC"), 3.0);
        assert_eq!(account.total_capital_usd().unwrap(), 860.0 + 180.0);
    }

    #[test]
    fn overspending_is_rejected() {
        let account = PaperAccount::new(100.0);
        account.mark("SOLUSDC", 10.0);
        assert!(matches!(
            account.buy_market("SOLUSDC", 150.0),
            Err(ExchangeError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            account.sell_market("SOLUSDC", 1.0),
            Err(ExchangeError::InsufficientFunds { .. })
        ));
        assert!(matches!(account.buy_market("SOLUSDC", 0.0), Err(ExchangeError::Rejected(_))));
    }

    #[test]
    fn unpriced_symbol_is_unknown() {
        let account = PaperAccount::new(100.0);
        assert_eq!(
            account.current_price("XLMUSDC"),
            Err(ExchangeError::UnknownSymbol("XLMUSDC".into()))
        );
        // No position needs no price.
        assert_eq!(account.holding_usd("XLMUSDC").unwrap(), 0.0);
    }

    #[test]
    fn prices_from_candle_source() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
        let market = Arc::new(SyntheticMarket::new(clock));
        let expected = market.last_price("LINKUSDC", Timeframe::M30).unwrap();
        let account = PaperAccount::new(0.0)
            .with_price_source(market, Timeframe::M30)
            .with_position("LINKUSDC", 2.0);
        assert_eq!(account.current_price("LINKUSDC").unwrap(), expected);
        assert_eq!(account.total_capital_usd().unwrap(), 2.0 * expected);
    }
}
