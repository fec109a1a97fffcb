//! Engine configuration file (TOML).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use hatrend_core::config::{ConfigError, StrategyConfig};
use hatrend_core::domain::Symbol;

pub const DEFAULT_SYMBOLS: [&str; 5] = ["BTCUSDC", "FETUSDC", "LINKUSDC", "XLMUSDC", "SOLUSDC"];

/// Tolerance on the sum of base shares.
const SHARE_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum EngineConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("strategy: {0}")]
    Strategy(#[from] ConfigError),

    #[error("at least one symbol must be configured")]
    NoSymbols,

    #[error("symbol {0} listed more than once")]
    DuplicateSymbol(Symbol),

    #[error("base share for {symbol} must be in (0, 1], got {share}")]
    BaseShare { symbol: Symbol, share: f64 },

    #[error("base share given for {0}, which is not in the symbol list")]
    UnlistedBaseShare(Symbol),

    #[error("base shares sum to {0}, more than 1")]
    BaseShareSum(f64),

    #[error("workers must be >= 1")]
    NoWorkers,

    #[error("update interval must be >= 1 second")]
    ZeroInterval,

    #[error("lookback {lookback} is shorter than the oscillator period {period}")]
    LookbackTooShort { lookback: usize, period: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub symbols: Vec<Symbol>,
    pub update_interval_secs: u64,
    /// Candles fetched per timeframe.
    pub lookback: usize,
    pub workers: usize,
    /// When false, orders are logged as `[SIM]` and never sent.
    pub trading_enabled: bool,
    /// Share of total capital per symbol; unlisted symbols get 1/N.
    pub base_shares: BTreeMap<Symbol, f64>,
    pub strategy: StrategyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            update_interval_secs: 1,
            lookback: 100,
            workers: 4,
            trading_enabled: false,
            base_shares: BTreeMap::new(),
            strategy: StrategyConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self, EngineConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| EngineConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, EngineConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, EngineConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), EngineConfigError> {
        self.strategy.validate()?;

        if self.symbols.is_empty() {
            return Err(EngineConfigError::NoSymbols);
        }
        let mut seen = HashSet::new();
        for s in &self.symbols {
            if !seen.insert(s.as_str()) {
                return Err(EngineConfigError::DuplicateSymbol(s.clone()));
            }
        }

        for (symbol, &share) in &self.base_shares {
            if !seen.contains(symbol.as_str()) {
                return Err(EngineConfigError::UnlistedBaseShare(symbol.clone()));
            }
            if !(share > 0.0 && share <= 1.0) {
                return Err(EngineConfigError::BaseShare {
                    symbol: symbol.clone(),
                    share,
                });
            }
        }
        let sum: f64 = self.symbols.iter().map(|s| self.base_share(s)).sum();
        if sum > 1.0 + SHARE_SUM_TOLERANCE {
            return Err(EngineConfigError::BaseShareSum(sum));
        }

        if self.workers == 0 {
            return Err(EngineConfigError::NoWorkers);
        }
        if self.update_interval_secs == 0 {
            return Err(EngineConfigError::ZeroInterval);
        }
        if self.lookback < self.strategy.period {
            return Err(EngineConfigError::LookbackTooShort {
                lookback: self.lookback,
                period: self.strategy.period,
            });
        }
        Ok(())
    }

    pub fn base_share(&self, symbol: &str) -> f64 {
        self.base_shares
            .get(symbol)
            .copied()
            .unwrap_or(1.0 / self.symbols.len().max(1) as f64)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    /// BLAKE3 of the canonical JSON form. Identical configs share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).expect("EngineConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
