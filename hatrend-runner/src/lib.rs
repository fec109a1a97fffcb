//! HATrend Runner: drives the core against a market.
//!
//! This crate builds on `hatrend-core` to provide:
//! - Ports (traits) for candles, account, orders, lot sizes and events
//! - The rebalance orchestrator and its periodic scheduler
//! - A paper account for simulated trading
//! - Offline candle sources (CSV files, deterministic synthetic market)
//! - Event sinks (tracing, JSONL journal, channel)
//! - The TOML engine configuration with a BLAKE3 fingerprint

pub mod clock;
pub mod config;
pub mod events;
pub mod orchestrator;
pub mod paper;
pub mod ports;
pub mod scheduler;
pub mod sinks;
pub mod sources;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, EngineConfigError};
pub use events::{CycleEvent, CycleReport, CycleTrigger, FailureStage, Outcome, SignalChange, TimeframeReport};
pub use orchestrator::{CycleError, Lifecycle, Ports, RebalanceOrchestrator};
pub use paper::{LotRule, PaperAccount, StepSizeNormalizer};
pub use ports::{
    CandleSource, EventSink, ExchangeError, Execution, OrderExecutor, OrderSizeNormalizer,
    PortfolioClient, SourceError,
};
pub use scheduler::{Scheduler, SchedulerOptions, SchedulerSummary};
pub use sinks::{ChannelSink, JsonlSink, TracingSink};
pub use sources::{CsvCandleSource, SyntheticMarket};
