//! HATrend Core: signal computation and allocation decisions.
//!
//! This crate is pure computation with no I/O:
//! - Domain types (candles, signals, timeframes, portfolio snapshots)
//! - Heikin-Ashi smoothing and the up/down oscillator
//! - The per-(symbol, timeframe) cooldown gate
//! - Multi-timeframe weight aggregation
//! - Allocation diffing into buy/sell instructions
//!
//! Driving it against a market is the runner's job.

pub mod aggregate;
pub mod config;
pub mod domain;
pub mod gate;
pub mod indicators;
pub mod planner;

pub use aggregate::{Consensus, SignalAggregator, WeightBand};
pub use config::{ConfigError, StrategyConfig, TimeframeConfig};
pub use domain::{Candle, HeikinAshiCandle, PortfolioSnapshot, SignalValue, Symbol, Timeframe};
pub use gate::{CooldownGate, GateError, GateKey, GateOutput, GateTransition, RevertPolicy};
pub use indicators::{HeikinAshiTransformer, IndicatorError, OscillatorIndicator, OscillatorReading};
pub use planner::{Action, AllocationPlanner, AllocationTarget, Plan, PlanError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the runner shares across its worker
    /// pool is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<Candle>();
        require_sync::<Candle>();
        require_send::<HeikinAshiCandle>();
        require_sync::<HeikinAshiCandle>();
        require_send::<PortfolioSnapshot>();
        require_sync::<PortfolioSnapshot>();

        // Stateless computation
        require_send::<HeikinAshiTransformer>();
        require_sync::<HeikinAshiTransformer>();
        require_send::<OscillatorIndicator>();
        require_sync::<OscillatorIndicator>();
        require_send::<SignalAggregator>();
        require_sync::<SignalAggregator>();

        // Keyed stores
        require_send::<CooldownGate>();
        require_sync::<CooldownGate>();
        require_send::<AllocationPlanner>();
        require_sync::<AllocationPlanner>();

        // Errors cross thread boundaries inside reports
        require_send::<IndicatorError>();
        require_sync::<IndicatorError>();
        require_send::<GateError>();
        require_sync::<GateError>();
        require_send::<PlanError>();
        require_sync::<PlanError>();
    }

    /// The gate's step function takes the current time as an argument and
    /// never reads a clock of its own.
    #[test]
    fn gate_step_has_injected_clock() {
        fn _check(
            prev: Option<&gate::CooldownRecord>,
            raw: SignalValue,
            now: chrono::DateTime<chrono::Utc>,
        ) -> Result<(gate::CooldownRecord, GateOutput), gate::StepError> {
            gate::step(prev, raw, now, chrono::Duration::seconds(60), RevertPolicy::default())
        }
    }
}
