//! Rebalance orchestrator: one evaluation cycle across the symbol universe.
//!
//! Per symbol: fetch candles for every timeframe (in parallel), evaluate the
//! oscillator, gate each raw signal, aggregate into a weight and, if the weight
//! moved (or the cycle is forced or manual), plan and submit the trade.
//!
//! Symbols run on a private rayon pool bounded by `workers`. A per-symbol
//! mutex keeps a manual pass and a periodic tick for the same symbol from
//! interleaving.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use thiserror::Error;

use hatrend_core::domain::{PortfolioSnapshot, SignalValue, Symbol, Timeframe};
use hatrend_core::gate::{CooldownGate, GateError, GateKey};
use hatrend_core::indicators::{CandleStats, OscillatorIndicator, OscillatorReading};
use hatrend_core::planner::{Action, AllocationPlanner};
use hatrend_core::{Consensus, SignalAggregator, WeightBand};

use crate::clock::Clock;
use crate::config::{EngineConfig, EngineConfigError};
use crate::events::{
    CycleEvent, CycleReport, CycleTrigger, FailureStage, Outcome, SignalChange, TimeframeReport,
};
use crate::ports::{
    CandleSource, EventSink, ExchangeError, OrderExecutor, OrderSizeNormalizer, PortfolioClient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Init,
    Running,
    Stopped,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("config error: {0}")]
    Config(#[from] EngineConfigError),

    #[error("orchestrator is {0:?}, no further cycles accepted")]
    Lifecycle(Lifecycle),

    #[error("gate error: {0}")]
    Gate(#[from] GateError),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// External collaborators.
#[derive(Clone)]
pub struct Ports {
    pub candles: Arc<dyn CandleSource>,
    pub portfolio: Arc<dyn PortfolioClient>,
    pub executor: Arc<dyn OrderExecutor>,
    pub normalizer: Arc<dyn OrderSizeNormalizer>,
    pub clock: Arc<dyn Clock>,
    pub sinks: Vec<Arc<dyn EventSink>>,
}

pub struct RebalanceOrchestrator {
    config: EngineConfig,
    ports: Ports,
    timeframes: Vec<Timeframe>,
    oscillator: OscillatorIndicator,
    gate: CooldownGate,
    aggregator: SignalAggregator,
    planner: AllocationPlanner,
    pool: rayon::ThreadPool,
    symbol_locks: HashMap<Symbol, Mutex<()>>,
    /// Weight seen on each symbol's previous evaluation, for change notices.
    seen_weights: Mutex<HashMap<Symbol, f64>>,
    lifecycle: Mutex<Lifecycle>,
    initial_pending: AtomicBool,
    cycles: AtomicU64,
    cancel: Arc<AtomicBool>,
}

impl RebalanceOrchestrator {
    pub fn new(config: EngineConfig, ports: Ports) -> Result<Self, CycleError> {
        config.validate()?;

        let aggregator =
            SignalAggregator::from_config(&config.strategy).map_err(EngineConfigError::from)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("hatrend-pool-{i}"))
            .build()?;

        tracing::info!(
            fingerprint = %config.fingerprint(),
            symbols = config.symbols.len(),
            timeframes = config.strategy.timeframes.len(),
            workers = config.workers,
            trading_enabled = config.trading_enabled,
            source = ports.candles.name(),
            "orchestrator configured"
        );

        Ok(Self {
            timeframes: config.strategy.timeframe_list(),
            oscillator: OscillatorIndicator::new(config.strategy.period),
            gate: CooldownGate::from_config(&config.strategy),
            aggregator,
            planner: AllocationPlanner::new(config.strategy.min_trade_threshold_usd),
            pool,
            symbol_locks: config
                .symbols
                .iter()
                .map(|s| (s.clone(), Mutex::new(())))
                .collect(),
            seen_weights: Mutex::new(HashMap::new()),
            lifecycle: Mutex::new(Lifecycle::Init),
            initial_pending: AtomicBool::new(true),
            cycles: AtomicU64::new(0),
            cancel: Arc::new(AtomicBool::new(false)),
            config,
            ports,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gate(&self) -> &CooldownGate {
        &self.gate
    }

    pub fn planner(&self) -> &AllocationPlanner {
        &self.planner
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *lock(&self.lifecycle)
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Flag checked before every order submission.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Graceful stop: a cycle in flight completes, later cycles are refused.
    pub fn stop(&self) {
        *lock(&self.lifecycle) = Lifecycle::Stopped;
    }

    /// Forced stop: orders not yet submitted are discarded.
    pub fn abort(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.stop();
    }

    pub fn run_cycle(&self, trigger: CycleTrigger) -> Result<CycleReport, CycleError> {
        {
            let mut state = lock(&self.lifecycle);
            match *state {
                Lifecycle::Stopped => return Err(CycleError::Lifecycle(Lifecycle::Stopped)),
                Lifecycle::Init => *state = Lifecycle::Running,
                Lifecycle::Running => {}
            }
        }

        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let forced = self.initial_pending.swap(false, Ordering::SeqCst);
        let started_at = self.ports.clock.now();
        let timer = Instant::now();
        tracing::debug!(cycle, %trigger, forced, "cycle started");

        let results: Vec<Result<CycleEvent, GateError>> = self.pool.install(|| {
            self.config
                .symbols
                .par_iter()
                .map(|symbol| self.run_symbol(symbol, cycle, trigger, forced))
                .collect()
        });

        let mut events = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::error!(cycle, error = %e, "cycle aborted by gate error");
                    first_error.get_or_insert(e);
                }
            }
        }

        for event in &events {
            for sink in &self.ports.sinks {
                sink.emit(event);
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }

        let report = CycleReport {
            cycle,
            trigger,
            forced,
            started_at,
            cancelled: self.cancel.load(Ordering::SeqCst),
            events,
        };
        tracing::info!(
            cycle,
            %trigger,
            forced,
            trades = report.trades(),
            failures = report.failures(),
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "cycle complete"
        );
        Ok(report)
    }

    fn run_symbol(
        &self,
        symbol: &str,
        cycle: u64,
        trigger: CycleTrigger,
        forced: bool,
    ) -> Result<CycleEvent, GateError> {
        let _serial = self.symbol_locks.get(symbol).map(lock);
        let now = self.ports.clock.now();

        let evaluations: Vec<(Timeframe, Result<(OscillatorReading, Option<CandleStats>), String>)> =
            self.timeframes
                .par_iter()
                .map(|&tf| (tf, self.evaluate_timeframe(symbol, tf, now)))
                .collect();

        let mut reports = Vec::with_capacity(evaluations.len());
        let mut signals = BTreeMap::new();
        let mut raw_votes = Vec::with_capacity(evaluations.len());
        for (timeframe, evaluation) in evaluations {
            let report = match evaluation {
                Ok((reading, stats)) => {
                    let out = self
                        .gate
                        .evaluate(&GateKey::new(symbol, timeframe), reading.signal, now)?;
                    raw_votes.push(reading.signal);
                    TimeframeReport {
                        timeframe,
                        raw: Some(reading.signal),
                        effective: out.effective,
                        magnitude: Some(reading.magnitude),
                        transition: Some(out.transition),
                        stats,
                        error: None,
                    }
                }
                // Failed timeframes vote Bearish and leave the gate alone.
                Err(error) => {
                    raw_votes.push(SignalValue::Bearish);
                    TimeframeReport {
                        timeframe,
                        raw: None,
                        effective: SignalValue::Bearish,
                        magnitude: None,
                        transition: None,
                        stats: None,
                        error: Some(error),
                    }
                }
            };
            signals.insert(timeframe, report.effective);
            reports.push(report);
        }

        let weight = self.aggregator.weight(&signals);
        // Manual passes still record the weight but raise no change notice.
        let previous = lock(&self.seen_weights).insert(symbol.to_string(), weight);
        let change = previous
            .filter(|old| *old != weight && trigger == CycleTrigger::Periodic)
            .map(|old| SignalChange::new(old, weight));

        let mut event = CycleEvent {
            cycle,
            trigger,
            at: now,
            symbol: symbol.to_string(),
            timeframes: reports,
            weight,
            band: WeightBand::from_weight(weight),
            consensus: Consensus::from_signals(&raw_votes),
            change,
            action: None,
            outcome: Outcome::Skipped,
        };

        let last = self.planner.last_weight(symbol);
        let moved = last.map_or(true, |lw| (weight - lw).abs() > 0.0);
        if !(forced || trigger == CycleTrigger::Manual || moved) {
            return Ok(event);
        }

        let snapshot = match self.snapshot(symbol, now) {
            Ok(s) => s,
            Err(e) => {
                event.outcome = failed(FailureStage::Snapshot, e);
                return Ok(event);
            }
        };
        let plan = match self
            .planner
            .plan(symbol, weight, &snapshot, self.config.base_share(symbol))
        {
            Ok(p) => p,
            Err(e) => {
                event.outcome = failed(FailureStage::Plan, e);
                return Ok(event);
            }
        };
        event.action = Some(plan.action);
        event.outcome = self.submit(symbol, plan.action);
        Ok(event)
    }

    fn evaluate_timeframe(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Result<(OscillatorReading, Option<CandleStats>), String> {
        let candles = self
            .ports
            .candles
            .candles(symbol, timeframe, self.config.lookback)
            .map_err(|e| e.to_string())?;
        let stats = CandleStats::of_last(&candles, timeframe, now);
        let reading = self
            .oscillator
            .evaluate_raw(&candles)
            .map_err(|e| e.to_string())?;
        Ok((reading, stats))
    }

    fn snapshot(&self, symbol: &str, now: DateTime<Utc>) -> Result<PortfolioSnapshot, ExchangeError> {
        let p = &self.ports.portfolio;
        let total = p.total_capital_usd()?;
        let cash = p.available_cash_usd()?;
        let holding = p.holding_usd(symbol)?;
        let price = p.current_price(symbol)?;
        Ok(PortfolioSnapshot::new(total, cash, now).with_position(symbol, holding, price))
    }

    fn submit(&self, symbol: &str, action: Action) -> Outcome {
        if !action.is_trade() {
            return Outcome::NoAction;
        }
        if self.cancel.load(Ordering::SeqCst) {
            // Re-plan from scratch when the engine comes back.
            self.planner.invalidate(symbol);
            return Outcome::Cancelled;
        }
        if !self.config.trading_enabled {
            return Outcome::Simulated;
        }

        let result = match action {
            Action::Buy { amount_usd, .. } => self.ports.executor.buy_market(symbol, amount_usd),
            Action::Sell { quantity } => {
                let quantity = self.ports.normalizer.normalize(symbol, quantity);
                self.ports.executor.sell_market(symbol, quantity)
            }
            Action::None => return Outcome::NoAction,
        };
        match result {
            Ok(execution) => Outcome::Executed { execution },
            Err(e) => {
                self.planner.invalidate(symbol);
                failed(FailureStage::Execution, e)
            }
        }
    }
}

fn failed(stage: FailureStage, error: impl std::fmt::Display) -> Outcome {
    Outcome::Failed {
        stage,
        error: error.to_string(),
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
