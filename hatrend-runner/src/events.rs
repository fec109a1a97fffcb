//! Per-symbol cycle events handed to sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use hatrend_core::domain::{SignalValue, Symbol, Timeframe};
use hatrend_core::gate::GateTransition;
use hatrend_core::indicators::CandleStats;
use hatrend_core::planner::Action;
use hatrend_core::{Consensus, WeightBand};

use crate::ports::Execution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleTrigger {
    Periodic,
    Manual,
}

impl fmt::Display for CycleTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Periodic => "periodic",
            Self::Manual => "manual",
        })
    }
}

/// What happened to one timeframe of one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeReport {
    pub timeframe: Timeframe,
    /// Oscillator output; `None` when evaluation failed.
    pub raw: Option<SignalValue>,
    /// Value fed to the aggregator.
    pub effective: SignalValue,
    pub magnitude: Option<f64>,
    pub transition: Option<GateTransition>,
    pub stats: Option<CandleStats>,
    pub error: Option<String>,
}

/// Weight moved since the symbol's previous cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalChange {
    pub old_weight: f64,
    pub new_weight: f64,
    pub old_band: WeightBand,
    pub new_band: WeightBand,
}

impl SignalChange {
    pub fn new(old_weight: f64, new_weight: f64) -> Self {
        Self {
            old_weight,
            new_weight,
            old_band: WeightBand::from_weight(old_weight),
            new_band: WeightBand::from_weight(new_weight),
        }
    }

    pub fn improved(&self) -> bool {
        self.new_weight > self.old_weight
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Snapshot,
    Plan,
    Execution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Weight unchanged since the last plan; nothing re-planned.
    Skipped,
    /// Planned, but the difference is within the trade threshold.
    NoAction,
    /// Trading disabled: the order was logged, not sent.
    Simulated,
    Executed { execution: Execution },
    /// Forced stop before the order went out.
    Cancelled,
    Failed { stage: FailureStage, error: String },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleEvent {
    pub cycle: u64,
    pub trigger: CycleTrigger,
    pub at: DateTime<Utc>,
    pub symbol: Symbol,
    pub timeframes: Vec<TimeframeReport>,
    pub weight: f64,
    pub band: WeightBand,
    pub consensus: Consensus,
    pub change: Option<SignalChange>,
    pub action: Option<Action>,
    pub outcome: Outcome,
}

/// Everything one `run_cycle` call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub trigger: CycleTrigger,
    pub forced: bool,
    pub started_at: DateTime<Utc>,
    pub events: Vec<CycleEvent>,
    pub cancelled: bool,
}

impl CycleReport {
    pub fn event(&self, symbol: &str) -> Option<&CycleEvent> {
        self.events.iter().find(|e| e.symbol == symbol)
    }

    pub fn trades(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Executed { .. } | Outcome::Simulated))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.events.iter().filter(|e| e.outcome.is_failure()).count()
    }
}
