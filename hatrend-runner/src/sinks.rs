//! Event sinks: structured log lines, a JSONL journal and an in-process channel.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Mutex, PoisonError};

use hatrend_core::planner::Action;

use crate::events::{CycleEvent, Outcome};
use crate::ports::EventSink;

/// Emits each event as `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &CycleEvent) {
        for tf in &event.timeframes {
            match &tf.error {
                Some(error) => tracing::warn!(
                    symbol = %event.symbol,
                    timeframe = %tf.timeframe,
                    %error,
                    "timeframe unavailable, counted as bearish"
                ),
                None => tracing::debug!(
                    symbol = %event.symbol,
                    timeframe = %tf.timeframe,
                    raw = ?tf.raw,
                    effective = %tf.effective,
                    magnitude = ?tf.magnitude,
                    movement_pct = ?tf.stats.map(|s| s.movement_pct),
                    progress = ?tf.stats.map(|s| s.progress),
                    "timeframe evaluated"
                ),
            }
        }

        if let Some(change) = event.change {
            let direction = if change.improved() { "improved" } else { "worsened" };
            tracing::info!(
                symbol = %event.symbol,
                old_weight = change.old_weight,
                new_weight = change.new_weight,
                old_band = %change.old_band,
                new_band = %change.new_band,
                "signal {direction}"
            );
        }

        let action = event.action.as_ref().map(describe_action).unwrap_or_default();
        match &event.outcome {
            Outcome::Skipped => tracing::debug!(
                symbol = %event.symbol,
                weight = event.weight,
                "weight unchanged"
            ),
            Outcome::NoAction => tracing::info!(
                symbol = %event.symbol,
                weight = event.weight,
                band = %event.band,
                consensus = %event.consensus,
                "within threshold, no trade"
            ),
            Outcome::Simulated => tracing::info!(
                symbol = %event.symbol,
                weight = event.weight,
                band = %event.band,
                "[SIM] {action}"
            ),
            Outcome::Executed { execution } => tracing::info!(
                symbol = %event.symbol,
                weight = event.weight,
                price = execution.executed_price,
                quantity = execution.executed_quantity,
                usd = execution.executed_usd,
                "{action}"
            ),
            Outcome::Cancelled => tracing::warn!(
                symbol = %event.symbol,
                "stop requested, {action} not submitted"
            ),
            Outcome::Failed { stage, error } => tracing::error!(
                symbol = %event.symbol,
                ?stage,
                %error,
                "rebalance failed"
            ),
        }
    }
}

fn describe_action(action: &Action) -> String {
    match action {
        Action::None => "hold".to_string(),
        Action::Buy {
            amount_usd,
            capital_limited,
        } => {
            let limited = if *capital_limited { " (capital limited)" } else { "" };
            format!("buy ${amount_usd:.2}{limited}")
        }
        Action::Sell { quantity } => format!("sell {quantity:.8}"),
    }
}

/// Appends one JSON object per event to a file.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &CycleEvent) -> io::Result<()> {
        let json = serde_json::to_string(event)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()
    }

    /// Read all events back, skipping lines that fail to parse.
    pub fn load(&self) -> io::Result<Vec<CycleEvent>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}

impl EventSink for JsonlSink {
    fn emit(&self, event: &CycleEvent) {
        if let Err(error) = self.append(event) {
            tracing::warn!(path = %self.path.display(), %error, "failed to append event");
        }
    }
}

/// Forwards events to a receiver, e.g. a UI thread.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<CycleEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<CycleEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &CycleEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CycleTrigger;
    use chrono::Utc;
    use hatrend_core::{Consensus, WeightBand};
    use std::sync::mpsc;

    fn event(symbol: &str) -> CycleEvent {
        CycleEvent {
            cycle: 1,
            trigger: CycleTrigger::Periodic,
            at: Utc::now(),
            symbol: symbol.into(),
            timeframes: Vec::new(),
            weight: 0.5,
            band: WeightBand::Buy,
            consensus: Consensus::Consolidation,
            change: None,
            action: Some(Action::Buy {
                amount_usd: 25.0,
                capital_limited: false,
            }),
            outcome: Outcome::Simulated,
        }
    }

    #[test]
    fn jsonl_appends_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("nested/events.jsonl"));
        sink.emit(&event("BTCUSDC"));
        sink.emit(&event("SOLUSDC"));

        let loaded = sink.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].symbol, "SOLUSDC");
        assert_eq!(loaded[0].outcome, Outcome::Simulated);
        assert_eq!(loaded[0].action, event("BTCUSDC").action);
    }

    #[test]
    fn jsonl_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(JsonlSink::new(dir.path().join("none.jsonl")).load().unwrap().is_empty());
    }

    #[test]
    fn channel_forwards_and_tolerates_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);
        sink.emit(&event("BTCUSDC"));
        assert_eq!(rx.recv().unwrap().symbol, "BTCUSDC");
        drop(rx);
        sink.emit(&event("BTCUSDC"));
    }

    #[test]
    fn action_descriptions() {
        assert_eq!(
            describe_action(&Action::Buy {
                amount_usd: 50.0,
                capital_limited: true
            }),
            "buy $50.00 (capital limited)"
        );
        assert_eq!(describe_action(&Action::Sell { quantity: 0.5 }), "sell 0.50000000");
    }
}
