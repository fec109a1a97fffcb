//! Anti-whipsaw cooldown gate.
//!
//! One record per (symbol, timeframe). A reversal from one extreme to the
//! other starts a cooldown whose length depends on the timeframe; while it
//! runs, attempts to flip back to the extreme it left are suppressed.

pub mod policy;
pub mod state;

pub use policy::{CooldownSchedule, RevertPolicy};
pub use state::{step, CooldownRecord, GateOutput, GatePhase, GateTransition, Lock, StepError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::config::StrategyConfig;
use crate::domain::{SignalValue, Symbol, Timeframe};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GateKey {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
}

impl GateKey {
    pub fn new(symbol: impl Into<Symbol>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl fmt::Display for GateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GateError {
    #[error("observation for {key} at {now} precedes the last one at {last}")]
    StateViolation {
        key: GateKey,
        last: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("no cooldown configured for timeframe {0}")]
    UnknownTimeframe(Timeframe),

    #[error("cooldown of {cooldown_secs}s for {key} runs past the representable time range")]
    ExpiryOverflow { key: GateKey, cooldown_secs: i64 },
}

/// Thread-safe store of cooldown records.
///
/// Distinct keys never interfere; callers serialize work per symbol, the
/// internal mutex only protects the map itself.
#[derive(Debug)]
pub struct CooldownGate {
    schedule: CooldownSchedule,
    policy: RevertPolicy,
    records: Mutex<HashMap<GateKey, CooldownRecord>>,
}

impl CooldownGate {
    pub fn new(schedule: CooldownSchedule, policy: RevertPolicy) -> Self {
        Self {
            schedule,
            policy,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.cooldown_schedule(), config.revert_policy)
    }

    /// Gate one raw observation and update the key's record.
    pub fn evaluate(
        &self,
        key: &GateKey,
        raw: SignalValue,
        now: DateTime<Utc>,
    ) -> Result<GateOutput, GateError> {
        let cooldown = self
            .schedule
            .get(key.timeframe)
            .ok_or(GateError::UnknownTimeframe(key.timeframe))?;

        let mut records = self.records();
        let (next, out) =
            step(records.get(key), raw, now, cooldown, self.policy).map_err(|e| match e {
                StepError::OutOfOrder { last, now } => GateError::StateViolation {
                    key: key.clone(),
                    last,
                    now,
                },
                StepError::ExpiryOverflow { cooldown, .. } => GateError::ExpiryOverflow {
                    key: key.clone(),
                    cooldown_secs: cooldown.num_seconds(),
                },
            })?;
        records.insert(key.clone(), next);
        drop(records);

        match out.transition {
            GateTransition::Locked { origin, expiry } => {
                tracing::debug!(%key, %origin, accepted = %raw, %expiry, "cooldown started");
            }
            GateTransition::Suppressed { extended, expiry } => {
                tracing::debug!(%key, attempted = %raw, held = %out.effective, extended, %expiry, "revert suppressed");
            }
            GateTransition::Released => {
                tracing::debug!(%key, value = %raw, "revert accepted after intermediate step");
            }
            GateTransition::Expired => {
                tracing::debug!(%key, baseline = %raw, "cooldown expired");
            }
            GateTransition::PassedThrough | GateTransition::Progressed | GateTransition::Held => {}
        }

        Ok(out)
    }

    /// Snapshot of one key's record.
    pub fn record(&self, key: &GateKey) -> Option<CooldownRecord> {
        self.records().get(key).copied()
    }

    /// Keys currently in cooldown, sorted.
    pub fn active_locks(&self) -> Vec<(GateKey, Lock)> {
        let mut locks: Vec<_> = self
            .records()
            .iter()
            .filter_map(|(k, r)| r.lock().map(|l| (k.clone(), *l)))
            .collect();
        locks.sort_by(|a, b| a.0.cmp(&b.0));
        locks
    }

    /// Forget all history for a key.
    pub fn reset(&self, key: &GateKey) {
        self.records().remove(key);
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn records(&self) -> MutexGuard<'_, HashMap<GateKey, CooldownRecord>> {
        // Records are replaced whole, so a poisoned map is still consistent.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;
    use std::thread;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn gate() -> CooldownGate {
        let schedule = CooldownSchedule::new()
            .with(Timeframe::M30, Duration::seconds(900))
            .with(Timeframe::H1, Duration::seconds(1800))
            .with(Timeframe::H2, Duration::seconds(3600));
        CooldownGate::new(schedule, RevertPolicy::SuppressAndExtend)
    }

    #[test]
    fn cooldown_length_follows_timeframe() {
        let gate = gate();
        for (tf, secs) in [(Timeframe::M30, 900), (Timeframe::H2, 3600)] {
            let key = GateKey::new("BTCUSDC", tf);
            gate.evaluate(&key, SignalValue::Bullish, t(0)).unwrap();
            let out = gate.evaluate(&key, SignalValue::Bearish, t(10)).unwrap();
            assert_eq!(
                out.transition,
                GateTransition::Locked {
                    origin: SignalValue::Bullish,
                    expiry: t(10 + secs)
                }
            );
        }
        assert_eq!(gate.active_locks().len(), 2);
    }

    #[test]
    fn keys_are_independent() {
        let gate = gate();
        let btc = GateKey::new("BTCUSDC", Timeframe::H1);
        let sol = GateKey::new("SOLUSDC", Timeframe::H1);
        gate.evaluate(&btc, SignalValue::Bullish, t(0)).unwrap();
        gate.evaluate(&btc, SignalValue::Bearish, t(1)).unwrap();

        let out = gate.evaluate(&sol, SignalValue::Bullish, t(2)).unwrap();
        assert_eq!(out.transition, GateTransition::PassedThrough);
        assert!(gate.record(&btc).unwrap().is_locked());
        assert!(!gate.record(&sol).unwrap().is_locked());
    }

    #[test]
    fn unknown_timeframe_is_an_error() {
        let err = gate()
            .evaluate(&GateKey::new("BTCUSDC", Timeframe::D1), SignalValue::Bullish, t(0))
            .unwrap_err();
        assert_eq!(err, GateError::UnknownTimeframe(Timeframe::D1));
    }

    #[test]
    fn backwards_time_is_a_state_violation() {
        let gate = gate();
        let key = GateKey::new("BTCUSDC", Timeframe::M30);
        gate.evaluate(&key, SignalValue::Bullish, t(100)).unwrap();
        let err = gate.evaluate(&key, SignalValue::Bullish, t(50)).unwrap_err();
        assert!(matches!(err, GateError::StateViolation { .. }));
        // The record is untouched.
        assert_eq!(gate.record(&key).unwrap().last_observed, t(100));
    }

    #[test]
    fn unrepresentable_expiry_is_an_error() {
        let schedule = CooldownSchedule::new().with(Timeframe::H2, Duration::days(365 * 1_000_000));
        let gate = CooldownGate::new(schedule, RevertPolicy::SuppressAndExtend);
        let key = GateKey::new("BTCUSDC", Timeframe::H2);
        gate.evaluate(&key, SignalValue::Bullish, t(0)).unwrap();

        let err = gate.evaluate(&key, SignalValue::Bearish, t(10)).unwrap_err();
        assert!(matches!(err, GateError::ExpiryOverflow { .. }), "{err:?}");
        // The failed reversal left the idle record in place.
        let record = gate.record(&key).unwrap();
        assert!(!record.is_locked());
        assert_eq!(record.last_observed, t(0));
    }

    #[test]
    fn reset_forgets_history() {
        let gate = gate();
        let key = GateKey::new("BTCUSDC", Timeframe::M30);
        gate.evaluate(&key, SignalValue::Bullish, t(0)).unwrap();
        gate.reset(&key);
        assert!(gate.is_empty());
        gate.evaluate(&key, SignalValue::Bullish, t(0)).unwrap();
    }

    #[test]
    fn concurrent_distinct_keys() {
        let gate = Arc::new(gate());
        let handles: Vec<_> = ["BTCUSDC", "FETUSDC", "LINKUSDC", "XLMUSDC", "SOLUSDC"]
            .into_iter()
            .map(|symbol| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || {
                    let key = GateKey::new(symbol, Timeframe::H1);
                    for i in 0..50 {
                        let raw = if i % 2 == 0 {
                            SignalValue::Bullish
                        } else {
                            SignalValue::Bearish
                        };
                        gate.evaluate(&key, raw, t(i)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(gate.len(), 5);
        assert_eq!(gate.active_locks().len(), 5);
    }

    #[test]
    fn key_display() {
        assert_eq!(GateKey::new("BTCUSDC", Timeframe::M30).to_string(), "BTCUSDC@30m");
    }
}
