//! Per-key cooldown state machine.
//!
//! `step` is pure: it takes the previous record and one observation and
//! returns the next record plus what the gate emitted. The store in
//! `gate::CooldownGate` applies it under a lock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::SignalValue;

use super::policy::RevertPolicy;

/// An active cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    /// The extreme the signal reversed away from.
    pub origin: SignalValue,
    /// Last value the gate let through while locked.
    pub accepted: SignalValue,
    pub locked_at: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    /// Weight contribution held fixed while locked.
    pub frozen_contribution: f64,
}

impl Lock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum GatePhase {
    Idle {
        last: SignalValue,
        /// Most recent extreme seen, used to detect reversals through Transition.
        direction: Option<SignalValue>,
    },
    Locked(Lock),
}

/// Everything the gate remembers about one (symbol, timeframe) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CooldownRecord {
    pub phase: GatePhase,
    pub last_observed: DateTime<Utc>,
}

impl CooldownRecord {
    pub fn lock(&self) -> Option<&Lock> {
        match &self.phase {
            GatePhase::Locked(lock) => Some(lock),
            GatePhase::Idle { .. } => None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock().is_some()
    }
}

/// How the gate handled one observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateTransition {
    /// Idle and no reversal: raw value emitted as-is.
    PassedThrough,
    /// Reversal detected; a cooldown started.
    Locked { origin: SignalValue, expiry: DateTime<Utc> },
    /// Locked, raw moved away from the origin and was accepted.
    Progressed,
    /// Locked, raw equals the value already accepted.
    Held,
    /// Locked, raw tried to revert to the origin and was rejected.
    Suppressed { extended: bool, expiry: DateTime<Utc> },
    /// Locked, a revert to the origin was accepted after an intermediate step.
    Released,
    /// Cooldown elapsed; raw becomes the new baseline.
    Expired,
}

/// What the gate emits for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateOutput {
    pub effective: SignalValue,
    pub frozen_contribution: f64,
    pub transition: GateTransition,
}

impl GateOutput {
    fn pass(value: SignalValue, transition: GateTransition) -> Self {
        Self {
            effective: value,
            frozen_contribution: value.contribution(),
            transition,
        }
    }

    pub fn was_suppressed(&self) -> bool {
        matches!(self.transition, GateTransition::Suppressed { .. })
    }
}

/// Why `step` refused an observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepError {
    /// Observations for a key went backwards in time.
    OutOfOrder { last: DateTime<Utc>, now: DateTime<Utc> },
    /// `now + cooldown` is not a representable instant.
    ExpiryOverflow { now: DateTime<Utc>, cooldown: Duration },
}

/// Advance one key's record by one observation.
pub fn step(
    prev: Option<&CooldownRecord>,
    raw: SignalValue,
    now: DateTime<Utc>,
    cooldown: Duration,
    policy: RevertPolicy,
) -> Result<(CooldownRecord, GateOutput), StepError> {
    let Some(prev) = prev else {
        return idle_step(None, raw, now, cooldown);
    };

    if now < prev.last_observed {
        return Err(StepError::OutOfOrder {
            last: prev.last_observed,
            now,
        });
    }

    let lock = match prev.phase {
        GatePhase::Idle { direction, .. } => return idle_step(direction, raw, now, cooldown),
        GatePhase::Locked(lock) => lock,
    };

    if lock.is_expired(now) {
        let direction = if raw.is_extreme() {
            Some(raw)
        } else if lock.accepted.is_extreme() {
            Some(lock.accepted)
        } else {
            None
        };
        let record = CooldownRecord {
            phase: GatePhase::Idle { last: raw, direction },
            last_observed: now,
        };
        return Ok((record, GateOutput::pass(raw, GateTransition::Expired)));
    }

    if raw != lock.origin {
        let transition = if raw == lock.accepted {
            GateTransition::Held
        } else {
            GateTransition::Progressed
        };
        let next = Lock {
            accepted: raw,
            frozen_contribution: raw.contribution(),
            ..lock
        };
        return Ok(locked(next, now, GateOutput::pass(raw, transition)));
    }

    // raw == origin: an attempted revert.
    match policy {
        RevertPolicy::AllowAfterIntermediate if lock.accepted == SignalValue::Transition => {
            let next = Lock {
                accepted: raw,
                frozen_contribution: raw.contribution(),
                ..lock
            };
            Ok(locked(next, now, GateOutput::pass(raw, GateTransition::Released)))
        }
        RevertPolicy::SuppressAndExtend => {
            let next = Lock {
                expiry: expiry_after(now, cooldown)?,
                ..lock
            };
            Ok(locked(next, now, suppressed(&next, true)))
        }
        // A released lock already accepted the origin; repeating it is held, not suppressed.
        RevertPolicy::AllowAfterIntermediate if lock.accepted == raw => {
            Ok(locked(lock, now, GateOutput::pass(raw, GateTransition::Held)))
        }
        RevertPolicy::Suppress | RevertPolicy::AllowAfterIntermediate => {
            Ok(locked(lock, now, suppressed(&lock, false)))
        }
    }
}

fn expiry_after(now: DateTime<Utc>, cooldown: Duration) -> Result<DateTime<Utc>, StepError> {
    now.checked_add_signed(cooldown)
        .ok_or(StepError::ExpiryOverflow { now, cooldown })
}

fn idle_step(
    direction: Option<SignalValue>,
    raw: SignalValue,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> Result<(CooldownRecord, GateOutput), StepError> {
    if let Some(previous) = direction {
        if raw.is_extreme() && raw == previous.opposite() {
            let lock = Lock {
                origin: previous,
                accepted: raw,
                locked_at: now,
                expiry: expiry_after(now, cooldown)?,
                frozen_contribution: raw.contribution(),
            };
            let out = GateOutput::pass(
                raw,
                GateTransition::Locked {
                    origin: previous,
                    expiry: lock.expiry,
                },
            );
            return Ok(locked(lock, now, out));
        }
    }

    let direction = if raw.is_extreme() { Some(raw) } else { direction };
    let record = CooldownRecord {
        phase: GatePhase::Idle { last: raw, direction },
        last_observed: now,
    };
    Ok((record, GateOutput::pass(raw, GateTransition::PassedThrough)))
}

fn locked(lock: Lock, now: DateTime<Utc>, out: GateOutput) -> (CooldownRecord, GateOutput) {
    (
        CooldownRecord {
            phase: GatePhase::Locked(lock),
            last_observed: now,
        },
        out,
    )
}

fn suppressed(lock: &Lock, extended: bool) -> GateOutput {
    GateOutput {
        effective: lock.accepted,
        frozen_contribution: lock.frozen_contribution,
        transition: GateTransition::Suppressed {
            extended,
            expiry: lock.expiry,
        },
    }
}
