//! Gate rules: per-timeframe cooldown lengths and the revert policy.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::Timeframe;

/// What to do when a locked signal tries to return to the state that caused the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertPolicy {
    /// Keep the last accepted value and restart the cooldown from now.
    #[default]
    SuppressAndExtend,
    /// Keep the last accepted value; the expiry stays where it was.
    Suppress,
    /// Accept the revert once the lock has already stepped through Transition;
    /// otherwise suppress without extending.
    AllowAfterIntermediate,
}

/// Cooldown length per timeframe.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CooldownSchedule {
    durations: BTreeMap<Timeframe, Duration>,
}

impl CooldownSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, timeframe: Timeframe, cooldown: Duration) -> Self {
        self.durations.insert(timeframe, cooldown);
        self
    }

    pub fn get(&self, timeframe: Timeframe) -> Option<Duration> {
        self.durations.get(&timeframe).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_suppress_and_extend() {
        assert_eq!(RevertPolicy::default(), RevertPolicy::SuppressAndExtend);
    }

    #[test]
    fn policy_serde_names() {
        let json = serde_json::to_string(&RevertPolicy::AllowAfterIntermediate).unwrap();
        assert_eq!(json, "\"allow_after_intermediate\"");
    }

    #[test]
    fn later_entry_replaces_earlier() {
        let schedule = CooldownSchedule::new()
            .with(Timeframe::H1, Duration::minutes(30))
            .with(Timeframe::H1, Duration::minutes(45));
        assert_eq!(schedule.get(Timeframe::H1), Some(Duration::minutes(45)));
        assert_eq!(schedule.get(Timeframe::H2), None);
    }
}
