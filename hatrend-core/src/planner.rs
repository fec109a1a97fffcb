//! Allocation diffing: target weight + portfolio snapshot → trade instruction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::domain::{PortfolioSnapshot, Symbol};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("{symbol}: buy of ${needed:.2} limited to ${available:.2} cash, below the trade threshold")]
    InsufficientCapital {
        symbol: Symbol,
        needed: f64,
        available: f64,
    },

    #[error("{symbol}: {reason}")]
    InvalidInput { symbol: Symbol, reason: String },
}

/// What to do for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "side", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    None,
    Buy {
        amount_usd: f64,
        /// Clipped to available cash.
        capital_limited: bool,
    },
    Sell {
        /// Base-asset quantity, before exchange lot normalization.
        quantity: f64,
    },
}

impl Action {
    pub fn is_trade(&self) -> bool {
        !matches!(self, Action::None)
    }
}

/// Last successful plan for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationTarget {
    pub base_share: f64,
    pub last_weight: f64,
    pub target_usd: f64,
    pub current_usd: f64,
    pub diff_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub symbol: Symbol,
    pub target: AllocationTarget,
    pub action: Action,
}

/// Computes trade instructions and keeps the last target per symbol.
#[derive(Debug)]
pub struct AllocationPlanner {
    min_trade_threshold_usd: f64,
    targets: Mutex<HashMap<Symbol, AllocationTarget>>,
}

impl AllocationPlanner {
    pub fn new(min_trade_threshold_usd: f64) -> Self {
        assert!(
            min_trade_threshold_usd.is_finite() && min_trade_threshold_usd >= 0.0,
            "min trade threshold must be finite and >= 0"
        );
        Self {
            min_trade_threshold_usd,
            targets: Mutex::new(HashMap::new()),
        }
    }

    /// Plan one symbol. The result depends only on the arguments, so repeating
    /// the call with the same inputs yields the same plan.
    pub fn plan(
        &self,
        symbol: &str,
        weight: f64,
        snapshot: &PortfolioSnapshot,
        base_share: f64,
    ) -> Result<Plan, PlanError> {
        let invalid = |reason: String| PlanError::InvalidInput {
            symbol: symbol.to_string(),
            reason,
        };

        if !weight.is_finite() {
            return Err(invalid(format!("weight must be finite, got {weight}")));
        }
        if !(base_share > 0.0 && base_share <= 1.0) {
            return Err(invalid(format!("base share must be in (0, 1], got {base_share}")));
        }
        let total = snapshot.total_capital_usd;
        if !total.is_finite() || total < 0.0 {
            return Err(invalid(format!("total capital must be finite and >= 0, got {total}")));
        }
        let holding = snapshot
            .holding_usd(symbol)
            .ok_or_else(|| invalid("no holding in snapshot".into()))?;
        let price = snapshot
            .price(symbol)
            .ok_or_else(|| invalid("no price in snapshot".into()))?;

        let last_weight = weight.clamp(0.0, 1.0);
        let target_usd = total * base_share * last_weight;
        let diff_usd = target_usd - holding;
        let threshold = self.min_trade_threshold_usd;

        let action = if diff_usd.abs() <= threshold {
            Action::None
        } else if diff_usd > 0.0 {
            let cash = snapshot.available_cash_usd;
            if cash < diff_usd {
                if cash <= threshold {
                    return Err(PlanError::InsufficientCapital {
                        symbol: symbol.to_string(),
                        needed: diff_usd,
                        available: cash,
                    });
                }
                Action::Buy {
                    amount_usd: cash,
                    capital_limited: true,
                }
            } else {
                Action::Buy {
                    amount_usd: diff_usd,
                    capital_limited: false,
                }
            }
        } else {
            if !(price > 0.0 && price.is_finite()) {
                return Err(invalid(format!("price must be > 0, got {price}")));
            }
            Action::Sell {
                quantity: diff_usd.abs() / price,
            }
        };

        let target = AllocationTarget {
            base_share,
            last_weight,
            target_usd,
            current_usd: holding,
            diff_usd,
        };
        self.targets().insert(symbol.to_string(), target);

        Ok(Plan {
            symbol: symbol.to_string(),
            target,
            action,
        })
    }

    pub fn target(&self, symbol: &str) -> Option<AllocationTarget> {
        self.targets().get(symbol).copied()
    }

    pub fn last_weight(&self, symbol: &str) -> Option<f64> {
        self.target(symbol).map(|t| t.last_weight)
    }

    /// Forget the last target so the next evaluation re-plans unconditionally.
    pub fn invalidate(&self, symbol: &str) {
        self.targets().remove(symbol);
    }

    fn targets(&self) -> MutexGuard<'_, HashMap<Symbol, AllocationTarget>> {
        self.targets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};
    use chrono::Utc;

    fn snapshot(total: f64, cash: f64, holding: f64, price: f64) -> PortfolioSnapshot {
        PortfolioSnapshot::new(total, cash, Utc::now()).with_position("BTCUSDC", holding, price)
    }

    #[test]
    fn buys_up_to_target() {
        let planner = AllocationPlanner::new(10.0);
        let plan = planner
            .plan("BTCUSDC", 1.0, &snapshot(10_000.0, 5_000.0, 500.0, 40_000.0), 0.2)
            .unwrap();
        assert_eq!(
            plan.action,
            Action::Buy {
                amount_usd: 1_500.0,
                capital_limited: false
            }
        );
        assert_eq!(plan.target.target_usd, 2_000.0);
        assert_eq!(planner.last_weight("BTCUSDC"), Some(1.0));
    }

    #[test]
    fn sells_excess_in_base_quantity() {
        let planner = AllocationPlanner::new(10.0);
        let plan = planner
            .plan("BTCUSDC", 0.0, &snapshot(10_000.0, 0.0, 1_000.0, 50_000.0), 0.2)
            .unwrap();
        match plan.action {
            Action::Sell { quantity } => assert_approx(quantity, 0.02, DEFAULT_EPSILON),
            other => panic!("expected sell, got {other:?}"),
        }
    }

    #[test]
    fn small_diff_is_no_action() {
        let planner = AllocationPlanner::new(10.0);
        let plan = planner
            .plan("BTCUSDC", 0.5, &snapshot(10_000.0, 5_000.0, 995.0, 1.0), 0.2)
            .unwrap();
        assert_eq!(plan.action, Action::None);
        // Threshold is inclusive.
        let plan = planner
            .plan("BTCUSDC", 0.5, &snapshot(10_000.0, 5_000.0, 1_010.0, 1.0), 0.2)
            .unwrap();
        assert_eq!(plan.action, Action::None);
    }

    #[test]
    fn buy_clipped_to_cash() {
        let planner = AllocationPlanner::new(15.0);
        // target 200, holding 0, cash 50
        let plan = planner
            .plan("BTCUSDC", 1.0, &snapshot(1_000.0, 50.0, 0.0, 10.0), 0.2)
            .unwrap();
        assert_eq!(
            plan.action,
            Action::Buy {
                amount_usd: 50.0,
                capital_limited: true
            }
        );
    }

    #[test]
    fn clipped_buy_below_threshold_is_insufficient_capital() {
        let planner = AllocationPlanner::new(15.0);
        let err = planner
            .plan("BTCUSDC", 1.0, &snapshot(1_000.0, 12.0, 0.0, 10.0), 0.2)
            .unwrap_err();
        assert_eq!(
            err,
            PlanError::InsufficientCapital {
                symbol: "BTCUSDC".into(),
                needed: 200.0,
                available: 12.0
            }
        );
        assert!(planner.target("BTCUSDC").is_none());
    }

    #[test]
    fn missing_position_is_invalid() {
        let planner = AllocationPlanner::new(10.0);
        let err = planner
            .plan("SOLUSDC", 1.0, &snapshot(1_000.0, 1_000.0, 0.0, 10.0), 0.2)
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidInput { .. }));
    }

    #[test]
    fn sell_requires_positive_price() {
        let planner = AllocationPlanner::new(10.0);
        let err = planner
            .plan("BTCUSDC", 0.0, &snapshot(1_000.0, 0.0, 500.0, 0.0), 0.2)
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidInput { .. }));
    }

    #[test]
    fn weight_clamped_and_base_share_checked() {
        let planner = AllocationPlanner::new(10.0);
        let plan = planner
            .plan("BTCUSDC", 1.7, &snapshot(1_000.0, 1_000.0, 0.0, 10.0), 0.5)
            .unwrap();
        assert_eq!(plan.target.last_weight, 1.0);
        assert_eq!(plan.target.target_usd, 500.0);

        assert!(planner
            .plan("BTCUSDC", 0.5, &snapshot(1_000.0, 1_000.0, 0.0, 10.0), 0.0)
            .is_err());
        assert!(planner
            .plan("BTCUSDC", f64::NAN, &snapshot(1_000.0, 1_000.0, 0.0, 10.0), 0.2)
            .is_err());
    }

    #[test]
    fn plan_is_idempotent() {
        let planner = AllocationPlanner::new(10.0);
        let snap = snapshot(10_000.0, 3_000.0, 700.0, 25.0);
        let a = planner.plan("BTCUSDC", 0.65, &snap, 0.2).unwrap();
        let b = planner.plan("BTCUSDC", 0.65, &snap, 0.2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalidate_forgets_last_weight() {
        let planner = AllocationPlanner::new(10.0);
        planner
            .plan("BTCUSDC", 0.5, &snapshot(1_000.0, 1_000.0, 0.0, 10.0), 0.2)
            .unwrap();
        assert_eq!(planner.last_weight("BTCUSDC"), Some(0.5));
        planner.invalidate("BTCUSDC");
        assert_eq!(planner.last_weight("BTCUSDC"), None);
    }
}
