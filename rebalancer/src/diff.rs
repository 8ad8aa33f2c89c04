//! CURRENT→TARGET diff engine.
//!
//! Turns holdings and target values into signed trade deltas in base units.
//! Deltas below the dust threshold are set aside rather than traded.

use std::fmt;

use equibasket::{Amount, AssetId, Side};
use serde::Serialize;

use crate::valuation::Holding;

/// How far one asset is from its target, in base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeDelta {
    pub asset: AssetId,
    pub side: Side,
    /// Magnitude in base units.
    pub value: Amount,
}

impl TradeDelta {
    /// `target - current`, from `target` and `current` values.
    pub fn between(asset: AssetId, current: Amount, target: Amount) -> Self {
        let side = if target >= current { Side::Buy } else { Side::Sell };
        Self {
            asset,
            side,
            value: target.abs_diff(current),
        }
    }

    /// Positive for buys, negative for sells. Saturates at `i128` bounds.
    pub fn signed_value(&self) -> i128 {
        let magnitude = i128::try_from(self.value.0).unwrap_or(i128::MAX);
        match self.side {
            Side::Buy => magnitude,
            Side::Sell => -magnitude,
        }
    }
}

impl fmt::Display for TradeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.side, self.asset, self.value)
    }
}

/// Trades for one rebalance. Sells run before buys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TradePlan {
    pub sells: Vec<TradeDelta>,
    pub buys: Vec<TradeDelta>,
    /// Deltas too small to trade.
    pub dust: Vec<TradeDelta>,
}

impl TradePlan {
    /// True when nothing needs to be swapped.
    pub fn is_empty(&self) -> bool {
        self.sells.is_empty() && self.buys.is_empty()
    }

    pub fn swap_count(&self) -> usize {
        self.sells.len() + self.buys.len()
    }

    /// Sells then buys, in execution order.
    pub fn trades(&self) -> impl Iterator<Item = &TradeDelta> {
        self.sells.iter().chain(self.buys.iter())
    }

    pub fn total_sells(&self) -> Amount {
        self.sells.iter().map(|d| d.value).sum()
    }

    pub fn total_buys(&self) -> Amount {
        self.buys.iter().map(|d| d.value).sum()
    }

    /// How much `base_balance + Σsells` falls short of `Σbuys`.
    pub fn funding_gap(&self, base_balance: Amount) -> Amount {
        let funded = [base_balance, self.total_sells()].into_iter().sum();
        self.total_buys().saturating_sub(funded)
    }
}

/// Compute the trade plan from holdings to targets.
///
/// `holdings` and `targets` are index-aligned in fund order. A delta is
/// dust when its magnitude is zero or below `dust_threshold`.
pub fn compute_plan(
    holdings: &[Holding],
    targets: &[(AssetId, Amount)],
    dust_threshold: Amount,
) -> TradePlan {
    let mut plan = TradePlan::default();

    for (holding, (asset, target)) in holdings.iter().zip(targets) {
        debug_assert_eq!(&holding.asset, asset);
        let delta = TradeDelta::between(asset.clone(), holding.value, *target);

        if delta.value.is_zero() || delta.value < dust_threshold {
            plan.dust.push(delta);
            continue;
        }
        match delta.side {
            Side::Sell => plan.sells.push(delta),
            Side::Buy => plan.buys.push(delta),
        }
    }

    plan
}
