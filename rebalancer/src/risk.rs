//! Pre-trade risk checks.
//!
//! Validates a trade plan before any swap is sent. A failed check aborts the
//! rebalance; a warning is only logged.

use equibasket::Amount;
use serde::Serialize;

use crate::config::{ExecutionConfig, PlannerConfig};
use crate::diff::TradePlan;

/// Slippage tolerances wider than this draw a warning.
pub const WIDE_SLIPPAGE_BPS: u32 = 500;

/// Result of running all risk checks.
#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    pub checks: Vec<RiskCheck>,
}

/// A single risk check result.
#[derive(Debug, Clone, Serialize)]
pub struct RiskCheck {
    pub name: &'static str,
    pub status: RiskStatus,
    pub detail: String,
}

/// Whether a check passed, warned, or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskStatus {
    Pass,
    Warn,
    Fail,
}

impl std::fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskStatus::Pass => write!(f, "PASS"),
            RiskStatus::Warn => write!(f, "WARN"),
            RiskStatus::Fail => write!(f, "FAIL"),
        }
    }
}

impl RiskReport {
    /// True if any check failed (not just warned).
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status == RiskStatus::Fail)
    }

    /// True if any check warned.
    pub fn has_warnings(&self) -> bool {
        self.checks.iter().any(|c| c.status == RiskStatus::Warn)
    }

    pub fn with_status(&self, status: RiskStatus) -> impl Iterator<Item = &RiskCheck> {
        self.checks.iter().filter(move |c| c.status == status)
    }

    /// One-line summary of the failed checks, for error messages.
    pub fn failure_summary(&self) -> String {
        self.with_status(RiskStatus::Fail)
            .map(|c| format!("{}: {}", c.name, c.detail))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl std::fmt::Display for RiskReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "RISK CHECKS:")?;
        for check in &self.checks {
            writeln!(f, "  [{}] {}: {}", check.status, check.name, check.detail)?;
        }
        Ok(())
    }
}

/// Limits the checks run against.
#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub dust_threshold: Amount,
    pub max_swaps_per_run: usize,
    pub max_trade_value: Option<Amount>,
    pub slippage_bps: u32,
}

impl RiskLimits {
    /// `dust_threshold` is the resolved tolerance the plan was built with.
    pub fn from_config(
        execution: &ExecutionConfig,
        planner: &PlannerConfig,
        dust_threshold: Amount,
    ) -> Self {
        Self {
            dust_threshold,
            max_swaps_per_run: execution.max_swaps_per_run,
            max_trade_value: planner.max_trade_value(),
            slippage_bps: execution.slippage_bps,
        }
    }
}

/// Run all pre-trade risk checks.
///
/// # Arguments
/// - `plan`: The planned trades
/// - `base_balance`: Base held before any swap
/// - `n_assets`: Number of quote assets in the basket
/// - `limits`: Risk limits
pub fn check_risk(
    plan: &TradePlan,
    base_balance: Amount,
    n_assets: usize,
    limits: &RiskLimits,
) -> RiskReport {
    let mut checks = Vec::new();

    // 1. Funding: sells plus base must cover buys, up to the dust left behind
    let gap = plan.funding_gap(base_balance);
    let allowed = limits
        .dust_threshold
        .mul_div(n_assets as u128 + 1, 1)
        .unwrap_or(Amount::MAX);
    let funding_status = if gap > allowed {
        RiskStatus::Fail
    } else {
        RiskStatus::Pass
    };
    checks.push(RiskCheck {
        name: "Funding",
        status: funding_status,
        detail: format!(
            "buys {} vs base {} + sells {}, gap {} {} {} allowed",
            plan.total_buys(),
            base_balance,
            plan.total_sells(),
            gap,
            if funding_status == RiskStatus::Pass {
                "<="
            } else {
                ">"
            },
            allowed,
        ),
    });

    // 2. Swap count
    let swaps = plan.swap_count();
    let count_status = if swaps > limits.max_swaps_per_run {
        RiskStatus::Fail
    } else {
        RiskStatus::Pass
    };
    checks.push(RiskCheck {
        name: "Swap count",
        status: count_status,
        detail: format!("{swaps} swaps, limit {}", limits.max_swaps_per_run),
    });

    // 3. Max trade: warn only
    if let Some(max) = limits.max_trade_value {
        let mut oversized = 0;
        for delta in plan.trades().filter(|d| d.value > max) {
            oversized += 1;
            checks.push(RiskCheck {
                name: "Max trade size",
                status: RiskStatus::Warn,
                detail: format!(
                    "{} {}: {} > {} max_trade_value",
                    delta.side, delta.asset, delta.value, max
                ),
            });
        }
        if oversized == 0 {
            checks.push(RiskCheck {
                name: "Max trade size",
                status: RiskStatus::Pass,
                detail: format!("All trades <= {max}"),
            });
        }
    }

    // 4. Slippage bound
    let slippage_status = if limits.slippage_bps > WIDE_SLIPPAGE_BPS {
        RiskStatus::Warn
    } else {
        RiskStatus::Pass
    };
    checks.push(RiskCheck {
        name: "Slippage bound",
        status: slippage_status,
        detail: format!(
            "{:.2}% tolerance per swap",
            f64::from(limits.slippage_bps) / 100.0
        ),
    });

    // 5. Dust
    checks.push(RiskCheck {
        name: "Dust",
        status: RiskStatus::Pass,
        detail: format!(
            "{} of {} deltas below {}",
            plan.dust.len(),
            n_assets,
            limits.dust_threshold
        ),
    });

    RiskReport { checks }
}
