//! The rebalance controller.
//!
//! A [`Fund`] owns the basket definition and drives one rebalance end to end:
//! read balances, value, allocate, plan, check risk, execute, reconcile.
//! Deltas smaller than the fund's tolerance are left alone: the configured
//! dust threshold, widened to the largest liquidation impact among the
//! holdings. A basket valued net of impact cannot land exactly on its
//! targets, and that residue must not be traded again on the next call.
//!
//! An invocation is all-or-nothing. The ledger is checkpointed on entry and
//! reverted on any error, which also restores venue state that lives in the
//! ledger (pool reserves).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use equibasket::{AccountId, Amount, AssetId, pow10};
use equibasket_venue::{Ledger, Venue};
use log::{debug, error, info, warn};
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::config::{Config, ExecutionConfig, PlannerConfig};
use crate::diff::{self, TradePlan};
use crate::error::{Error, Result};
use crate::execution::{ExecutionReport, Executor};
use crate::oracle::Oracle;
use crate::reconcile::{self, ReconcileReport};
use crate::risk::{self, RiskLimits, RiskReport, RiskStatus};
use crate::target::{self, Weights};
use crate::valuation::{self, PortfolioSnapshot};

/// Everything needed to construct a [`Fund`] apart from its collaborators.
#[derive(Debug, Clone)]
pub struct FundParams {
    pub account: AccountId,
    pub base_asset: AssetId,
    pub quote_assets: Vec<AssetId>,
    /// Sets the default dust threshold of one whole base unit.
    pub base_decimals: u8,
    /// `None` means equal weight.
    pub weights: Option<Weights>,
    pub execution: ExecutionConfig,
    pub planner: PlannerConfig,
}

impl FundParams {
    /// Equal-weight basket with default execution and planner settings.
    pub fn new(account: AccountId, base_asset: AssetId, quote_assets: Vec<AssetId>) -> Self {
        Self {
            account,
            base_asset,
            quote_assets,
            base_decimals: 6,
            weights: None,
            execution: ExecutionConfig::default(),
            planner: PlannerConfig::default(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            account: config.fund.account.clone(),
            base_asset: config.fund.base_asset.clone(),
            quote_assets: config.fund.quote_assets.clone(),
            base_decimals: config.fund.base_decimals,
            weights: Some(config.fund.weights()?),
            execution: config.execution.clone(),
            planner: config.planner.clone(),
        })
    }
}

/// Valuation, targets, plan and risk report of one rebalance, before any swap.
#[derive(Debug, Clone, Serialize)]
pub struct RebalancePreview {
    pub snapshot: PortfolioSnapshot,
    pub targets: Vec<(AssetId, Amount)>,
    /// Deltas below this were set aside as dust.
    pub tolerance: Amount,
    pub plan: TradePlan,
    pub risk: RiskReport,
}

/// Result of a successful rebalance.
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceOutcome {
    pub before: PortfolioSnapshot,
    pub targets: Vec<(AssetId, Amount)>,
    pub tolerance: Amount,
    pub plan: TradePlan,
    pub risk: RiskReport,
    pub execution: ExecutionReport,
    pub after: PortfolioSnapshot,
    pub reconciliation: ReconcileReport,
}

impl RebalanceOutcome {
    pub fn swap_count(&self) -> usize {
        self.execution.fills.len()
    }
}

/// Holds the in-progress flag for one invocation.
struct InProgress<'a>(&'a AtomicBool);

impl<'a> InProgress<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Reentrant)?;
        Ok(Self(flag))
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A basket fund trading through `V` against balances in `L`.
pub struct Fund<L, V> {
    account: AccountId,
    base_asset: AssetId,
    quote_assets: Vec<AssetId>,
    weights: Weights,
    execution: ExecutionConfig,
    planner: PlannerConfig,
    dust_threshold: Amount,
    ledger: Arc<L>,
    venue: Arc<V>,
    in_progress: AtomicBool,
}

impl<L: Ledger, V: Venue> Fund<L, V> {
    /// Validate the basket and build the fund.
    pub fn new(params: FundParams, ledger: Arc<L>, venue: Arc<V>) -> Result<Self> {
        if params.quote_assets.is_empty() {
            return Err(Error::InvalidConfiguration(
                "basket needs at least one quote asset".into(),
            ));
        }
        let mut seen = FxHashSet::default();
        for asset in &params.quote_assets {
            if asset == &params.base_asset {
                return Err(Error::InvalidConfiguration(format!(
                    "base asset {asset} cannot also be a quote asset"
                )));
            }
            if !seen.insert(asset) {
                return Err(Error::InvalidConfiguration(format!(
                    "duplicate quote asset {asset}"
                )));
            }
        }
        let weights = match params.weights {
            Some(w) => w,
            None => Weights::equal(params.quote_assets.len())?,
        };
        if weights.len() != params.quote_assets.len() {
            return Err(Error::InvalidConfiguration(format!(
                "{} weights for {} quote assets",
                weights.len(),
                params.quote_assets.len()
            )));
        }
        if params.execution.slippage_bps >= 10_000 {
            return Err(Error::InvalidConfiguration(
                "slippage_bps must be < 10000".into(),
            ));
        }
        // a full rebalance can need one swap per quote asset
        if params.execution.max_swaps_per_run < params.quote_assets.len() {
            return Err(Error::InvalidConfiguration(format!(
                "max_swaps_per_run {} cannot cover {} quote assets",
                params.execution.max_swaps_per_run,
                params.quote_assets.len()
            )));
        }
        if pow10(params.base_decimals).is_none() {
            return Err(Error::InvalidConfiguration(format!(
                "base_decimals {} out of range",
                params.base_decimals
            )));
        }
        let dust_threshold = params.planner.dust_threshold(params.base_decimals);

        Ok(Self {
            account: params.account,
            base_asset: params.base_asset,
            quote_assets: params.quote_assets,
            weights,
            execution: params.execution,
            planner: params.planner,
            dust_threshold,
            ledger,
            venue,
            in_progress: AtomicBool::new(false),
        })
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn base_asset(&self) -> &AssetId {
        &self.base_asset
    }

    pub fn quote_assets(&self) -> &[AssetId] {
        &self.quote_assets
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn venue(&self) -> &Arc<V> {
        &self.venue
    }

    /// Configured dust threshold in raw base units.
    pub fn dust_threshold(&self) -> Amount {
        self.dust_threshold
    }

    /// Smallest delta worth trading against `snapshot`.
    pub fn tolerance(&self, snapshot: &PortfolioSnapshot) -> Amount {
        if self.planner.impact_band {
            self.dust_threshold.max(snapshot.max_impact())
        } else {
            self.dust_threshold
        }
    }

    /// Current balances and values, read fresh.
    pub fn snapshot(&self) -> Result<PortfolioSnapshot> {
        let oracle = Oracle::new(&*self.venue);
        valuation::snapshot(
            &*self.ledger,
            &oracle,
            &self.account,
            &self.base_asset,
            &self.quote_assets,
        )
    }

    /// Value, allocate, plan and risk-check without trading.
    pub fn preview(&self) -> Result<RebalancePreview> {
        let snapshot = self.snapshot()?;
        debug!(
            "Valued {}: total {} (base {})",
            self.account, snapshot.total_value, snapshot.base.value
        );

        let targets = target::allocate(snapshot.total_value, &self.quote_assets, &self.weights)?;
        let tolerance = self.tolerance(&snapshot);
        if tolerance > self.dust_threshold {
            debug!(
                "Tolerance widened to {tolerance} by price impact (dust {})",
                self.dust_threshold
            );
        }
        let plan = diff::compute_plan(&snapshot.quotes, &targets, tolerance);
        for delta in plan.trades() {
            debug!("Delta {delta}");
        }
        if !plan.dust.is_empty() {
            debug!("{} deltas below {tolerance}", plan.dust.len());
        }

        let limits = RiskLimits::from_config(&self.execution, &self.planner, tolerance);
        let risk = risk::check_risk(&plan, snapshot.base.amount, self.quote_assets.len(), &limits);
        for check in risk.with_status(RiskStatus::Warn) {
            warn!("Risk {}: {}", check.name, check.detail);
        }

        Ok(RebalancePreview {
            snapshot,
            targets,
            tolerance,
            plan,
            risk,
        })
    }

    /// Bring every quote asset back to its target weight.
    ///
    /// Fails with [`Error::Reentrant`] if a rebalance of this fund is already
    /// running. On any other error every effect of the call is reverted.
    pub fn rebalance(&self) -> Result<RebalanceOutcome> {
        let _guard = InProgress::acquire(&self.in_progress)?;
        let checkpoint = self.ledger.checkpoint();

        match self.run() {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("Rebalance of {} failed, reverting: {e}", self.account);
                self.ledger.revert(checkpoint);
                Err(e)
            }
        }
    }

    fn run(&self) -> Result<RebalanceOutcome> {
        let RebalancePreview {
            snapshot: before,
            targets,
            tolerance,
            plan,
            risk,
        } = self.preview()?;
        info!(
            "Rebalancing {}: total value {}, {} sells, {} buys, {} dust",
            self.account,
            before.total_value,
            plan.sells.len(),
            plan.buys.len(),
            plan.dust.len()
        );

        if risk.has_failures() {
            return Err(Error::RiskFailed(risk.failure_summary()));
        }

        let executor = Executor::new(
            &*self.ledger,
            &*self.venue,
            &self.account,
            &self.base_asset,
            &self.execution,
            self.planner.shortfall,
        );
        let execution = executor.execute(&plan)?;

        let after = self.snapshot()?;
        let reconciliation = reconcile::reconcile(&after, &self.weights);
        info!(
            "Rebalanced {}: total value {}, tracking error {:.3}%",
            self.account, after.total_value, reconciliation.tracking_error_pct
        );

        Ok(RebalanceOutcome {
            before,
            targets,
            tolerance,
            plan,
            risk,
            execution,
            after,
            reconciliation,
        })
    }
}
