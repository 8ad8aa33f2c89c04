//! Swap execution: sells first, then buys.
//!
//! Every swap is bounded by a minimum output derived from a fresh quote and
//! by a deadline `deadline_secs` past the ledger clock at submission. A
//! failed swap stops execution and the error propagates; undoing the swaps
//! already made is the caller's job.

use equibasket::{AccountId, Amount, AssetId, Side, Timestamp};
use equibasket_venue::{Ledger, SwapRequest, Venue};
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::{ExecutionConfig, ShortfallPolicy};
use crate::diff::{TradeDelta, TradePlan};
use crate::error::Result;
use crate::oracle::Oracle;

const BPS: u128 = 10_000;

/// One executed swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapFill {
    pub side: Side,
    /// The quote asset bought or sold.
    pub asset: AssetId,
    pub amount_in: Amount,
    pub min_amount_out: Amount,
    pub amount_out: Amount,
}

/// Everything one execution did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub fills: Vec<SwapFill>,
    /// Buys were scaled down because base ran short.
    pub scaled: bool,
}

impl ExecutionReport {
    pub fn sells(&self) -> impl Iterator<Item = &SwapFill> {
        self.fills.iter().filter(|f| f.side == Side::Sell)
    }

    pub fn buys(&self) -> impl Iterator<Item = &SwapFill> {
        self.fills.iter().filter(|f| f.side == Side::Buy)
    }
}

impl std::fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SWAPS:")?;
        if self.fills.is_empty() {
            return writeln!(f, "  none");
        }
        for (i, fill) in self.fills.iter().enumerate() {
            writeln!(
                f,
                "  {:>3}  {:4} {:8} in {:>40} out {:>40} (min {})",
                i + 1,
                fill.side,
                fill.asset,
                fill.amount_in,
                fill.amount_out,
                fill.min_amount_out,
            )?;
        }
        if self.scaled {
            writeln!(f, "  (buys scaled to available base)")?;
        }
        Ok(())
    }
}

/// `quote * (10_000 - slippage_bps) / 10_000`, rounded down.
pub fn min_amount_out(quote: Amount, slippage_bps: u32) -> Amount {
    let keep = BPS.saturating_sub(u128::from(slippage_bps));
    quote.mul_div(keep, BPS).unwrap_or(Amount::ZERO)
}

/// Shrink buy amounts to what `available` base can pay for.
///
/// Returns the amounts unchanged when they already fit.
pub fn scale_buys(buys: &[Amount], available: Amount, policy: ShortfallPolicy) -> Vec<Amount> {
    let total: Amount = buys.iter().sum();
    if total <= available {
        return buys.to_vec();
    }
    match policy {
        ShortfallPolicy::ProRata => buys
            .iter()
            .map(|b| b.mul_div(available.0, total.0).unwrap_or(Amount::ZERO))
            .collect(),
        ShortfallPolicy::InOrder => {
            let mut remaining = available;
            buys.iter()
                .map(|&b| {
                    let take = b.min(remaining);
                    remaining = remaining.saturating_sub(take);
                    take
                })
                .collect()
        }
    }
}

/// Sends a plan's swaps for one fund.
pub struct Executor<'a, L: ?Sized, V: ?Sized> {
    ledger: &'a L,
    venue: &'a V,
    account: &'a AccountId,
    base: &'a AssetId,
    config: &'a ExecutionConfig,
    shortfall: ShortfallPolicy,
}

impl<'a, L: Ledger + ?Sized, V: Venue + ?Sized> Executor<'a, L, V> {
    pub fn new(
        ledger: &'a L,
        venue: &'a V,
        account: &'a AccountId,
        base: &'a AssetId,
        config: &'a ExecutionConfig,
        shortfall: ShortfallPolicy,
    ) -> Self {
        Self {
            ledger,
            venue,
            account,
            base,
            config,
            shortfall,
        }
    }

    /// Execute every sell, then every buy.
    pub fn execute(&self, plan: &TradePlan) -> Result<ExecutionReport> {
        let oracle = Oracle::new(self.venue);
        let mut report = ExecutionReport::default();

        for delta in &plan.sells {
            if let Some(fill) = self.sell(&oracle, delta)? {
                report.fills.push(fill);
            }
        }

        let wanted: Vec<Amount> = plan.buys.iter().map(|d| d.value).collect();
        let available = self.ledger.balance_of(self.base, self.account)?;
        let amounts = scale_buys(&wanted, available, self.shortfall);
        if amounts != wanted {
            warn!(
                "Base short for buys: {} available, {} planned; scaling {:?}",
                available,
                wanted.iter().sum::<Amount>(),
                self.shortfall
            );
            report.scaled = true;
        }

        for (delta, amount_in) in plan.buys.iter().zip(amounts) {
            if let Some(fill) = self.buy(&oracle, delta, amount_in)? {
                report.fills.push(fill);
            }
        }

        info!(
            "Executed {} swaps ({} sells, {} buys)",
            report.fills.len(),
            report.sells().count(),
            report.buys().count()
        );
        Ok(report)
    }

    fn sell(
        &self,
        oracle: &Oracle<'_, V>,
        delta: &TradeDelta,
    ) -> Result<Option<SwapFill>> {
        let needed = oracle.quote_exact_out(&delta.asset, self.base, delta.value)?;
        let balance = self.ledger.balance_of(&delta.asset, self.account)?;
        let amount_in = needed.min(balance);
        if amount_in.is_zero() {
            debug!("Skipping sell of {}: nothing to sell", delta.asset);
            return Ok(None);
        }
        let expected = oracle.quote(&delta.asset, self.base, amount_in)?;
        self.swap(Side::Sell, &delta.asset, amount_in, expected)
            .map(Some)
    }

    fn buy(
        &self,
        oracle: &Oracle<'_, V>,
        delta: &TradeDelta,
        amount_in: Amount,
    ) -> Result<Option<SwapFill>> {
        if amount_in.is_zero() {
            debug!("Skipping buy of {}: scaled to zero", delta.asset);
            return Ok(None);
        }
        let expected = oracle.quote(self.base, &delta.asset, amount_in)?;
        self.swap(Side::Buy, &delta.asset, amount_in, expected)
            .map(Some)
    }

    fn swap(
        &self,
        side: Side,
        asset: &AssetId,
        amount_in: Amount,
        expected: Amount,
    ) -> Result<SwapFill> {
        let (asset_in, asset_out) = match side {
            Side::Sell => (asset, self.base),
            Side::Buy => (self.base, asset),
        };
        let min_out = min_amount_out(expected, self.config.slippage_bps);
        let deadline: Timestamp = self
            .ledger
            .timestamp()
            .saturating_add(self.config.deadline_secs);

        self.ledger
            .approve(asset_in, self.account, self.venue.account(), amount_in)?;
        let request = SwapRequest {
            sender: self.account.clone(),
            amount_in,
            min_amount_out: min_out,
            path: vec![asset_in.clone(), asset_out.clone()],
            recipient: self.account.clone(),
            deadline,
        };
        let amount_out = self.venue.swap_exact_input(&request)?;
        debug!(
            "{side} {asset}: {amount_in} {asset_in} -> {amount_out} {asset_out} (min {min_out})"
        );

        Ok(SwapFill {
            side,
            asset: asset.clone(),
            amount_in,
            min_amount_out: min_out,
            amount_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use equibasket_venue::{FixedPriceVenue, InMemoryLedger};

    use super::*;
    use crate::error::Error;

    fn usdc() -> AssetId {
        AssetId::new("USDC")
    }
    fn tkn1() -> AssetId {
        AssetId::new("TKN1")
    }
    fn tkn2() -> AssetId {
        AssetId::new("TKN2")
    }
    fn fund() -> AccountId {
        AccountId::new("fund")
    }

    fn amounts(raw: &[u128]) -> Vec<Amount> {
        raw.iter().copied().map(Amount).collect()
    }

    #[test]
    fn min_out_applies_slippage() {
        assert_eq!(min_amount_out(Amount(10_000), 50), Amount(9_950));
        assert_eq!(min_amount_out(Amount(999), 50), Amount(994));
        assert_eq!(min_amount_out(Amount(7), 0), Amount(7));
    }

    #[test]
    fn scale_buys_when_funded_is_identity() {
        let buys = amounts(&[30, 70]);
        assert_eq!(scale_buys(&buys, Amount(100), ShortfallPolicy::ProRata), buys);
    }

    #[test]
    fn scale_buys_pro_rata() {
        let buys = amounts(&[30, 70]);
        assert_eq!(
            scale_buys(&buys, Amount(50), ShortfallPolicy::ProRata),
            amounts(&[15, 35])
        );
    }

    #[test]
    fn scale_buys_in_order() {
        let buys = amounts(&[30, 70, 10]);
        assert_eq!(
            scale_buys(&buys, Amount(50), ShortfallPolicy::InOrder),
            amounts(&[30, 20, 0])
        );
    }

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        venue: FixedPriceVenue,
        config: ExecutionConfig,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedger::with_timestamp(1_000));
        let venue = FixedPriceVenue::builder(Arc::clone(&ledger))
            .with_price(usdc(), 1, 1)
            .with_price(tkn1(), 10, 1)
            .with_price(tkn2(), 2, 1)
            .build();
        for asset in [usdc(), tkn1(), tkn2()] {
            venue.fund_inventory(&asset, Amount(1_000_000)).unwrap();
        }
        Fixture {
            ledger,
            venue,
            config: ExecutionConfig::default(),
        }
    }

    fn delta(asset: AssetId, side: Side, value: u128) -> TradeDelta {
        TradeDelta {
            asset,
            side,
            value: Amount(value),
        }
    }

    #[test]
    fn sells_run_before_buys() {
        let fx = fixture();
        fx.ledger.mint(&tkn1(), &fund(), Amount(50)).unwrap();
        let plan = TradePlan {
            sells: vec![delta(tkn1(), Side::Sell, 200)],
            buys: vec![delta(tkn2(), Side::Buy, 200)],
            dust: vec![],
        };

        let (account, base) = (fund(), usdc());
        let executor = Executor::new(
            &*fx.ledger,
            &fx.venue,
            &account,
            &base,
            &fx.config,
            ShortfallPolicy::ProRata,
        );
        let report = executor.execute(&plan).unwrap();

        assert_eq!(report.fills.len(), 2);
        assert_eq!(report.fills[0].side, Side::Sell);
        assert_eq!(report.fills[0].amount_in, Amount(20));
        assert_eq!(report.fills[0].amount_out, Amount(200));
        assert_eq!(report.fills[1].amount_out, Amount(100));
        assert!(!report.scaled);

        assert_eq!(fx.ledger.balance_of(&tkn1(), &fund()).unwrap(), Amount(30));
        assert_eq!(fx.ledger.balance_of(&tkn2(), &fund()).unwrap(), Amount(100));
        assert_eq!(fx.ledger.balance_of(&usdc(), &fund()).unwrap(), Amount::ZERO);

        let swaps = fx.venue.swaps();
        assert_eq!(swaps[0].deadline, 1_000 + fx.config.deadline_secs);
    }

    #[test]
    fn sell_is_capped_at_balance() {
        let fx = fixture();
        fx.ledger.mint(&tkn1(), &fund(), Amount(5)).unwrap();
        let plan = TradePlan {
            sells: vec![delta(tkn1(), Side::Sell, 200)],
            ..TradePlan::default()
        };
        let (account, base) = (fund(), usdc());
        let executor = Executor::new(
            &*fx.ledger,
            &fx.venue,
            &account,
            &base,
            &fx.config,
            ShortfallPolicy::ProRata,
        );
        let report = executor.execute(&plan).unwrap();
        assert_eq!(report.fills[0].amount_in, Amount(5));
        assert_eq!(fx.ledger.balance_of(&usdc(), &fund()).unwrap(), Amount(50));
    }

    #[test]
    fn short_base_scales_buys() {
        let fx = fixture();
        fx.ledger.mint(&usdc(), &fund(), Amount(100)).unwrap();
        let plan = TradePlan {
            buys: vec![delta(tkn1(), Side::Buy, 100), delta(tkn2(), Side::Buy, 100)],
            ..TradePlan::default()
        };
        let (account, base) = (fund(), usdc());
        let executor = Executor::new(
            &*fx.ledger,
            &fx.venue,
            &account,
            &base,
            &fx.config,
            ShortfallPolicy::InOrder,
        );
        let report = executor.execute(&plan).unwrap();

        assert!(report.scaled);
        assert_eq!(report.fills.len(), 1);
        assert_eq!(report.fills[0].asset, tkn1());
        assert_eq!(fx.ledger.balance_of(&tkn1(), &fund()).unwrap(), Amount(10));
    }

    #[test]
    fn slippage_failure_propagates() {
        let fx = fixture();
        fx.venue.set_swap_mode(equibasket_venue::SwapMode::ShortFill(200));
        fx.ledger.mint(&usdc(), &fund(), Amount(1_000)).unwrap();
        let plan = TradePlan {
            buys: vec![delta(tkn1(), Side::Buy, 1_000)],
            ..TradePlan::default()
        };
        let (account, base) = (fund(), usdc());
        let executor = Executor::new(
            &*fx.ledger,
            &fx.venue,
            &account,
            &base,
            &fx.config,
            ShortfallPolicy::ProRata,
        );
        let err = executor.execute(&plan).unwrap_err();
        // quote 100, 50 bps tolerance: min 99, venue pays 98
        assert!(matches!(
            err,
            Error::SlippageExceeded {
                min_amount_out: Amount(99),
                amount_out: Amount(98),
            }
        ));
    }

    #[test]
    fn each_swap_gets_its_own_deadline() {
        let ledger = Arc::new(InMemoryLedger::with_timestamp(1_000));
        let venue = FixedPriceVenue::builder(Arc::clone(&ledger))
            .with_price(usdc(), 1, 1)
            .with_price(tkn1(), 10, 1)
            .with_price(tkn2(), 2, 1)
            .execution_delay(40)
            .build();
        for asset in [tkn1(), tkn2()] {
            venue.fund_inventory(&asset, Amount(1_000_000)).unwrap();
        }
        ledger.mint(&usdc(), &fund(), Amount(200)).unwrap();
        let config = ExecutionConfig {
            deadline_secs: 60,
            ..ExecutionConfig::default()
        };
        let plan = TradePlan {
            buys: vec![delta(tkn1(), Side::Buy, 100), delta(tkn2(), Side::Buy, 100)],
            ..TradePlan::default()
        };

        let (account, base) = (fund(), usdc());
        let executor = Executor::new(
            &*ledger,
            &venue,
            &account,
            &base,
            &config,
            ShortfallPolicy::ProRata,
        );
        // the second swap lands at 1080, past a deadline fixed before the first
        let report = executor.execute(&plan).unwrap();
        assert_eq!(report.fills.len(), 2);
        let deadlines: Vec<_> = venue.swaps().iter().map(|s| s.deadline).collect();
        assert_eq!(deadlines, vec![1_060, 1_100]);
        assert_eq!(ledger.timestamp(), 1_080);
    }

    #[test]
    fn display_report() {
        let report = ExecutionReport::default();
        assert!(report.to_string().contains("none"));
    }
}
