//! Portfolio valuation in base units.
//!
//! A holding is worth what the venue would pay for all of it right now, so
//! price impact and the venue fee are part of the valuation. Because of
//! that impact a freshly rebalanced basket never values out at exactly its
//! targets; each holding also carries an estimate of the impact so the
//! planner can tell that residue apart from real drift.

use equibasket::{AccountId, Amount, AssetId};
use equibasket_venue::{Ledger, Venue};
use serde::Serialize;

use crate::error::Result;
use crate::oracle::Oracle;

/// One asset balance and its value in base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Holding {
    pub asset: AssetId,
    pub amount: Amount,
    pub value: Amount,
    /// Value lost to price impact when all of `amount` is sold at once.
    pub impact: Amount,
}

/// Balances and values of the fund at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortfolioSnapshot {
    pub base: Holding,
    /// In fund order.
    pub quotes: Vec<Holding>,
    pub total_value: Amount,
}

impl PortfolioSnapshot {
    pub fn holding(&self, asset: &AssetId) -> Option<&Holding> {
        if &self.base.asset == asset {
            return Some(&self.base);
        }
        self.quotes.iter().find(|h| &h.asset == asset)
    }

    /// Largest liquidation impact among the quote holdings.
    pub fn max_impact(&self) -> Amount {
        self.quotes
            .iter()
            .map(|h| h.impact)
            .max()
            .unwrap_or(Amount::ZERO)
    }
}

/// Value `amount` of `asset` in `base`.
pub fn value_of<V: Venue + ?Sized>(
    oracle: &Oracle<'_, V>,
    base: &AssetId,
    asset: &AssetId,
    amount: Amount,
) -> Result<Amount> {
    oracle.quote(asset, base, amount)
}

/// Price impact of selling `amount` of `asset` in one swap, given its full
/// sale `value`.
///
/// Estimated from the curvature of the quote: `2 * (2 * q(amount / 2) - q(amount))`.
/// For a constant-product pool this is the gap between the marginal and the
/// realised price to first order; for a linear venue it is zero.
pub fn liquidation_impact<V: Venue + ?Sized>(
    oracle: &Oracle<'_, V>,
    base: &AssetId,
    asset: &AssetId,
    amount: Amount,
    value: Amount,
) -> Result<Amount> {
    if amount.0 < 2 {
        return Ok(Amount::ZERO);
    }
    let half = value_of(oracle, base, asset, Amount(amount.0 / 2))?;
    let curvature = half.0.saturating_mul(2).saturating_sub(value.0);
    Ok(Amount(curvature.saturating_mul(2)))
}

/// Read every balance of `holder` from the ledger and value it.
pub fn snapshot<L: Ledger + ?Sized, V: Venue + ?Sized>(
    ledger: &L,
    oracle: &Oracle<'_, V>,
    holder: &AccountId,
    base: &AssetId,
    quotes: &[AssetId],
) -> Result<PortfolioSnapshot> {
    let base_amount = ledger.balance_of(base, holder)?;
    let base = Holding {
        asset: base.clone(),
        amount: base_amount,
        value: base_amount,
        impact: Amount::ZERO,
    };

    let quotes = quotes
        .iter()
        .map(|asset| {
            let amount = ledger.balance_of(asset, holder)?;
            let value = value_of(oracle, &base.asset, asset, amount)?;
            let impact = liquidation_impact(oracle, &base.asset, asset, amount, value)?;
            Ok(Holding {
                asset: asset.clone(),
                amount,
                value,
                impact,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let total_value = std::iter::once(base.value)
        .chain(quotes.iter().map(|h| h.value))
        .sum();
    Ok(PortfolioSnapshot {
        base,
        quotes,
        total_value,
    })
}
