//! Post-execution reconciliation: compare actual holdings vs target weights.

use equibasket::{Amount, AssetId};
use serde::Serialize;

use crate::target::Weights;
use crate::valuation::PortfolioSnapshot;

/// Reconciliation report comparing actual vs target.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub entries: Vec<ReconcileEntry>,
    pub total_value: Amount,
    pub tracking_error_pct: f64,
}

/// One asset's reconciliation entry.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileEntry {
    pub asset: AssetId,
    pub target_weight: f64,
    pub actual_weight: f64,
    /// `actual - target`, in basis points of total value.
    pub drift_bps: i64,
    pub target_value: Amount,
    pub actual_value: Amount,
}

impl ReconcileReport {
    /// Largest absolute drift across assets, in basis points.
    pub fn max_drift_bps(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.drift_bps.unsigned_abs())
            .max()
            .unwrap_or(0)
    }
}

/// Compare a post-rebalance snapshot against the fund's weights.
///
/// Quote assets are matched to weights by position; leftover base counts
/// as an asset with target weight zero.
pub fn reconcile(after: &PortfolioSnapshot, weights: &Weights) -> ReconcileReport {
    let total = after.total_value;
    let weight_of = |value: Amount| {
        if total.is_zero() {
            0.0
        } else {
            value.0 as f64 / total.0 as f64
        }
    };

    let mut entries = Vec::with_capacity(after.quotes.len() + 1);
    let mut sum_sq_diff = 0.0_f64;

    for (i, holding) in after.quotes.iter().enumerate() {
        let target_weight = weights.fraction(i);
        let actual_weight = weight_of(holding.value);
        let diff = actual_weight - target_weight;
        sum_sq_diff += diff * diff;

        entries.push(ReconcileEntry {
            asset: holding.asset.clone(),
            target_weight,
            actual_weight,
            drift_bps: (diff * 10_000.0).round() as i64,
            target_value: weights.target_for(i, total).unwrap_or(Amount::ZERO),
            actual_value: holding.value,
        });
    }

    let base_weight = weight_of(after.base.value);
    sum_sq_diff += base_weight * base_weight;
    entries.push(ReconcileEntry {
        asset: after.base.asset.clone(),
        target_weight: 0.0,
        actual_weight: base_weight,
        drift_bps: (base_weight * 10_000.0).round() as i64,
        target_value: Amount::ZERO,
        actual_value: after.base.value,
    });

    let tracking_error_pct = (sum_sq_diff / entries.len() as f64).sqrt() * 100.0;

    ReconcileReport {
        entries,
        total_value: total,
        tracking_error_pct,
    }
}

impl std::fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "RECONCILIATION:")?;
        writeln!(
            f,
            "  {:8} {:>10} {:>10} {:>10} {:>24} {:>24}",
            "Asset", "Target%", "Actual%", "Drift", "TargetValue", "ActualValue"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "  {:8} {:>9.2}% {:>9.2}% {:>+7}bps {:>24} {:>24}",
                e.asset,
                e.target_weight * 100.0,
                e.actual_weight * 100.0,
                e.drift_bps,
                e.target_value,
                e.actual_value,
            )?;
        }
        writeln!(f, "\n  Tracking error: {:.3}%", self.tracking_error_pct)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::Holding;

    fn holding(asset: &str, value: u128) -> Holding {
        Holding {
            asset: AssetId::new(asset),
            amount: Amount(value),
            value: Amount(value),
            impact: Amount::ZERO,
        }
    }

    fn snapshot(base: u128, quotes: &[(&str, u128)]) -> PortfolioSnapshot {
        let quotes: Vec<Holding> = quotes.iter().map(|(a, v)| holding(a, *v)).collect();
        let total_value = Amount(base + quotes.iter().map(|h| h.value.0).sum::<u128>());
        PortfolioSnapshot {
            base: holding("USDC", base),
            quotes,
            total_value,
        }
    }

    #[test]
    fn perfect_match() {
        let after = snapshot(0, &[("TKN1", 500), ("TKN2", 500)]);
        let report = reconcile(&after, &Weights::equal(2).unwrap());
        assert!(report.tracking_error_pct < 1e-9);
        assert_eq!(report.max_drift_bps(), 0);
        assert_eq!(report.entries[0].target_value, Amount(500));
    }

    #[test]
    fn drift_is_reported() {
        let after = snapshot(0, &[("TKN1", 600), ("TKN2", 400)]);
        let report = reconcile(&after, &Weights::equal(2).unwrap());
        assert_eq!(report.entries[0].drift_bps, 1_000);
        assert_eq!(report.entries[1].drift_bps, -1_000);
        assert_eq!(report.max_drift_bps(), 1_000);
        assert!(report.tracking_error_pct > 1.0);
    }

    #[test]
    fn idle_base_counts_as_drift() {
        let after = snapshot(1_000, &[("TKN1", 0)]);
        let report = reconcile(&after, &Weights::equal(1).unwrap());
        let base = report.entries.iter().find(|e| e.asset.as_str() == "USDC").unwrap();
        assert_eq!(base.target_weight, 0.0);
        assert_eq!(base.drift_bps, 10_000);
    }

    #[test]
    fn empty_fund() {
        let after = snapshot(0, &[("TKN1", 0)]);
        let report = reconcile(&after, &Weights::equal(1).unwrap());
        assert_eq!(report.entries[0].actual_weight, 0.0);
    }

    #[test]
    fn display_format() {
        let after = snapshot(1, &[("TKN1", 499), ("TKN2", 500)]);
        let s = reconcile(&after, &Weights::equal(2).unwrap()).to_string();
        assert!(s.contains("TKN1"));
        assert!(s.contains("Tracking error"));
    }
}
