//! Target weights and per-asset target values.
//!
//! Weights are integer shares over a common denominator so that targets are
//! computed with the same floor rounding every time. Equal weight is one
//! share per asset over `N`.

use equibasket::{Amount, AssetId};
use serde::Serialize;

use crate::error::{Error, Result};

/// Resolution of fractional weights: parts per million.
pub const PPM: u128 = 1_000_000;

/// How far the fractions may sum away from 1.0.
const SUM_TOLERANCE: f64 = 1e-6;

/// Per-asset weights, index-aligned with the fund's quote assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Weights {
    shares: Vec<u128>,
    denominator: u128,
}

impl Weights {
    /// One share per asset: `target_i = floor(total / n)`.
    pub fn equal(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidConfiguration(
                "basket needs at least one quote asset".into(),
            ));
        }
        Ok(Self {
            shares: vec![1; n],
            denominator: n as u128,
        })
    }

    /// Explicit weights, e.g. `[0.5, 0.25, 0.25]`.
    ///
    /// Every fraction must be finite and strictly positive and the vector
    /// must sum to 1. Fractions are stored as parts per million.
    pub fn from_fractions(fractions: &[f64]) -> Result<Self> {
        if fractions.is_empty() {
            return Err(Error::InvalidConfiguration("weight vector is empty".into()));
        }
        for (i, &w) in fractions.iter().enumerate() {
            if !w.is_finite() || w <= 0.0 {
                return Err(Error::InvalidConfiguration(format!(
                    "weight #{i} ({w}) must be finite and > 0"
                )));
            }
        }
        let sum: f64 = fractions.iter().sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(Error::InvalidConfiguration(format!(
                "weights sum to {sum:.6}, expected 1.0"
            )));
        }

        let shares: Vec<u128> = fractions
            .iter()
            .map(|w| (w * PPM as f64).round() as u128)
            .collect();
        if let Some(i) = shares.iter().position(|&s| s == 0) {
            return Err(Error::InvalidConfiguration(format!(
                "weight #{i} ({}) is below 1 ppm",
                fractions[i]
            )));
        }
        let denominator = shares.iter().sum();
        Ok(Self {
            shares,
            denominator,
        })
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    pub fn shares(&self) -> &[u128] {
        &self.shares
    }

    pub fn denominator(&self) -> u128 {
        self.denominator
    }

    /// Weight of asset `i` as a fraction, for reporting.
    pub fn fraction(&self, i: usize) -> f64 {
        match self.shares.get(i) {
            Some(&s) => s as f64 / self.denominator as f64,
            None => 0.0,
        }
    }

    /// `floor(total * share_i / denominator)`.
    pub fn target_for(&self, i: usize, total: Amount) -> Option<Amount> {
        let share = *self.shares.get(i)?;
        total.mul_div(share, self.denominator)
    }
}

/// Target value in base units for every asset, in fund order.
///
/// The base asset's own target is zero: everything is deployed.
pub fn allocate(
    total: Amount,
    assets: &[AssetId],
    weights: &Weights,
) -> Result<Vec<(AssetId, Amount)>> {
    if assets.is_empty() {
        return Err(Error::InvalidConfiguration(
            "basket needs at least one quote asset".into(),
        ));
    }
    if assets.len() != weights.len() {
        return Err(Error::InvalidConfiguration(format!(
            "{} weights for {} assets",
            weights.len(),
            assets.len()
        )));
    }

    assets
        .iter()
        .enumerate()
        .map(|(i, asset)| {
            let target = weights.target_for(i, total).ok_or_else(|| {
                Error::InvalidConfiguration(format!("target for {asset} overflows"))
            })?;
            Ok((asset.clone(), target))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basket(n: usize) -> Vec<AssetId> {
        (1..=n).map(|i| AssetId::new(format!("TKN{i}"))).collect()
    }

    #[test]
    fn equal_split_floors() {
        let weights = Weights::equal(3).unwrap();
        let targets = allocate(Amount(100), &basket(3), &weights).unwrap();
        assert_eq!(targets.len(), 3);
        assert!(targets.iter().all(|(_, t)| *t == Amount(33)));
        assert_eq!(targets[0].0, AssetId::new("TKN1"));
    }

    #[test]
    fn equal_split_literal_deposit() {
        let weights = Weights::equal(3).unwrap();
        let targets = allocate(Amount(100_000_000_000), &basket(3), &weights).unwrap();
        assert_eq!(targets[2].1, Amount(33_333_333_333));
    }

    #[test]
    fn single_asset_takes_everything() {
        let weights = Weights::equal(1).unwrap();
        let targets = allocate(Amount(7), &basket(1), &weights).unwrap();
        assert_eq!(targets[0].1, Amount(7));
    }

    #[test]
    fn zero_total_targets_zero() {
        let weights = Weights::equal(2).unwrap();
        let targets = allocate(Amount::ZERO, &basket(2), &weights).unwrap();
        assert!(targets.iter().all(|(_, t)| t.is_zero()));
    }

    #[test]
    fn explicit_fractions() {
        let weights = Weights::from_fractions(&[0.5, 0.25, 0.25]).unwrap();
        assert_eq!(weights.shares(), &[500_000, 250_000, 250_000]);
        assert_eq!(weights.denominator(), PPM);
        assert_eq!(weights.fraction(0), 0.5);

        let targets = allocate(Amount(1_000), &basket(3), &weights).unwrap();
        assert_eq!(targets[0].1, Amount(500));
        assert_eq!(targets[1].1, Amount(250));
    }

    #[test]
    fn thirds_as_fractions() {
        let third = 1.0 / 3.0;
        let weights = Weights::from_fractions(&[third, third, third]).unwrap();
        assert_eq!(weights.denominator(), 999_999);
        let targets = allocate(Amount(300), &basket(3), &weights).unwrap();
        assert!(targets.iter().all(|(_, t)| *t == Amount(100)));
    }

    #[test]
    fn reject_empty_basket() {
        assert!(Weights::equal(0).is_err());
        assert!(Weights::from_fractions(&[]).is_err());
        let weights = Weights::equal(1).unwrap();
        assert!(allocate(Amount(1), &[], &weights).is_err());
    }

    #[test]
    fn reject_length_mismatch() {
        let weights = Weights::equal(2).unwrap();
        let err = allocate(Amount(1), &basket(3), &weights).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn reject_bad_fractions() {
        assert!(Weights::from_fractions(&[0.6, 0.5]).is_err());
        assert!(Weights::from_fractions(&[1.2, -0.2]).is_err());
        assert!(Weights::from_fractions(&[1.0, 0.0]).is_err());
        assert!(Weights::from_fractions(&[f64::NAN, 1.0]).is_err());
        assert!(Weights::from_fractions(&[1.0 - 1e-7, 1e-7]).is_err());
    }
}
