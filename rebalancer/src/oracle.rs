//! Price oracle: venue quotes for a single hop.

use equibasket::{Amount, AssetId};
use equibasket_venue::{Venue, VenueError};

use crate::error::{Error, Result};

/// Quotes conversions between two assets through a venue.
///
/// Every call goes to the venue; nothing is cached, so two quotes in the same
/// rebalance see whatever state the venue is in at that moment.
pub struct Oracle<'a, V: ?Sized> {
    venue: &'a V,
}

impl<'a, V: Venue + ?Sized> Oracle<'a, V> {
    pub fn new(venue: &'a V) -> Self {
        Self { venue }
    }

    /// How much `asset_out` `amount_in` of `asset_in` would fetch.
    pub fn quote(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount_in: Amount,
    ) -> Result<Amount> {
        if asset_in == asset_out || amount_in.is_zero() {
            return Ok(amount_in);
        }
        let path = [asset_in.clone(), asset_out.clone()];
        let amounts = self
            .venue
            .quote(amount_in, &path)
            .map_err(|e| quote_error(e, asset_in, asset_out))?;
        amounts
            .last()
            .copied()
            .ok_or_else(|| empty_quote(asset_in, asset_out))
    }

    /// How much `asset_in` is needed to receive `amount_out` of `asset_out`.
    pub fn quote_exact_out(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount_out: Amount,
    ) -> Result<Amount> {
        if asset_in == asset_out || amount_out.is_zero() {
            return Ok(amount_out);
        }
        let path = [asset_in.clone(), asset_out.clone()];
        let amounts = self
            .venue
            .quote_in(amount_out, &path)
            .map_err(|e| quote_error(e, asset_in, asset_out))?;
        amounts
            .first()
            .copied()
            .ok_or_else(|| empty_quote(asset_in, asset_out))
    }
}

fn quote_error(e: VenueError, asset_in: &AssetId, asset_out: &AssetId) -> Error {
    match e {
        VenueError::NoLiquidity { .. } => Error::NoLiquidity {
            asset_in: asset_in.clone(),
            asset_out: asset_out.clone(),
        },
        other => Error::QuoteFailure(format!("{asset_in} -> {asset_out}: {other}")),
    }
}

fn empty_quote(asset_in: &AssetId, asset_out: &AssetId) -> Error {
    Error::QuoteFailure(format!("empty quote for {asset_in} -> {asset_out}"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use equibasket_venue::{FixedPriceVenue, InMemoryLedger};

    use super::*;

    fn usdc() -> AssetId {
        AssetId::new("USDC")
    }
    fn tkn() -> AssetId {
        AssetId::new("TKN")
    }

    fn venue() -> FixedPriceVenue {
        FixedPriceVenue::builder(Arc::new(InMemoryLedger::new()))
            .with_price(usdc(), 1, 1)
            .with_price(tkn(), 250, 1)
            .build()
    }

    #[test]
    fn same_asset_is_identity() {
        let venue = venue();
        let oracle = Oracle::new(&venue);
        assert_eq!(oracle.quote(&usdc(), &usdc(), Amount(42)).unwrap(), Amount(42));
        assert_eq!(
            oracle.quote_exact_out(&tkn(), &tkn(), Amount(42)).unwrap(),
            Amount(42)
        );
    }

    #[test]
    fn zero_quotes_to_zero() {
        let venue = venue();
        let oracle = Oracle::new(&venue);
        assert_eq!(oracle.quote(&tkn(), &usdc(), Amount::ZERO).unwrap(), Amount::ZERO);
    }

    #[test]
    fn delegates_to_venue() {
        let venue = venue();
        let oracle = Oracle::new(&venue);
        assert_eq!(oracle.quote(&tkn(), &usdc(), Amount(4)).unwrap(), Amount(1_000));
        assert_eq!(
            oracle.quote_exact_out(&tkn(), &usdc(), Amount(1_000)).unwrap(),
            Amount(4)
        );
    }

    #[test]
    fn unknown_pair_is_no_liquidity() {
        let venue = venue();
        let oracle = Oracle::new(&venue);
        let err = oracle
            .quote(&AssetId::new("NOPE"), &usdc(), Amount(1))
            .unwrap_err();
        assert!(matches!(err, Error::NoLiquidity { .. }));
    }
}
