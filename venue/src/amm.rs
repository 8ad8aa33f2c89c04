//! Constant-product router (`x * y = k`, fee taken on input).
//!
//! Each pair is an account on the ledger; its reserves are simply that
//! account's balances of the two assets. Reverting the ledger therefore
//! reverts the pools too.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alloy_primitives::U256;
use alloy_primitives::ruint::UintTryTo;
use equibasket::{AccountId, Amount, AssetId};
use log::debug;
use rustc_hash::FxHashMap;

use crate::error::VenueError;
use crate::types::{SwapRequest, validate_path};
use crate::{Ledger, Venue};

/// Fee denominator: fees are expressed in basis points.
pub const BPS: u128 = 10_000;

/// Default pool fee, 0.30%.
pub const DEFAULT_FEE_BPS: u32 = 30;

fn narrow(value: U256) -> Result<Amount, VenueError> {
    let raw: u128 = value
        .uint_try_to()
        .map_err(|_| VenueError::Other("amount overflows 128 bits".into()))?;
    Ok(Amount(raw))
}

/// Output for an exact input against reserves `(reserve_in, reserve_out)`.
///
/// `out = in·(1-fee)·r_out / (r_in + in·(1-fee))`, rounded down.
pub fn get_amount_out(
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee_bps: u32,
) -> Result<Amount, VenueError> {
    if amount_in.is_zero() {
        return Err(VenueError::InsufficientInput);
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(VenueError::Other("empty reserves".into()));
    }
    let in_with_fee = U256::from(amount_in.0) * U256::from(BPS - u128::from(fee_bps));
    let numerator = in_with_fee * U256::from(reserve_out.0);
    let denominator = U256::from(reserve_in.0) * U256::from(BPS) + in_with_fee;
    narrow(numerator / denominator)
}

/// Input required for an exact output, rounded up by one unit.
pub fn get_amount_in(
    amount_out: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee_bps: u32,
) -> Result<Amount, VenueError> {
    if amount_out.is_zero() {
        return Err(VenueError::InsufficientInput);
    }
    if reserve_in.is_zero() || amount_out >= reserve_out {
        return Err(VenueError::Other("output exceeds reserves".into()));
    }
    let numerator = U256::from(reserve_in.0) * U256::from(amount_out.0) * U256::from(BPS);
    let denominator =
        U256::from(reserve_out.0 - amount_out.0) * U256::from(BPS - u128::from(fee_bps));
    narrow(numerator / denominator + U256::from(1u8))
}

fn pair_key(a: &AssetId, b: &AssetId) -> (AssetId, AssetId) {
    if a < b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// A multi-pair constant-product router over a shared ledger.
pub struct ConstantProductVenue<L> {
    ledger: Arc<L>,
    account: AccountId,
    fee_bps: u32,
    pairs: Mutex<FxHashMap<(AssetId, AssetId), AccountId>>,
}

impl<L: Ledger> ConstantProductVenue<L> {
    pub fn new(ledger: Arc<L>, account: AccountId) -> Self {
        Self::with_fee(ledger, account, DEFAULT_FEE_BPS)
    }

    /// # Panics
    ///
    /// Panics if `fee_bps` is not below 10 000.
    #[track_caller]
    pub fn with_fee(ledger: Arc<L>, account: AccountId, fee_bps: u32) -> Self {
        assert!(u128::from(fee_bps) < BPS, "fee must be below 100%");
        Self {
            ledger,
            account,
            fee_bps,
            pairs: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    fn pairs(&self) -> MutexGuard<'_, FxHashMap<(AssetId, AssetId), AccountId>> {
        self.pairs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the pair `a`/`b` and return its account. Idempotent.
    pub fn create_pair(&self, a: &AssetId, b: &AssetId) -> Result<AccountId, VenueError> {
        validate_path(&[a.clone(), b.clone()])?;
        let key = pair_key(a, b);
        let account = self
            .pairs()
            .entry(key.clone())
            .or_insert_with(|| AccountId::new(format!("pair:{}/{}", key.0, key.1)))
            .clone();
        Ok(account)
    }

    /// Account holding the reserves of `a`/`b`, if the pair exists.
    pub fn pair(&self, a: &AssetId, b: &AssetId) -> Option<AccountId> {
        self.pairs().get(&pair_key(a, b)).cloned()
    }

    /// Seed a pool from `provider`'s balances, creating the pair if needed.
    pub fn add_liquidity(
        &self,
        provider: &AccountId,
        a: &AssetId,
        b: &AssetId,
        amount_a: Amount,
        amount_b: Amount,
    ) -> Result<AccountId, VenueError> {
        let pair = self.create_pair(a, b)?;
        self.ledger.transfer(a, provider, &pair, amount_a)?;
        self.ledger.transfer(b, provider, &pair, amount_b)?;
        debug!("Liquidity added to {pair}: {amount_a} {a} + {amount_b} {b}");
        Ok(pair)
    }

    /// `(reserve_in, reserve_out, pair account)` for one hop.
    pub fn reserves(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
    ) -> Result<(Amount, Amount, AccountId), VenueError> {
        let no_liquidity = || VenueError::NoLiquidity {
            asset_in: asset_in.clone(),
            asset_out: asset_out.clone(),
        };
        let pair = self.pair(asset_in, asset_out).ok_or_else(no_liquidity)?;
        let reserve_in = self.ledger.balance_of(asset_in, &pair)?;
        let reserve_out = self.ledger.balance_of(asset_out, &pair)?;
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return Err(no_liquidity());
        }
        Ok((reserve_in, reserve_out, pair))
    }
}

impl<L: Ledger> Venue for ConstantProductVenue<L> {
    fn account(&self) -> &AccountId {
        &self.account
    }

    fn quote(&self, amount_in: Amount, path: &[AssetId]) -> Result<Vec<Amount>, VenueError> {
        validate_path(path)?;
        let mut amounts = Vec::with_capacity(path.len());
        amounts.push(amount_in);
        for hop in path.windows(2) {
            let (reserve_in, reserve_out, _) = self.reserves(&hop[0], &hop[1])?;
            let last = amounts[amounts.len() - 1];
            amounts.push(get_amount_out(last, reserve_in, reserve_out, self.fee_bps)?);
        }
        Ok(amounts)
    }

    fn quote_in(&self, amount_out: Amount, path: &[AssetId]) -> Result<Vec<Amount>, VenueError> {
        validate_path(path)?;
        let mut amounts = vec![Amount::ZERO; path.len()];
        amounts[path.len() - 1] = amount_out;
        for i in (1..path.len()).rev() {
            let (reserve_in, reserve_out, _) = self.reserves(&path[i - 1], &path[i])?;
            amounts[i - 1] = get_amount_in(amounts[i], reserve_in, reserve_out, self.fee_bps)?;
        }
        Ok(amounts)
    }

    fn swap_exact_input(&self, request: &SwapRequest) -> Result<Amount, VenueError> {
        let now = self.ledger.timestamp();
        if now > request.deadline {
            return Err(VenueError::DeadlineExpired {
                deadline: request.deadline,
                now,
            });
        }

        let amounts = self.quote(request.amount_in, &request.path)?;
        let amount_out = amounts[amounts.len() - 1];
        if amount_out < request.min_amount_out {
            return Err(VenueError::SlippageExceeded {
                min_amount_out: request.min_amount_out,
                amount_out,
            });
        }

        let pairs = request
            .path
            .windows(2)
            .map(|hop| self.reserves(&hop[0], &hop[1]).map(|(_, _, pair)| pair))
            .collect::<Result<Vec<_>, _>>()?;

        self.ledger.transfer_from(
            &request.path[0],
            &self.account,
            &request.sender,
            &pairs[0],
            request.amount_in,
        )?;
        for (i, pair) in pairs.iter().enumerate() {
            let to = pairs.get(i + 1).unwrap_or(&request.recipient);
            self.ledger
                .transfer(&request.path[i + 1], pair, to, amounts[i + 1])?;
        }

        debug!(
            "Swapped {} {} -> {} {}",
            request.amount_in,
            request.path[0],
            amount_out,
            request.path[request.path.len() - 1],
        );
        Ok(amount_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryLedger;

    const E18: u128 = 1_000_000_000_000_000_000;
    const E6: u128 = 1_000_000;

    fn usdc() -> AssetId {
        AssetId::new("USDC")
    }
    fn tkn() -> AssetId {
        AssetId::new("TKN")
    }
    fn lp() -> AccountId {
        AccountId::new("lp")
    }
    fn trader() -> AccountId {
        AccountId::new("trader")
    }

    fn venue_with_pool() -> (Arc<InMemoryLedger>, ConstantProductVenue<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::with_timestamp(1_000));
        ledger.mint(&tkn(), &lp(), Amount(1_000_000 * E18)).unwrap();
        ledger.mint(&usdc(), &lp(), Amount(100_000_000 * E6)).unwrap();
        let venue = ConstantProductVenue::new(Arc::clone(&ledger), AccountId::new("router"));
        venue
            .add_liquidity(
                &lp(),
                &tkn(),
                &usdc(),
                Amount(1_000_000 * E18),
                Amount(100_000_000 * E6),
            )
            .unwrap();
        (ledger, venue)
    }

    #[test]
    fn amount_out_matches_reference_router() {
        // 33,333.333333 USDC into a 100M USDC / 1M TKN pool
        let out = get_amount_out(
            Amount(33_333_333_333),
            Amount(100_000_000 * E6),
            Amount(1_000_000 * E18),
            30,
        )
        .unwrap();
        assert_eq!(out, Amount(332_222_924_578_076_323_389));
    }

    #[test]
    fn amount_in_covers_amount_out() {
        let (r_in, r_out) = (Amount(1_000_000 * E18), Amount(100_000_000 * E6));
        let wanted = Amount(44_389_529_997);
        let needed = get_amount_in(wanted, r_in, r_out, 30).unwrap();
        assert!(get_amount_out(needed, r_in, r_out, 30).unwrap() >= wanted);
        assert!(get_amount_out(Amount(needed.0 - 1), r_in, r_out, 30).unwrap() <= wanted);
    }

    #[test]
    fn zero_input_is_rejected() {
        assert_eq!(
            get_amount_out(Amount::ZERO, Amount(1), Amount(1), 30),
            Err(VenueError::InsufficientInput)
        );
    }

    #[test]
    fn missing_pair_has_no_liquidity() {
        let (_, venue) = venue_with_pool();
        let err = venue
            .quote(Amount(1), &[AssetId::new("OTHER"), usdc()])
            .unwrap_err();
        assert!(matches!(err, VenueError::NoLiquidity { .. }));
    }

    #[test]
    fn quote_in_inverts_quote() {
        let (_, venue) = venue_with_pool();
        let path = [tkn(), usdc()];
        let amounts_in = venue.quote_in(Amount(500 * E6), &path).unwrap();
        let amounts_out = venue.quote(amounts_in[0], &path).unwrap();
        assert!(amounts_out[1] >= Amount(500 * E6));
    }

    #[test]
    fn swap_moves_reserves_and_balances() {
        let (ledger, venue) = venue_with_pool();
        ledger.mint(&usdc(), &trader(), Amount(1_000 * E6)).unwrap();
        ledger
            .approve(&usdc(), &trader(), venue.account(), Amount(1_000 * E6))
            .unwrap();

        let quoted = venue.quote(Amount(1_000 * E6), &[usdc(), tkn()]).unwrap()[1];
        let out = venue
            .swap_exact_input(&SwapRequest {
                sender: trader(),
                amount_in: Amount(1_000 * E6),
                min_amount_out: quoted,
                path: vec![usdc(), tkn()],
                recipient: trader(),
                deadline: 2_000,
            })
            .unwrap();

        assert_eq!(out, quoted);
        assert_eq!(ledger.balance_of(&tkn(), &trader()).unwrap(), out);
        assert_eq!(ledger.balance_of(&usdc(), &trader()).unwrap(), Amount::ZERO);
        let (r_usdc, r_tkn, _) = venue.reserves(&usdc(), &tkn()).unwrap();
        assert_eq!(r_usdc, Amount(100_001_000 * E6));
        assert_eq!(r_tkn, Amount(1_000_000 * E18 - out.0));
    }

    #[test]
    fn swap_enforces_min_out_and_deadline() {
        let (ledger, venue) = venue_with_pool();
        ledger.mint(&usdc(), &trader(), Amount(10 * E6)).unwrap();
        ledger
            .approve(&usdc(), &trader(), venue.account(), Amount::MAX)
            .unwrap();
        let mut request = SwapRequest {
            sender: trader(),
            amount_in: Amount(10 * E6),
            min_amount_out: Amount(E18),
            path: vec![usdc(), tkn()],
            recipient: trader(),
            deadline: 2_000,
        };

        assert!(matches!(
            venue.swap_exact_input(&request),
            Err(VenueError::SlippageExceeded { .. })
        ));

        request.min_amount_out = Amount(1);
        request.deadline = 999;
        assert_eq!(
            venue.swap_exact_input(&request),
            Err(VenueError::DeadlineExpired {
                deadline: 999,
                now: 1_000
            })
        );
        assert_eq!(ledger.balance_of(&usdc(), &trader()).unwrap(), Amount(10 * E6));
    }

    #[test]
    fn multi_hop_routes_through_base() {
        let (ledger, venue) = venue_with_pool();
        let other = AssetId::new("OTHER");
        ledger.mint(&other, &lp(), Amount(500_000 * E18)).unwrap();
        ledger.mint(&usdc(), &lp(), Amount(50_000_000 * E6)).unwrap();
        venue
            .add_liquidity(&lp(), &other, &usdc(), Amount(500_000 * E18), Amount(50_000_000 * E6))
            .unwrap();

        ledger.mint(&tkn(), &trader(), Amount(E18)).unwrap();
        ledger.approve(&tkn(), &trader(), venue.account(), Amount::MAX).unwrap();
        let path = vec![tkn(), usdc(), other.clone()];
        let quoted = venue.quote(Amount(E18), &path).unwrap();
        assert_eq!(quoted.len(), 3);

        let out = venue
            .swap_exact_input(&SwapRequest {
                sender: trader(),
                amount_in: Amount(E18),
                min_amount_out: Amount(1),
                path,
                recipient: trader(),
                deadline: 1_000,
            })
            .unwrap();
        assert_eq!(out, quoted[2]);
        assert_eq!(ledger.balance_of(&other, &trader()).unwrap(), out);
        assert_eq!(ledger.balance_of(&usdc(), &trader()).unwrap(), Amount::ZERO);
    }
}
