//! Fixed-price venue for testing. Implements `Venue` with configurable behavior.
//!
//! Prices never move, so a rebalance against this venue converges exactly
//! and a second rebalance finds nothing to do.
//!
//! ```ignore
//! use equibasket_venue::mock::{FixedPriceVenue, SwapMode};
//!
//! let venue = FixedPriceVenue::builder(ledger.clone())
//!     .with_price(usdc.clone(), 1, 1)
//!     .with_price(tkn.clone(), 100_000_000, 1_000_000_000_000_000_000) // $100 per 1e18 units
//!     .swap_mode(SwapMode::ShortFill(100))
//!     .build();
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alloy_primitives::U256;
use alloy_primitives::ruint::UintTryTo;
use equibasket::{AccountId, Amount, AssetId, Timestamp};
use rustc_hash::FxHashMap;

use crate::amm::BPS;
use crate::error::VenueError;
use crate::ledger::InMemoryLedger;
use crate::types::{SwapRequest, validate_path};
use crate::{Ledger, Venue};

/// How the mock venue settles swaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapMode {
    /// Deliver exactly the quoted output.
    Exact,
    /// Deliver the quote minus this many basis points, as if the price moved
    /// between quoting and execution.
    ShortFill(u32),
    /// Reject every swap.
    Reject,
}

/// A recorded swap for assertion in tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedSwap {
    pub sender: AccountId,
    pub path: Vec<AssetId>,
    pub amount_in: Amount,
    pub min_amount_out: Amount,
    pub amount_out: Amount,
    pub deadline: Timestamp,
}

/// Called in the middle of every swap, after input is pulled and before
/// output is paid. Lets tests re-enter the caller.
pub type SwapHook = Arc<dyn Fn() + Send + Sync>;

/// Price of one asset: `units` raw of the asset are worth `value` raw of the
/// numeraire.
#[derive(Clone, Copy, Debug)]
struct Rate {
    value: u128,
    units: u128,
}

/// Builder for `FixedPriceVenue`.
pub struct FixedPriceVenueBuilder {
    ledger: Arc<InMemoryLedger>,
    account: AccountId,
    rates: FxHashMap<AssetId, Rate>,
    fee_bps: u32,
    mode: SwapMode,
    execution_delay: u64,
    illiquid: Vec<AssetId>,
}

impl FixedPriceVenueBuilder {
    pub fn account(mut self, account: AccountId) -> Self {
        self.account = account;
        self
    }

    /// `units` raw of `asset` trade for `value` raw of the numeraire.
    ///
    /// Give the base asset `(1, 1)` to make it the numeraire.
    ///
    /// # Panics
    ///
    /// Panics if either side is zero.
    #[track_caller]
    pub fn with_price(mut self, asset: AssetId, value: u128, units: u128) -> Self {
        assert!(value > 0 && units > 0, "price terms must be positive");
        self.rates.insert(asset, Rate { value, units });
        self
    }

    pub fn fee_bps(mut self, fee_bps: u32) -> Self {
        self.fee_bps = fee_bps;
        self
    }

    pub fn swap_mode(mut self, mode: SwapMode) -> Self {
        self.mode = mode;
        self
    }

    /// Advance the ledger clock by `secs` at the start of every swap.
    pub fn execution_delay(mut self, secs: u64) -> Self {
        self.execution_delay = secs;
        self
    }

    /// Quotes touching `asset` fail with `NoLiquidity`.
    pub fn without_liquidity(mut self, asset: AssetId) -> Self {
        self.illiquid.push(asset);
        self
    }

    pub fn build(self) -> FixedPriceVenue {
        FixedPriceVenue {
            ledger: self.ledger,
            account: self.account,
            rates: self.rates,
            fee_bps: self.fee_bps,
            mode: Mutex::new(self.mode),
            execution_delay: self.execution_delay,
            illiquid: self.illiquid,
            swaps: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
        }
    }
}

/// A venue that trades any priced pair at a fixed rate out of its own
/// ledger inventory.
pub struct FixedPriceVenue {
    ledger: Arc<InMemoryLedger>,
    account: AccountId,
    rates: FxHashMap<AssetId, Rate>,
    fee_bps: u32,
    mode: Mutex<SwapMode>,
    execution_delay: u64,
    illiquid: Vec<AssetId>,
    swaps: Mutex<Vec<RecordedSwap>>,
    hook: Mutex<Option<SwapHook>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FixedPriceVenue {
    pub fn builder(ledger: Arc<InMemoryLedger>) -> FixedPriceVenueBuilder {
        FixedPriceVenueBuilder {
            ledger,
            account: AccountId::new("mock-venue"),
            rates: FxHashMap::default(),
            fee_bps: 0,
            mode: SwapMode::Exact,
            execution_delay: 0,
            illiquid: Vec::new(),
        }
    }

    /// Get all swaps that settled (for assertion in tests).
    pub fn swaps(&self) -> Vec<RecordedSwap> {
        lock(&self.swaps).clone()
    }

    pub fn set_swap_mode(&self, mode: SwapMode) {
        *lock(&self.mode) = mode;
    }

    pub fn set_swap_hook(&self, hook: SwapHook) {
        *lock(&self.hook) = Some(hook);
    }

    /// Credit the venue with inventory it can pay out.
    pub fn fund_inventory(&self, asset: &AssetId, amount: Amount) -> Result<(), VenueError> {
        self.ledger.mint(asset, &self.account, amount)
    }

    fn rate(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        asset: &AssetId,
    ) -> Result<Rate, VenueError> {
        if self.illiquid.contains(asset) {
            return Err(VenueError::NoLiquidity {
                asset_in: asset_in.clone(),
                asset_out: asset_out.clone(),
            });
        }
        self.rates
            .get(asset)
            .copied()
            .ok_or_else(|| VenueError::NoLiquidity {
                asset_in: asset_in.clone(),
                asset_out: asset_out.clone(),
            })
    }

    /// Conversion factor `(mul, div)` from raw `asset_in` to raw `asset_out`.
    fn factor(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
    ) -> Result<(U256, U256), VenueError> {
        let from = self.rate(asset_in, asset_out, asset_in)?;
        let to = self.rate(asset_in, asset_out, asset_out)?;
        let mul = U256::from(from.value) * U256::from(to.units);
        let div = U256::from(from.units) * U256::from(to.value);
        Ok((mul, div))
    }

    fn net_of_fee(&self) -> U256 {
        U256::from(BPS - u128::from(self.fee_bps))
    }

    fn convert(
        &self,
        amount: Amount,
        asset_in: &AssetId,
        asset_out: &AssetId,
    ) -> Result<Amount, VenueError> {
        let (mul, div) = self.factor(asset_in, asset_out)?;
        let gross = U256::from(amount.0) * mul / div;
        narrow(gross * self.net_of_fee() / U256::from(BPS))
    }

    fn convert_in(
        &self,
        amount: Amount,
        asset_in: &AssetId,
        asset_out: &AssetId,
    ) -> Result<Amount, VenueError> {
        let (mul, div) = self.factor(asset_in, asset_out)?;
        let gross = ceil_div(U256::from(amount.0) * U256::from(BPS), self.net_of_fee());
        narrow(ceil_div(gross * div, mul))
    }
}

fn ceil_div(n: U256, d: U256) -> U256 {
    let q = n / d;
    if n % d == U256::ZERO { q } else { q + U256::from(1u8) }
}

fn narrow(value: U256) -> Result<Amount, VenueError> {
    let raw: u128 = value
        .uint_try_to()
        .map_err(|_| VenueError::Other("amount overflows 128 bits".into()))?;
    Ok(Amount(raw))
}

impl Venue for FixedPriceVenue {
    fn account(&self) -> &AccountId {
        &self.account
    }

    fn quote(&self, amount_in: Amount, path: &[AssetId]) -> Result<Vec<Amount>, VenueError> {
        validate_path(path)?;
        let mut amounts = Vec::with_capacity(path.len());
        amounts.push(amount_in);
        for hop in path.windows(2) {
            let last = amounts[amounts.len() - 1];
            amounts.push(self.convert(last, &hop[0], &hop[1])?);
        }
        Ok(amounts)
    }

    fn quote_in(&self, amount_out: Amount, path: &[AssetId]) -> Result<Vec<Amount>, VenueError> {
        validate_path(path)?;
        let mut amounts = vec![Amount::ZERO; path.len()];
        amounts[path.len() - 1] = amount_out;
        for i in (1..path.len()).rev() {
            amounts[i - 1] = self.convert_in(amounts[i], &path[i - 1], &path[i])?;
        }
        Ok(amounts)
    }

    fn swap_exact_input(&self, request: &SwapRequest) -> Result<Amount, VenueError> {
        if self.execution_delay > 0 {
            self.ledger.advance(self.execution_delay);
        }
        let now = self.ledger.timestamp();
        if now > request.deadline {
            return Err(VenueError::DeadlineExpired {
                deadline: request.deadline,
                now,
            });
        }

        let quoted = self.quote(request.amount_in, &request.path)?;
        let quoted_out = quoted[quoted.len() - 1];
        let mode = *lock(&self.mode);
        let amount_out = match mode {
            SwapMode::Exact => quoted_out,
            SwapMode::ShortFill(bps) => quoted_out
                .mul_div(BPS.saturating_sub(u128::from(bps)), BPS)
                .unwrap_or(Amount::ZERO),
            SwapMode::Reject => return Err(VenueError::Rejected("mock: swap rejected".into())),
        };
        if amount_out < request.min_amount_out {
            return Err(VenueError::SlippageExceeded {
                min_amount_out: request.min_amount_out,
                amount_out,
            });
        }

        let asset_in = &request.path[0];
        let asset_out = &request.path[request.path.len() - 1];
        self.ledger.transfer_from(
            asset_in,
            &self.account,
            &request.sender,
            &self.account,
            request.amount_in,
        )?;

        let hook = lock(&self.hook).clone();
        if let Some(hook) = hook {
            hook();
        }

        self.ledger
            .transfer(asset_out, &self.account, &request.recipient, amount_out)?;

        lock(&self.swaps).push(RecordedSwap {
            sender: request.sender.clone(),
            path: request.path.clone(),
            amount_in: request.amount_in,
            min_amount_out: request.min_amount_out,
            amount_out,
            deadline: request.deadline,
        });
        Ok(amount_out)
    }
}
