//! Ledger and swap-venue seams for equibasket.
//!
//! The rebalancer never holds balances itself. It reads and moves them
//! through a [`Ledger`] and prices and trades them through a [`Venue`].
//! Implementations:
//!
//! - [`InMemoryLedger`]: balances, allowances and a clock behind a mutex,
//!   with checkpoint/revert for all-or-nothing invocations
//! - [`ConstantProductVenue`]: a constant-product router whose pool reserves
//!   are ledger balances of the pair accounts
//! - [`FixedPriceVenue`]: a deterministic test double with fixed prices and
//!   configurable failures

pub mod amm;
pub mod error;
pub mod ledger;
pub mod mock;
pub mod types;

pub use amm::ConstantProductVenue;
pub use error::VenueError;
pub use ledger::InMemoryLedger;
pub use mock::{FixedPriceVenue, SwapMode};
pub use types::*;

use equibasket::{AccountId, Amount, AssetId, Timestamp};

/// External asset ledgers: balances, transfers and allowances.
///
/// Every call is synchronous and atomic on its own. Multi-call atomicity is
/// provided by [`checkpoint`](Ledger::checkpoint) and
/// [`revert`](Ledger::revert).
pub trait Ledger {
    /// Opaque saved state.
    type Checkpoint;

    /// Balance of `asset` held by `holder`.
    fn balance_of(&self, asset: &AssetId, holder: &AccountId) -> Result<Amount, VenueError>;

    /// Move `amount` of `asset` from `from` to `to`.
    fn transfer(
        &self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), VenueError>;

    /// Let `spender` move up to `amount` of `owner`'s `asset`. Overwrites.
    fn approve(
        &self,
        asset: &AssetId,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<(), VenueError>;

    /// Move `amount` from `from` to `to` on behalf of `spender`, consuming
    /// allowance.
    fn transfer_from(
        &self,
        asset: &AssetId,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), VenueError>;

    /// Current ledger time.
    fn timestamp(&self) -> Timestamp;

    /// Capture the full ledger state.
    fn checkpoint(&self) -> Self::Checkpoint;

    /// Restore a previously captured state, discarding everything since.
    fn revert(&self, checkpoint: Self::Checkpoint);
}

/// A price-quoting and swap-executing venue (a DEX router).
pub trait Venue {
    /// The account that must be approved to pull swap inputs.
    fn account(&self) -> &AccountId;

    /// Amounts out along `path` for `amount_in` of `path[0]`
    /// (`getAmountsOut`). The first element is `amount_in`.
    fn quote(&self, amount_in: Amount, path: &[AssetId]) -> Result<Vec<Amount>, VenueError>;

    /// Amounts in along `path` needed to receive `amount_out` of the last
    /// asset (`getAmountsIn`). The last element is `amount_out`.
    fn quote_in(&self, amount_out: Amount, path: &[AssetId]) -> Result<Vec<Amount>, VenueError>;

    /// Execute an exact-input swap and return the amount received.
    fn swap_exact_input(&self, request: &SwapRequest) -> Result<Amount, VenueError>;
}
