//! In-memory asset ledger.
//!
//! Holds every asset's balances and allowances plus a settable clock behind
//! one mutex, so each call is atomic and a checkpoint is a plain clone of
//! the state.

use std::sync::{Mutex, MutexGuard, PoisonError};

use equibasket::{AccountId, Amount, AssetId, Timestamp};
use rustc_hash::FxHashMap;

use crate::Ledger;
use crate::error::VenueError;

type BalanceKey = (AssetId, AccountId);
type AllowanceKey = (AssetId, AccountId, AccountId);

#[derive(Debug, Clone, Default)]
struct LedgerState {
    balances: FxHashMap<BalanceKey, Amount>,
    allowances: FxHashMap<AllowanceKey, Amount>,
    timestamp: Timestamp,
}

impl LedgerState {
    fn balance(&self, asset: &AssetId, holder: &AccountId) -> Amount {
        self.balances
            .get(&(asset.clone(), holder.clone()))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    fn move_balance(
        &mut self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), VenueError> {
        let available = self.balance(asset, from);
        let remaining = available
            .checked_sub(amount)
            .ok_or_else(|| VenueError::InsufficientBalance {
                asset: asset.clone(),
                holder: from.clone(),
                available,
                required: amount,
            })?;
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance(asset, to)
            .checked_add(amount)
            .ok_or_else(|| VenueError::Other(format!("{asset} balance of {to} overflows")))?;

        self.balances.insert((asset.clone(), from.clone()), remaining);
        self.balances.insert((asset.clone(), to.clone()), credited);
        Ok(())
    }
}

/// Saved [`InMemoryLedger`] state.
#[derive(Debug, Clone)]
pub struct LedgerCheckpoint(LedgerState);

/// A mutex-guarded multi-asset ledger.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock at `timestamp`.
    pub fn with_timestamp(timestamp: Timestamp) -> Self {
        let ledger = Self::new();
        ledger.set_timestamp(timestamp);
        ledger
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create `amount` of `asset` out of nothing and credit it to `holder`.
    pub fn mint(
        &self,
        asset: &AssetId,
        holder: &AccountId,
        amount: Amount,
    ) -> Result<(), VenueError> {
        let mut state = self.state();
        let credited = state
            .balance(asset, holder)
            .checked_add(amount)
            .ok_or_else(|| VenueError::Other(format!("{asset} balance of {holder} overflows")))?;
        state.balances.insert((asset.clone(), holder.clone()), credited);
        Ok(())
    }

    pub fn set_timestamp(&self, timestamp: Timestamp) {
        self.state().timestamp = timestamp;
    }

    /// Move the clock forward by `secs`.
    pub fn advance(&self, secs: u64) {
        let mut state = self.state();
        state.timestamp = state.timestamp.saturating_add(secs);
    }

    /// Remaining allowance of `spender` over `owner`'s `asset`.
    pub fn allowance(&self, asset: &AssetId, owner: &AccountId, spender: &AccountId) -> Amount {
        self.state()
            .allowances
            .get(&(asset.clone(), owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(Amount::ZERO)
    }
}

impl Ledger for InMemoryLedger {
    type Checkpoint = LedgerCheckpoint;

    fn balance_of(&self, asset: &AssetId, holder: &AccountId) -> Result<Amount, VenueError> {
        Ok(self.state().balance(asset, holder))
    }

    fn transfer(
        &self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), VenueError> {
        self.state().move_balance(asset, from, to, amount)
    }

    fn approve(
        &self,
        asset: &AssetId,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<(), VenueError> {
        self.state()
            .allowances
            .insert((asset.clone(), owner.clone(), spender.clone()), amount);
        Ok(())
    }

    fn transfer_from(
        &self,
        asset: &AssetId,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), VenueError> {
        let mut state = self.state();
        let key = (asset.clone(), from.clone(), spender.clone());
        let allowed = state.allowances.get(&key).copied().unwrap_or(Amount::ZERO);
        let remaining = allowed
            .checked_sub(amount)
            .ok_or_else(|| VenueError::InsufficientAllowance {
                asset: asset.clone(),
                owner: from.clone(),
                spender: spender.clone(),
                allowed,
                required: amount,
            })?;

        state.move_balance(asset, from, to, amount)?;
        // an unlimited approval is never consumed
        if allowed != Amount::MAX {
            state.allowances.insert(key, remaining);
        }
        Ok(())
    }

    fn timestamp(&self) -> Timestamp {
        self.state().timestamp
    }

    fn checkpoint(&self) -> LedgerCheckpoint {
        LedgerCheckpoint(self.state().clone())
    }

    fn revert(&self, checkpoint: LedgerCheckpoint) {
        *self.state() = checkpoint.0;
    }
}
