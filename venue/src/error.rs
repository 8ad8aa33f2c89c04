//! Ledger and venue error types.

use equibasket::{AccountId, Amount, AssetId, Timestamp};

/// Errors raised by a ledger or a swap venue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VenueError {
    #[error("no liquidity for {asset_in} -> {asset_out}")]
    NoLiquidity { asset_in: AssetId, asset_out: AssetId },

    #[error("invalid swap path: {0}")]
    InvalidPath(String),

    #[error("insufficient input amount")]
    InsufficientInput,

    #[error("{holder} holds {available} {asset}, needs {required}")]
    InsufficientBalance {
        asset: AssetId,
        holder: AccountId,
        available: Amount,
        required: Amount,
    },

    #[error("{spender} may move {allowed} {asset} of {owner}, needs {required}")]
    InsufficientAllowance {
        asset: AssetId,
        owner: AccountId,
        spender: AccountId,
        allowed: Amount,
        required: Amount,
    },

    #[error("output {amount_out} below minimum {min_amount_out}")]
    SlippageExceeded {
        min_amount_out: Amount,
        amount_out: Amount,
    },

    #[error("deadline {deadline} passed (now {now})")]
    DeadlineExpired { deadline: Timestamp, now: Timestamp },

    #[error("swap rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    Other(String),
}
