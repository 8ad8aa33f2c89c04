//! equibasket-rebalancer: keeps a basket fund at its target weights by
//! trading through a swap venue.
//!
//! One [`Fund::rebalance`](fund::Fund::rebalance) reads balances from the
//! ledger, values them through venue quotes, computes targets and deltas,
//! runs pre-trade risk checks, executes sells then buys, and reconciles.
//! Any failure reverts the whole invocation.

pub mod config;
pub mod diff;
pub mod error;
pub mod execution;
pub mod fund;
pub mod oracle;
pub mod reconcile;
pub mod risk;
pub mod simulation;
pub mod target;
pub mod valuation;

pub use error::{Error, Result};
pub use fund::{Fund, FundParams, RebalanceOutcome};
