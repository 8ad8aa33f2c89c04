//! # equibasket
//!
//! Core value types for an equal-weight basket fund that rebalances through
//! a swap venue.
//!
//! - [`Amount`]: raw fixed-point token amounts with 256-bit `mul_div`
//! - [`AssetId`] / [`AccountId`]: asset and balance-holder identifiers
//! - [`Side`]: trade direction relative to a quote asset
//!
//! The engine itself lives in `equibasket-rebalancer`; the ledger and venue
//! seams it trades through live in `equibasket-venue`.
//!
//! ## Amounts
//!
//! Amounts count an asset's smallest unit, so the same value means different
//! things for a 6-decimal and an 18-decimal asset:
//!
//! ```
//! use equibasket::Amount;
//!
//! let usdc = Amount::parse_units("100000", 6).unwrap();
//! assert_eq!(usdc, Amount(100_000_000_000));
//! assert_eq!(Amount(1).format_units(6), "0.000001");
//! ```

pub mod amount;
pub mod error;
pub mod side;
pub mod types;

pub use amount::{Amount, pow10};
pub use error::AmountError;
pub use side::Side;
pub use types::{AccountId, AssetId, Timestamp};
