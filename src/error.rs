//! Errors for parsing decimal amounts.

use std::fmt;

/// Errors returned by [`Amount::parse_units`](crate::Amount::parse_units).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AmountError {
    /// The input was empty or not a plain decimal number.
    Malformed(String),
    /// More fractional digits than the asset has decimals.
    TooPrecise { decimals: u8 },
    /// The value does not fit in 128 bits of smallest units.
    Overflow,
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Malformed(input) => write!(f, "malformed amount '{input}'"),
            AmountError::TooPrecise { decimals } => {
                write!(f, "amount has more than {decimals} fractional digits")
            }
            AmountError::Overflow => write!(f, "amount overflows 128 bits"),
        }
    }
}

impl std::error::Error for AmountError {}
