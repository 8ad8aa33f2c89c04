//! Fixed-point token amounts.
//!
//! An [`Amount`] counts an asset's smallest unit (wei for an 18-decimal
//! token, micro-units for a 6-decimal stablecoin). All arithmetic is integer
//! and rounds toward zero; products that could exceed 128 bits go through a
//! 256-bit intermediate.

use std::fmt;
use std::iter::Sum;

use alloy_primitives::U256;
use alloy_primitives::ruint::UintTryTo;

use crate::error::AmountError;

/// A raw amount of some asset, in its smallest unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Amount(pub u128);

/// `10^decimals`, or `None` past 38 decimals.
#[inline]
pub fn pow10(decimals: u8) -> Option<u128> {
    10u128.checked_pow(u32::from(decimals))
}

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const MAX: Amount = Amount(u128::MAX);

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `whole` units of an asset with `decimals` decimals.
    pub fn units(whole: u128, decimals: u8) -> Option<Amount> {
        whole.checked_mul(pow10(decimals)?).map(Amount)
    }

    #[inline]
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }

    #[inline]
    pub fn abs_diff(self, rhs: Amount) -> Amount {
        Amount(self.0.abs_diff(rhs.0))
    }

    /// `floor(self * mul / div)` with a 256-bit intermediate.
    ///
    /// Returns `None` when `div` is zero or the quotient does not fit.
    pub fn mul_div(self, mul: u128, div: u128) -> Option<Amount> {
        if div == 0 {
            return None;
        }
        let wide = U256::from(self.0) * U256::from(mul) / U256::from(div);
        let narrow: u128 = wide.uint_try_to().ok()?;
        Some(Amount(narrow))
    }

    /// `ceil(self * mul / div)` with a 256-bit intermediate.
    pub fn mul_div_ceil(self, mul: u128, div: u128) -> Option<Amount> {
        if div == 0 {
            return None;
        }
        let product = U256::from(self.0) * U256::from(mul);
        let divisor = U256::from(div);
        let mut wide = product / divisor;
        if product % divisor != U256::ZERO {
            wide += U256::from(1u8);
        }
        let narrow: u128 = wide.uint_try_to().ok()?;
        Some(Amount(narrow))
    }

    /// Render as a decimal string, `formatUnits` style.
    ///
    /// Trailing fractional zeros are dropped but at least one fractional
    /// digit is kept: `0` renders as `"0.0"`, `1` at 6 decimals as
    /// `"0.000001"`.
    pub fn format_units(self, decimals: u8) -> String {
        let Some(scale) = pow10(decimals) else {
            return self.0.to_string();
        };
        let whole = self.0 / scale;
        let frac = self.0 % scale;
        if frac == 0 {
            return format!("{whole}.0");
        }
        let digits = format!("{frac:0width$}", width = usize::from(decimals));
        format!("{whole}.{}", digits.trim_end_matches('0'))
    }

    /// Parse a decimal string into smallest units.
    pub fn parse_units(input: &str, decimals: u8) -> Result<Amount, AmountError> {
        let malformed = || AmountError::Malformed(input.to_string());
        let (whole, frac) = match input.split_once('.') {
            Some((w, f)) => (w, f),
            None => (input, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(malformed());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(malformed());
        }
        if frac.len() > usize::from(decimals) {
            return Err(AmountError::TooPrecise { decimals });
        }

        let scale = pow10(decimals).ok_or(AmountError::Overflow)?;
        let whole_units: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| AmountError::Overflow)?
        };
        let frac_units: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = usize::from(decimals));
            padded.parse().map_err(|_| AmountError::Overflow)?
        };

        whole_units
            .checked_mul(scale)
            .and_then(|w| w.checked_add(frac_units))
            .map(Amount)
            .ok_or(AmountError::Overflow)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u128> for Amount {
    fn from(raw: u128) -> Self {
        Amount(raw)
    }
}

/// Saturates at [`Amount::MAX`].
impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| Amount(acc.0.saturating_add(a.0)))
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_like_ethers() {
        assert_eq!(
            Amount(332_222_924_578_076_323_389).format_units(18),
            "332.222924578076323389"
        );
        assert_eq!(Amount(0).format_units(18), "0.0");
        assert_eq!(Amount(1).format_units(6), "0.000001");
        assert_eq!(Amount(100_000_000_000).format_units(6), "100000.0");
        assert_eq!(Amount(1_500_000).format_units(6), "1.5");
    }

    #[test]
    fn parse_units_scales() {
        assert_eq!(
            Amount::parse_units("100000", 6).unwrap(),
            Amount(100_000_000_000)
        );
        assert_eq!(Amount::parse_units("0.5", 6).unwrap(), Amount(500_000));
        assert_eq!(Amount::parse_units(".25", 2).unwrap(), Amount(25));
        assert_eq!(
            Amount::parse_units("1000000", 18).unwrap(),
            Amount(1_000_000 * 10u128.pow(18))
        );
    }

    #[test]
    fn parse_units_rejects_garbage() {
        assert!(matches!(
            Amount::parse_units("", 6),
            Err(AmountError::Malformed(_))
        ));
        assert!(matches!(
            Amount::parse_units("1.2.3", 6),
            Err(AmountError::Malformed(_))
        ));
        assert!(matches!(
            Amount::parse_units("-1", 6),
            Err(AmountError::Malformed(_))
        ));
        assert_eq!(
            Amount::parse_units("0.1234567", 6),
            Err(AmountError::TooPrecise { decimals: 6 })
        );
    }

    #[test]
    fn parse_then_format() {
        let a = Amount::parse_units("66.462249141842416382", 18).unwrap();
        assert_eq!(a.format_units(18), "66.462249141842416382");
    }

    #[test]
    fn mul_div_uses_wide_intermediate() {
        // 1e24 * 1e17 overflows u128 but the quotient does not
        let reserve = Amount(10u128.pow(24));
        let out = reserve.mul_div(10u128.pow(17), 10u128.pow(20)).unwrap();
        assert_eq!(out, Amount(10u128.pow(21)));
    }

    #[test]
    fn mul_div_rounding() {
        assert_eq!(Amount(10).mul_div(1, 3), Some(Amount(3)));
        assert_eq!(Amount(10).mul_div_ceil(1, 3), Some(Amount(4)));
        assert_eq!(Amount(9).mul_div_ceil(1, 3), Some(Amount(3)));
        assert_eq!(Amount(10).mul_div(1, 0), None);
        assert_eq!(Amount::MAX.mul_div(2, 1), None);
    }

    #[test]
    fn units_and_sum() {
        assert_eq!(Amount::units(3, 2), Some(Amount(300)));
        assert_eq!(Amount::units(1, 39), None);
        let total: Amount = [Amount(1), Amount(2), Amount(3)].iter().sum();
        assert_eq!(total, Amount(6));
        let saturated: Amount = [Amount::MAX, Amount(1)].into_iter().sum();
        assert_eq!(saturated, Amount::MAX);
    }
}
