//! Fixed-point amounts.
//!
//! All money and weights are `rust_decimal::Decimal`. Amounts that leave the
//! engine (postings, results) always carry exactly six fractional digits and
//! are rounded half-to-even.

use crate::error::{AllocError, AllocResult};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

pub type Amount = Decimal;

/// Fractional digits carried by every amount.
pub const AMOUNT_SCALE: u32 = 6;

/// Round to the amount scale, half-to-even, and pin the scale to exactly six
/// digits so that textual forms are stable.
pub fn round_amount(value: Decimal) -> Amount {
    let mut rounded =
        value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(AMOUNT_SCALE);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    rounded
}

/// Canonical text form: `-1234.500000`.
pub fn format_amount(value: Amount) -> String {
    round_amount(value).to_string()
}

/// Parse a human-entered number.
///
/// Blank input is zero. Spaces (including non-breaking ones) are treated as
/// thousands separators and a comma as the decimal mark, so `"1 234,56"`
/// parses as `1234.56`.
pub fn parse_amount(text: &str) -> AllocResult<Decimal> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(&cleaned).map_err(|_| AllocError::InvalidAmount(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_to_even() {
        assert_eq!(round_amount(dec!(0.0000005)), dec!(0.000000));
        assert_eq!(round_amount(dec!(0.0000015)), dec!(0.000002));
        assert_eq!(round_amount(dec!(-0.0000025)), dec!(-0.000002));
    }

    #[test]
    fn formats_with_six_digits() {
        assert_eq!(format_amount(dec!(40000)), "40000.000000");
        assert_eq!(format_amount(dec!(-1.5)), "-1.500000");
        assert_eq!(format_amount(dec!(-0.0000001)), "0.000000");
    }

    #[test]
    fn parses_decimal_comma_and_grouping() {
        assert_eq!(parse_amount("1 234,56").unwrap(), dec!(1234.56));
        assert_eq!(parse_amount("1\u{a0}000").unwrap(), dec!(1000));
        assert_eq!(parse_amount("  ").unwrap(), Decimal::ZERO);
        assert_eq!(parse_amount("0.4").unwrap(), dec!(0.4));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_amount("12abc"), Err(AllocError::InvalidAmount(_))));
    }
}
