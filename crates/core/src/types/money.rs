//! Money helpers built on decimal arithmetic.
//!
//! Payment providers report amounts as integers in the smallest currency unit
//! (cents). Everything stored or shown by the shop uses the standard unit with
//! two decimal places.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places kept for stored amounts.
pub const MONEY_SCALE: u32 = 2;

/// Convert an amount in minor units (cents) to the standard unit.
///
/// ```
/// use muchio_core::from_minor_units;
/// use rust_decimal::Decimal;
///
/// assert_eq!(from_minor_units(1999), Decimal::new(1999, 2));
/// ```
#[must_use]
pub fn from_minor_units(cents: i64) -> Decimal {
    Decimal::new(cents, MONEY_SCALE)
}

/// Round an amount to two decimal places, midpoint away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Per-unit price of a line whose total is `line_total_cents` for `quantity` units.
///
/// Returns `None` when `quantity` is zero.
#[must_use]
pub fn unit_price(line_total_cents: i64, quantity: u32) -> Option<Decimal> {
    if quantity == 0 {
        return None;
    }
    Some(round_money(
        from_minor_units(line_total_cents) / Decimal::from(quantity),
    ))
}
