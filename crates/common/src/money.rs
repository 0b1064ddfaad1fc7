//! Decimal money amounts.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A monetary amount in the store currency.
///
/// Backed by [`Decimal`] so percentages and totals never pick up binary
/// floating point error. Values are kept normalized (no trailing zeros), so
/// `110.0` and `110` compare, print and serialize the same way.
///
/// The operators saturate at the bounds of [`Decimal`] instead of panicking;
/// amounts that come from clients go through the `checked_*` methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Creates a money amount from a decimal value.
    pub fn new(amount: Decimal) -> Self {
        Self(amount.normalize())
    }

    /// Creates a money amount from whole currency units.
    pub fn from_major(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the underlying decimal amount.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money::new(self.0.saturating_mul(Decimal::from(quantity)))
    }

    /// Multiplies by a quantity, or `None` on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(Decimal::from(quantity)).map(Money::new)
    }

    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money::new)
    }

    /// Scales by a decimal factor (e.g. `1.1` for a 10% surcharge).
    pub fn scale(&self, factor: Decimal) -> Money {
        Money::new(self.0.saturating_mul(factor))
    }

    /// Rounds to `dp` decimal places, half away from zero.
    pub fn round_dp(&self, dp: u32) -> Money {
        Money::new(
            self.0
                .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Absolute difference between two amounts, or `None` when it does not
    /// fit in a [`Decimal`].
    pub fn abs_diff(&self, other: Money) -> Option<Money> {
        self.0
            .checked_sub(other.0)
            .map(|diff| Money::new(diff.abs()))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

impl std::str::FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.trim().parse::<Decimal>()?))
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money::new(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money::new(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_trailing_zeros() {
        let a = Money::new("110.00".parse().unwrap());
        assert_eq!(a, Money::from_major(110));
        assert_eq!(a.to_string(), "110");
    }

    #[test]
    fn arithmetic() {
        let a = Money::from_major(50_000);
        let fee = Money::from_major(30_000);
        assert_eq!(a.multiply(2) + fee, Money::from_major(130_000));
        assert_eq!(fee - a, Money::from_major(-20_000));
        assert_eq!(a.abs_diff(fee), Some(Money::from_major(20_000)));
    }

    #[test]
    fn extreme_amounts_do_not_panic() {
        let max = Money::new(Decimal::MAX);
        let min = Money::new(Decimal::MIN);

        assert_eq!(max.abs_diff(min), None);
        assert_eq!(max.checked_add(Money::from_major(1)), None);
        assert_eq!(max.checked_multiply(2), None);
        assert_eq!(max + Money::from_major(1), max);
        assert_eq!(min - Money::from_major(1), min);
        assert_eq!(max.multiply(3), max);
        assert_eq!(
            Money::from_major(50_000).checked_multiply(2),
            Some(Money::from_major(100_000))
        );
    }

    #[test]
    fn rounds_half_away_from_zero() {
        let m: Money = "10.005".parse().unwrap();
        assert_eq!(m.round_dp(2), "10.01".parse().unwrap());
    }

    #[test]
    fn sums_an_iterator() {
        let total: Money = [1, 2, 3].into_iter().map(Money::from_major).sum();
        assert_eq!(total, Money::from_major(6));
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Money::from_major(130_000)).unwrap();
        assert_eq!(json, "\"130000\"");
        let number: Money = serde_json::from_str("130000").unwrap();
        assert_eq!(number, Money::from_major(130_000));
    }
}
