use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point drift.
///
/// Serialized as a bare integer number of cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a whole dollar value.
    pub const fn from_dollars(dollars: i64) -> Self {
        Self {
            cents: dollars * 100,
        }
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity. `None` when the product does not fit.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
    }

    /// Adds two amounts. `None` on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.cents.checked_add(other.cents).map(Money::from_cents)
    }

    /// Sums amounts, stopping with `None` at the first overflow.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }

    /// Divides evenly by a count, rounding half away from zero.
    ///
    /// Returns zero when `count` is zero.
    pub fn average_over(&self, count: u64) -> Money {
        let Ok(count) = i64::try_from(count) else {
            return Money::zero();
        };
        if count == 0 {
            return Money::zero();
        }
        let half = count / 2;
        let rounded = if self.cents >= 0 {
            (self.cents + half) / count
        } else {
            (self.cents - half) / count
        };
        Money::from_cents(rounded)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_cents() {
        let money = Money::from_cents(1234);
        assert_eq!(money.cents(), 1234);
        assert_eq!(money.dollars(), 12);
        assert_eq!(money.cents_part(), 34);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
    }

    #[test]
    fn test_multiply_has_no_rounding_drift() {
        // 3 x 99.99 is 299.97000000000003 in binary floating point
        let price = Money::from_cents(9999);
        assert_eq!(price.checked_multiply(3), Some(Money::from_cents(29997)));
        assert_eq!(price.checked_multiply(3).unwrap().to_string(), "$299.97");
    }

    #[test]
    fn test_sum() {
        let total = Money::checked_sum([1999, 1, 8000].map(Money::from_cents));
        assert_eq!(total, Some(Money::from_dollars(100)));
        assert_eq!(Money::checked_sum([]), Some(Money::zero()));
    }

    #[test]
    fn test_overflow_is_reported_not_wrapped() {
        let huge = Money::from_cents(i64::MAX / 2);
        assert_eq!(huge.checked_multiply(3), None);
        assert_eq!(huge.checked_multiply(2), Some(Money::from_cents(i64::MAX - 1)));
        assert_eq!(huge.checked_add(huge).unwrap().checked_add(huge), None);
        assert_eq!(Money::checked_sum([huge, huge, huge]), None);
    }

    #[test]
    fn test_average_over_rounds_half_up() {
        assert_eq!(Money::from_cents(1000).average_over(3), Money::from_cents(333));
        assert_eq!(Money::from_cents(1001).average_over(2), Money::from_cents(501));
        assert_eq!(Money::from_cents(500).average_over(0), Money::zero());
    }

    #[test]
    fn test_serializes_as_cents() {
        let json = serde_json::to_string(&Money::from_cents(9999)).unwrap();
        assert_eq!(json, "9999");
    }
}
