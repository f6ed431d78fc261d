use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
///
/// Serializes as the bare integer number of cents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the whole-unit portion.
    pub fn units(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after whole units).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity. Saturates instead of overflowing.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents.saturating_mul(i64::from(quantity)),
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-{}.{:02}", self.units().abs(), self.cents_part())
        } else {
            write!(f, "{}.{:02}", self.units(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_sub(rhs.cents),
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents = self.cents.saturating_add(rhs.cents);
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.cents = self.cents.saturating_sub(rhs.cents);
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
    fn from_cents_splits_units() {
        let money = Money::from_cents(1599);
        assert_eq!(money.cents(), 1599);
        assert_eq!(money.units(), 15);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn display_pads_cents() {
        assert_eq!(Money::from_cents(1599).to_string(), "15.99");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-250).to_string(), "-2.50");
    }

    #[test]
    fn arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(250);
        assert_eq!((a + b).cents(), 1250);
        assert_eq!((a - b).cents(), 750);
        assert_eq!(b.multiply(4), a);
    }

    #[test]
    fn arithmetic_saturates() {
        let big = Money::from_cents(i64::MAX / 2 + 1);
        assert_eq!(big.multiply(2).cents(), i64::MAX);
        assert_eq!((big + big).cents(), i64::MAX);
        assert_eq!((Money::from_cents(i64::MIN) - big).cents(), i64::MIN);

        let mut total = big;
        total += big;
        assert_eq!(total.cents(), i64::MAX);
    }

    #[test]
    fn sums_an_iterator() {
        let total: Money = [100, 200, 300].into_iter().map(Money::from_cents).sum();
        assert_eq!(total.cents(), 600);
    }

    #[test]
    fn serializes_as_cents() {
        assert_eq!(serde_json::to_string(&Money::from_cents(2550)).unwrap(), "2550");
    }
}
