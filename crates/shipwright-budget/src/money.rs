use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

/// A USD amount held as whole cents.
///
/// Every cost is rounded to cents once, when it enters the system, so sums
/// are exact integer additions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Round a dollar amount to cents, half away from zero.
    ///
    /// Non-finite input is treated as zero.
    #[must_use]
    pub fn from_usd(usd: f64) -> Self {
        if !usd.is_finite() {
            return Money::ZERO;
        }
        Money((usd * 100.0).round() as i64)
    }

    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn as_usd(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// `self - other`, floored at zero.
    #[must_use]
    pub fn saturating_remaining(self, spent: Money) -> Money {
        Money((self.0 - spent.0).max(0))
    }

    /// `self × ratio`, rounded to cents.
    #[must_use]
    pub fn scale(self, ratio: f64) -> Money {
        Money::from_usd(self.as_usd() * ratio)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_from_usd_rounds_to_cents() {
        assert_eq!(Money::from_usd(4.5).cents(), 450);
        assert_eq!(Money::from_usd(0.004).cents(), 0);
        assert_eq!(Money::from_usd(0.005).cents(), 1);
        assert_eq!(Money::from_usd(5.01).cents(), 501);
        assert_eq!(Money::from_usd(f64::NAN), Money::ZERO);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(450).to_string(), "$4.50");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-120).to_string(), "-$1.20");
    }

    #[test]
    fn test_remaining_floors_at_zero() {
        let cap = Money::from_cents(500);
        assert_eq!(cap.saturating_remaining(Money::from_cents(120)), Money::from_cents(380));
        assert_eq!(cap.saturating_remaining(Money::from_cents(501)), Money::ZERO);
    }

    #[test]
    fn test_scale() {
        assert_eq!(Money::from_cents(500).scale(0.8), Money::from_cents(400));
    }

    proptest! {
        #[test]
        fn prop_sum_is_exact_over_cents(a in 0i64..10_000_000, b in 0i64..10_000_000) {
            let x = Money::from_cents(a);
            let y = Money::from_cents(b);
            prop_assert_eq!((x + y).cents(), a + b);
            prop_assert_eq!([x, y].into_iter().sum::<Money>(), x + y);
        }

        #[test]
        fn prop_from_usd_within_half_cent(usd in 0.0f64..10_000.0) {
            let m = Money::from_usd(usd);
            prop_assert!((m.as_usd() - usd).abs() <= 0.005 + 1e-9);
        }
    }
}
