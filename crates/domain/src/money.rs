//! Fixed-precision money arithmetic and discount math.

use serde::{Deserialize, Serialize};

/// Basis points in 100%.
pub const FULL_PERCENT_BP: u32 = 10_000;

/// Money amount represented in cents to avoid floating point issues.
///
/// Serialized as a bare integer number of cents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new Money amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates a new Money amount from a whole dollar value.
    pub const fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.0.abs() % 100
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0 * i64::from(quantity))
    }

    /// Returns `basis_points / 10_000` of this amount, rounded half-up to the cent.
    pub fn percentage(&self, basis_points: u32) -> Money {
        round2(
            i128::from(self.0) * i128::from(basis_points),
            i128::from(FULL_PERCENT_BP),
        )
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Rounds the exact amount `numerator / denominator` cents to a whole cent.
///
/// Halves round away from zero, which is round-half-up for the
/// non-negative amounts prices and discounts are made of.
pub fn round2(numerator: i128, denominator: i128) -> Money {
    debug_assert!(denominator > 0);
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    let rounded = if remainder.abs() * 2 >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    };
    Money(rounded as i64)
}

/// How a promotion reduces an order amount.
///
/// Serialized with a `type` tag of `percentage` or `fixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Discount {
    /// A share of the base amount, in basis points (`1000` = 10%), optionally capped.
    Percentage {
        #[serde(rename = "value")]
        basis_points: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_discount: Option<Money>,
    },

    /// A flat amount off.
    Fixed {
        #[serde(rename = "value")]
        amount: Money,
    },
}

impl Discount {
    /// The raw `value` of the rule: basis points or cents.
    pub fn value(&self) -> i64 {
        match self {
            Discount::Percentage { basis_points, .. } => i64::from(*basis_points),
            Discount::Fixed { amount } => amount.cents(),
        }
    }

    /// The rule's type name.
    pub fn kind(&self) -> &'static str {
        match self {
            Discount::Percentage { .. } => "percentage",
            Discount::Fixed { .. } => "fixed",
        }
    }
}

/// Computes the discount a rule grants on `base`.
///
/// Percentage discounts are clamped to their cap. Fixed discounts never
/// exceed the base, so subtracting the result can't go below zero.
pub fn compute_discount(base: Money, discount: &Discount) -> Money {
    let base = base.max(Money::zero());
    match *discount {
        Discount::Percentage {
            basis_points,
            max_discount,
        } => {
            let raw = base.percentage(basis_points);
            match max_discount {
                Some(cap) if raw > cap => cap,
                _ => raw,
            }
        }
        Discount::Fixed { amount } => amount.min(base),
    }
}
