//! Money types with precise decimal arithmetic
//!
//! The billing core is single-currency (USD), so `Money` is a thin wrapper
//! around `rust_decimal::Decimal` that carries the cent-level comparisons the
//! ledger rules are written in ("below one cent", "differs by at least one
//! cent", "within a tenth of a cent").

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use thiserror::Error;

/// One cent, the tolerance used by the reconciliation rules
pub const CENT: Decimal = dec!(0.01);

/// A tenth of a cent, the tolerance used by direct field adjustments
pub const MILL: Decimal = dec!(0.001);

/// Number of decimal places money is stored with at rest
pub const STORAGE_SCALE: u32 = 2;

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount in US dollars
///
/// Intermediate results keep 4 decimal places so proration and tax factors
/// do not lose precision before the final rounding to cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero dollars
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Creates a new Money value
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp(4))
    }

    /// Creates Money from an integer amount of cents
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// Returns zero dollars
    pub fn zero() -> Self {
        Self::ZERO
    }

    /// Returns the amount
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is exactly zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is positive
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Returns true if the amount is strictly below one cent (negatives included)
    pub fn is_below_cent(&self) -> bool {
        self.0 < CENT
    }

    /// Returns true if the amount is within one cent of zero
    pub fn is_negligible(&self) -> bool {
        self.0.abs() < CENT
    }

    /// Returns true if `self` and `other` differ by at least one cent
    pub fn differs_by_cent(&self, other: Money) -> bool {
        (self.0 - other.0).abs() >= CENT
    }

    /// Returns true if `self` and `other` differ by more than a tenth of a cent
    pub fn differs_by_mill(&self, other: Money) -> bool {
        (self.0 - other.0).abs() > MILL
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Rounds half away from zero to whole cents
    pub fn round_to_cents(&self) -> Self {
        Self(self.0.round_dp_with_strategy(
            STORAGE_SCALE,
            rust_decimal::RoundingStrategy::MidpointAwayFromZero,
        ))
    }

    /// Multiplies by a scalar (quantity, proration factor, tax factor)
    pub fn multiply(&self, factor: Decimal) -> Self {
        Self::new(self.0 * factor)
    }

    /// Checked multiplication that reports overflow instead of panicking
    pub fn checked_multiply(&self, factor: Decimal) -> Result<Self, MoneyError> {
        self.0
            .checked_mul(factor)
            .map(Self::new)
            .ok_or(MoneyError::Overflow)
    }

    /// Divides by a scalar
    pub fn divide(&self, divisor: Decimal) -> Result<Self, MoneyError> {
        if divisor.is_zero() {
            return Err(MoneyError::DivisionByZero);
        }
        Ok(Self::new(self.0 / divisor))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('$');
        Decimal::from_str(trimmed)
            .map(Money::new)
            .map_err(|_| MoneyError::InvalidAmount(s.to_string()))
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Money::new(amount)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.0 - other.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Mul<Decimal> for Money {
    type Output = Self;

    fn mul(self, factor: Decimal) -> Self {
        self.multiply(factor)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

/// A percentage rate (sales tax, invoice discount)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    /// The rate as a decimal (e.g., 0.05 for 5%)
    value: Decimal,
}

impl Rate {
    /// Creates a rate from a decimal value (e.g., 0.05 for 5%)
    pub fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Creates a rate from a percentage (e.g., 5.0 for 5%)
    pub fn from_percentage(percentage: Decimal) -> Self {
        Self {
            value: percentage / dec!(100),
        }
    }

    /// Returns the rate as a decimal
    pub fn as_decimal(&self) -> Decimal {
        self.value
    }

    /// Returns the rate as a percentage
    pub fn as_percentage(&self) -> Decimal {
        self.value * dec!(100)
    }

    /// Returns true if the rate is zero
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Applies this rate to a money amount
    pub fn apply(&self, money: &Money) -> Money {
        money.multiply(self.value)
    }

    /// Factor that adds the rate on top of an amount (1 + rate)
    pub fn markup_factor(&self) -> Decimal {
        Decimal::ONE + self.value
    }

    /// Factor that takes the rate off an amount (1 - rate)
    pub fn discount_factor(&self) -> Decimal {
        Decimal::ONE - self.value
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().round_dp(4).normalize())
    }
}
