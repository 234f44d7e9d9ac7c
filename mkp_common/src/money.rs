use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

pub const DEFAULT_CURRENCY_CODE: &str = "USD";

//--------------------------------------        Money        ---------------------------------------------------------
/// A monetary amount in the minor unit of its currency (cents for USD, halalas for SAR).
///
/// All order arithmetic is done on integers. The currency itself is carried alongside the amount by the owning record.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Money(i64);

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value).map(Self).map_err(|_| MoneyConversionError(format!("{value} is too large")))
    }
}

/// Parses decimal strings with at most two fractional digits, e.g. "113.92", "5", "-0.3".
impl FromStr for Money {
    type Err = MoneyConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (major, minor) = match digits.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (digits, ""),
        };
        if major.is_empty() && minor.is_empty() {
            return Err(MoneyConversionError(s.to_string()));
        }
        if minor.len() > 2 || !major.chars().chain(minor.chars()).all(|c| c.is_ascii_digit()) {
            return Err(MoneyConversionError(s.to_string()));
        }
        let major = if major.is_empty() { 0 } else { major.parse::<i64>().map_err(|e| MoneyConversionError(e.to_string()))? };
        let minor = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().map_err(|e| MoneyConversionError(e.to_string()))? * 10,
            _ => minor.parse::<i64>().map_err(|e| MoneyConversionError(e.to_string()))?,
        };
        let value = major
            .checked_mul(100)
            .and_then(|v| v.checked_add(minor))
            .ok_or_else(|| MoneyConversionError(format!("{s} is too large")))?;
        Ok(Self(if negative { -value } else { value }))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Applies a rate expressed in basis points, rounding half away from zero to the nearest minor unit.
    pub fn apply_rate(&self, rate: BasisPoints) -> Money {
        let product = i128::from(self.0) * i128::from(rate.value());
        let rounded = if product >= 0 { (product + 5_000) / 10_000 } else { (product - 5_000) / 10_000 };
        #[allow(clippy::cast_possible_truncation)]
        Money(rounded as i64)
    }
}

//--------------------------------------     BasisPoints     ---------------------------------------------------------
/// A percentage expressed in hundredths of a percent. 2.9% is `BasisPoints(290)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BasisPoints(u32);

impl BasisPoints {
    pub const fn new(bps: u32) -> Self {
        Self(bps)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for BasisPoints {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Display for BasisPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}
