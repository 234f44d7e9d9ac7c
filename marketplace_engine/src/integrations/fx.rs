use std::collections::HashMap;

use mkp_common::Money;
use thiserror::Error;

const RATE_SCALE: i128 = 1_000_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FxError {
    #[error("No exchange rate is known for {from} -> {to}")]
    UnknownPair { from: String, to: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertedAmount {
    pub amount: Money,
    /// The rate used, in millionths.
    pub rate_micros: i64,
}

/// Converts minor-unit amounts between currencies.
///
/// This is only used to compare a settled gateway amount against the order total. Synchronous, since rate tables are
/// held in memory.
pub trait CurrencyConverter: Send + Sync {
    fn convert(&self, amount: Money, from: &str, to: &str) -> Result<ConvertedAmount, FxError>;
}

/// A static rate table. Inverse pairs are derived automatically.
#[derive(Debug, Clone)]
pub struct FixedRateConverter {
    rates: HashMap<(String, String), i64>,
}

impl Default for FixedRateConverter {
    /// USD/SAR is pegged at 3.75.
    fn default() -> Self {
        Self::new().with_rate("USD", "SAR", 3_750_000)
    }
}

impl FixedRateConverter {
    pub fn new() -> Self {
        Self { rates: HashMap::new() }
    }

    pub fn with_rate(mut self, from: &str, to: &str, rate_micros: i64) -> Self {
        self.rates.insert((from.to_ascii_uppercase(), to.to_ascii_uppercase()), rate_micros);
        self
    }

    fn rate(&self, from: &str, to: &str) -> Option<(i128, i128)> {
        let key = (from.to_string(), to.to_string());
        if let Some(r) = self.rates.get(&key) {
            return Some((*r as i128, RATE_SCALE));
        }
        let inverse = (to.to_string(), from.to_string());
        self.rates.get(&inverse).filter(|r| **r > 0).map(|r| (RATE_SCALE, *r as i128))
    }
}

fn div_round(num: i128, den: i128) -> i128 {
    let q = num / den;
    let r = num % den;
    if 2 * r.abs() >= den.abs() {
        q + num.signum() * den.signum()
    } else {
        q
    }
}

impl CurrencyConverter for FixedRateConverter {
    fn convert(&self, amount: Money, from: &str, to: &str) -> Result<ConvertedAmount, FxError> {
        let (from, to) = (from.to_ascii_uppercase(), to.to_ascii_uppercase());
        if from == to {
            return Ok(ConvertedAmount { amount, rate_micros: RATE_SCALE as i64 });
        }
        let (num, den) = self.rate(&from, &to).ok_or_else(|| FxError::UnknownPair { from, to })?;
        let converted = div_round(amount.value() as i128 * num, den);
        let rate_micros = div_round(num * RATE_SCALE, den) as i64;
        Ok(ConvertedAmount { amount: Money::from(converted as i64), rate_micros })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn same_currency_is_identity() {
        let fx = FixedRateConverter::new();
        let c = fx.convert(Money::from(1234), "usd", "USD").unwrap();
        assert_eq!(c.amount, Money::from(1234));
    }

    #[test]
    fn pegged_rates() {
        let fx = FixedRateConverter::default();
        assert_eq!(fx.convert(Money::from(10000), "USD", "SAR").unwrap().amount, Money::from(37500));
        assert_eq!(fx.convert(Money::from(37500), "SAR", "USD").unwrap().amount, Money::from(10000));
        // 1 halala is 0.2667 cents
        assert_eq!(fx.convert(Money::from(2), "SAR", "USD").unwrap().amount, Money::from(1));
    }

    #[test]
    fn unknown_pair() {
        let fx = FixedRateConverter::default();
        let err = fx.convert(Money::from(1), "EUR", "USD").unwrap_err();
        assert_eq!(err, FxError::UnknownPair { from: "EUR".into(), to: "USD".into() });
    }
}
