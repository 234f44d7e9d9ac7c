mod money;

pub mod helpers;
mod secret;

pub use money::{BasisPoints, Money, MoneyConversionError, DEFAULT_CURRENCY_CODE};
pub use secret::Secret;
