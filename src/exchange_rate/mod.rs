//! Currency conversion for subscriptions billed in a foreign currency.

mod cache;
mod client;
mod error;

pub use cache::{DEFAULT_CACHE_TTL, RateCache};
pub use client::{DEFAULT_BASE_URL, ExchangeRateClient};
pub use error::{ApiErrorKind, ExchangeRateError};

use rust_decimal::Decimal;

use crate::currency::CurrencyCode;

/// A source of exchange rates.
///
/// The billing engine asks for the rate and the converted amount separately
/// and stores both as returned.
pub trait ExchangeRates {
    /// The multiplier that converts one unit of `from` into `to`.
    fn rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Result<Decimal, ExchangeRateError>;

    /// `amount` in `from` expressed in `to`.
    fn convert(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        amount: Decimal,
    ) -> Result<Decimal, ExchangeRateError>;
}
