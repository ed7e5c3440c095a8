use std::str::FromStr;

use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    config::ExchangeRateConfig,
    currency::CurrencyCode,
    exchange_rate::{ApiErrorKind, ExchangeRateError, ExchangeRates, RateCache},
};

/// The v6 API of exchangerate-api.com.
pub const DEFAULT_BASE_URL: &str = "https://v6.exchangerate-api.com/v6";

#[derive(Debug, Deserialize)]
struct PairResponse {
    result: String,
    conversion_rate: Option<f64>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
}

/// Looks up exchange rates from the `pair` endpoint and caches them per pair.
///
/// The client blocks the calling thread while a request is in flight.
#[derive(Debug)]
pub struct ExchangeRateClient {
    http: Client,
    base_url: String,
    api_key: String,
    cache: RateCache,
}

impl ExchangeRateClient {
    /// Create a client from `config`.
    ///
    /// # Errors
    /// Returns [ExchangeRateError::MissingApiKey] if the API key is blank, or
    /// [ExchangeRateError::RequestFailed] if the HTTP client cannot be built.
    pub fn new(config: &ExchangeRateConfig) -> Result<Self, ExchangeRateError> {
        let api_key = config.api_key.trim();

        if api_key.is_empty() {
            return Err(ExchangeRateError::MissingApiKey);
        }

        let http = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            cache: RateCache::new(config.cache_ttl),
        })
    }

    fn fetch_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Decimal, ExchangeRateError> {
        tracing::debug!("fetching exchange rate for {from}/{to}");

        let url = format!("{}/{}/pair/{from}/{to}", self.base_url, self.api_key);
        let response = self.http.get(url).send()?;
        let status = response.status();

        if !status.is_success() {
            tracing::error!("exchange rate request for {from}/{to} failed with status {status}");
            return Err(ExchangeRateError::HttpStatus(status.as_u16()));
        }

        let body: PairResponse = response
            .json()
            .map_err(|error| ExchangeRateError::InvalidResponse(error.to_string()))?;

        parse_pair_response(body)
    }
}

fn parse_pair_response(body: PairResponse) -> Result<Decimal, ExchangeRateError> {
    if body.result == "error" {
        let error_type = body.error_type.unwrap_or_default();
        return Err(ExchangeRateError::Api(ApiErrorKind::from_error_type(&error_type)));
    }

    let conversion_rate = body.conversion_rate.ok_or_else(|| {
        ExchangeRateError::InvalidResponse("missing conversion_rate".to_owned())
    })?;

    // Go through the shortest decimal representation of the float so 1.1 stays 1.1.
    Decimal::from_str(&conversion_rate.to_string())
        .map_err(|error| ExchangeRateError::InvalidResponse(error.to_string()))
}

impl ExchangeRates for ExchangeRateClient {
    fn rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Result<Decimal, ExchangeRateError> {
        self.cache.get_or_fetch(from, to, || self.fetch_rate(from, to))
    }

    fn convert(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        amount: Decimal,
    ) -> Result<Decimal, ExchangeRateError> {
        let rate = self.rate(from, to)?;

        rate.checked_mul(amount)
            .ok_or_else(|| ExchangeRateError::ConversionOverflow {
                amount,
                from: from.clone(),
                to: to.clone(),
            })
    }
}
